use std::fmt;

use bytes::{Buf, BufMut};

use super::DataType;

/// Represents a typed value that can be stored in a tuple.
/// Each variant corresponds to a DataType and holds the actual data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Boolean(bool),

    /// 16-bit signed integer
    SmallInt(i16),

    /// 32-bit signed integer
    Integer(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// String value
    String(String),
}

impl Value {
    /// Returns true if this value can be stored in a field of the given type.
    pub fn conforms_to(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Boolean(_), DataType::Boolean)
            | (Value::SmallInt(_), DataType::SmallInt)
            | (Value::Integer(_), DataType::Integer)
            | (Value::BigInt(_), DataType::BigInt)
            | (Value::Double(_), DataType::Double) => true,
            (Value::String(s), DataType::VarChar(n)) => s.len() <= *n as usize,
            _ => false,
        }
    }

    /// Writes exactly `data_type.size()` bytes.
    /// Returns None if the value is incompatible with the type.
    pub fn encode<B: BufMut>(&self, data_type: &DataType, buf: &mut B) -> Option<()> {
        if !self.conforms_to(data_type) {
            return None;
        }

        match (self, data_type) {
            (Value::Boolean(b), _) => buf.put_u8(u8::from(*b)),
            (Value::SmallInt(v), _) => buf.put_i16(*v),
            (Value::Integer(v), _) => buf.put_i32(*v),
            (Value::BigInt(v), _) => buf.put_i64(*v),
            (Value::Double(v), _) => buf.put_f64(*v),
            (Value::String(s), DataType::VarChar(n)) => {
                let bytes = s.as_bytes();
                buf.put_u16(bytes.len() as u16);
                buf.put_slice(bytes);
                buf.put_bytes(0, *n as usize - bytes.len());
            }
            (Value::String(_), _) => return None,
        }
        Some(())
    }

    /// Reads one value of the given type, consuming exactly
    /// `data_type.size()` bytes. Returns None on short or malformed input.
    pub fn decode<B: Buf>(buf: &mut B, data_type: &DataType) -> Option<Self> {
        if buf.remaining() < data_type.size() {
            return None;
        }

        let value = match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::SmallInt => Value::SmallInt(buf.get_i16()),
            DataType::Integer => Value::Integer(buf.get_i32()),
            DataType::BigInt => Value::BigInt(buf.get_i64()),
            DataType::Double => Value::Double(buf.get_f64()),
            DataType::VarChar(n) => {
                let n = *n as usize;
                let len = buf.get_u16() as usize;
                if len > n {
                    return None;
                }
                let mut raw = vec![0u8; n];
                buf.copy_to_slice(&mut raw);
                raw.truncate(len);
                Value::String(String::from_utf8(raw).ok()?)
            }
        };
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

// Convenience conversions
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
