use std::fmt;

/// Field types storable in a heap page.
///
/// Every type occupies a fixed number of bytes so that all tuples of a
/// schema have the same width and fit the page's fixed-size slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type: 1 byte (0 = false, 1 = true)
    Boolean,

    /// 16-bit signed integer: 2 bytes, big-endian
    SmallInt,

    /// 32-bit signed integer: 4 bytes, big-endian
    Integer,

    /// 64-bit signed integer: 8 bytes, big-endian
    BigInt,

    /// 64-bit floating point: 8 bytes, IEEE 754
    Double,

    /// String of up to n bytes.
    /// Stored as: length (2 bytes) + data, zero-padded to n bytes
    VarChar(u16),
}

impl DataType {
    /// Returns the number of bytes a value of this type occupies in a slot.
    pub fn size(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::SmallInt => 2,
            DataType::Integer => 4,
            DataType::BigInt => 8,
            DataType::Double => 8,
            DataType::VarChar(n) => 2 + *n as usize,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::SmallInt => write!(f, "SMALLINT"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}
