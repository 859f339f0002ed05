use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use super::{Schema, Value};
use crate::common::RecordId;

/// Represents a single row/tuple in a table.
///
/// A tuple contains one value per column of its schema and, once it has been
/// stored, the location it was stored at.
///
/// ## Tuple Binary Format
///
/// ```text
/// +----------+----------+-----+----------+
/// | field 0  | field 1  | ... | field N  |
/// +----------+----------+-----+----------+
/// ```
///
/// Each field occupies exactly `DataType::size()` bytes, so the encoded
/// tuple is always `schema.tuple_size()` bytes long.
#[derive(Debug, Clone)]
pub struct Tuple {
    /// The schema defining the structure of this tuple
    schema: Arc<Schema>,

    /// The values for each column (in schema order)
    values: Vec<Value>,

    /// Where this tuple is stored, if it has been stored
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given schema and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the schema column count.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "Value count must match schema column count"
        );
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Returns the schema of this tuple.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the value at the given column index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value for the given column name.
    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    /// Returns all values in this tuple.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the location this tuple is stored at.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Stamps the tuple with its storage location.
    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Returns true if every value fits its column's type.
    pub fn conforms(&self) -> bool {
        self.schema
            .columns()
            .zip(&self.values)
            .all(|(col, value)| value.conforms_to(col.data_type()))
    }

    /// Appends exactly `schema.tuple_size()` bytes to `buf`.
    /// Returns None if a value does not fit its column.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Option<()> {
        if !self.conforms() {
            return None;
        }
        for (col, value) in self.schema.columns().zip(&self.values) {
            value.encode(col.data_type(), buf)?;
        }
        Some(())
    }

    /// Reads one tuple of the given schema, consuming exactly
    /// `schema.tuple_size()` bytes.
    pub fn decode<B: Buf>(schema: Arc<Schema>, buf: &mut B) -> Option<Self> {
        let values = schema
            .columns()
            .map(|col| Value::decode(buf, col.data_type()))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            schema,
            values,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
    current_index: usize,
}

impl TupleBuilder {
    /// Creates a new tuple builder for the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            values: vec![None; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = Some(value.into());
            self.current_index += 1;
        }
        self
    }

    /// Sets the value for a specific column by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.schema.column_index(name) {
            self.values[index] = Some(value.into());
        }
        self
    }

    /// Builds the tuple. Returns None if a column was left unset.
    pub fn build(self) -> Option<Tuple> {
        let values = self.values.into_iter().collect::<Option<Vec<_>>>()?;
        Some(Tuple::new(self.schema, values))
    }
}
