use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::DataType;

/// Represents a single column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    name: String,

    /// Column data type
    data_type: DataType,

    /// Column position in the schema (0-indexed)
    ordinal: usize,
}

impl Column {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            ordinal: 0, // Will be set by Schema
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column data type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Returns the column's ordinal position in the schema.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the number of bytes this column occupies in a tuple.
    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Represents the schema of a table, defining its columns and structure.
///
/// Tuples of a schema all have the same width: the sum of the column
/// sizes, with no per-tuple header.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,

    /// Map from column name to column index for fast lookup
    name_to_index: HashMap<String, usize>,

    /// Width of every tuple in bytes
    tuple_size: usize,
}

impl Schema {
    /// Creates a new schema from a list of columns.
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns = columns;
        let mut name_to_index = HashMap::new();
        let mut tuple_size = 0;

        // Assign ordinals and build index
        for (i, col) in columns.iter_mut().enumerate() {
            col.ordinal = i;
            name_to_index.insert(col.name.clone(), i);
            tuple_size += col.size();
        }

        Self {
            columns,
            name_to_index,
            tuple_size,
        }
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Returns the number of columns in the schema.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column at the given index.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the index of the column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Returns an iterator over all columns.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the fixed width of tuples with this schema.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", col.data_type, col.name)?;
        }
        Ok(())
    }
}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Adds a column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
