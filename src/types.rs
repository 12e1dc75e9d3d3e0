//! Core table model shared by the loader pipeline and the vocabulary engine.
//!
//! Raw files are read into an in-memory [`Table`]: a [`Schema`] (ordered,
//! typed [`Field`]s) plus row-major [`Value`] storage. A table optionally
//! carries a name, a metadata bag populated from its origin definition, and a
//! list of index columns naming its row identifier. With no index columns,
//! row identity is positional (`0..n-1`).

use std::collections::BTreeMap;

use crate::error::{HarmonizeError, HarmonizeResult};

/// Logical data type for a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Interned-string hint for label-like columns with heavy value reuse.
    ///
    /// Cells are stored as [`Value::Utf8`]; the distinction lives in the
    /// schema so downstream consumers can pick a dictionary encoding.
    Categorical,
    /// Numeric interval with configurable closedness.
    Interval,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Which side(s) of an interval are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// `[left, right)`
    Left,
    /// `(left, right]`
    Right,
    /// `[left, right]`
    Both,
    /// `(left, right)`
    Neither,
}

/// A numeric interval cell.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalValue {
    /// Left endpoint.
    pub left: f64,
    /// Right endpoint.
    pub right: f64,
    /// Which endpoints are included.
    pub closed: Closed,
}

/// A single typed value in a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Numeric interval.
    Interval(IntervalValue),
}

impl Value {
    /// Whether this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string content for `Utf8` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the value, if it is `Int64` or `Float64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`]
/// fields. Index columns are ordinary columns that have been promoted to the
/// row identifier via [`Table::set_index`]; they stay in the data so that
/// later stages can still address them by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
    /// Optional source identifier (e.g. the label set or dataset id).
    pub name: Option<String>,
    /// Arbitrary metadata carried from the origin definition.
    pub attrs: BTreeMap<String, serde_yaml::Value>,
    index_cols: Vec<String>,
}

impl Table {
    /// Create a table from schema and rows, with positional row identity.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            rows,
            name: None,
            attrs: BTreeMap::new(),
            index_cols: Vec::new(),
        }
    }

    /// Create an empty table with the given schema.
    pub fn empty(schema: Schema) -> Self {
        Self::new(schema, Vec::new())
    }

    /// Set the source identifier, builder-style.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the table.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    /// Clone out the values of a named column, or `None` if absent.
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// Replace the values of a named column.
    ///
    /// The replacement must have exactly one value per row.
    pub fn replace_column(&mut self, name: &str, values: Vec<Value>) -> HarmonizeResult<()> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| HarmonizeError::config(format!("no column named '{name}'")))?;
        if values.len() != self.rows.len() {
            return Err(HarmonizeError::schema(format!(
                "replacement for column '{name}' has {} values, table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Append a new column to the right edge of the table.
    pub fn push_column(&mut self, field: Field, values: Vec<Value>) -> HarmonizeResult<()> {
        if values.len() != self.rows.len() {
            return Err(HarmonizeError::schema(format!(
                "new column '{}' has {} values, table has {} rows",
                field.name,
                values.len(),
                self.rows.len()
            )));
        }
        if self.schema.index_of(&field.name).is_some() {
            return Err(HarmonizeError::config(format!(
                "column '{}' already exists",
                field.name
            )));
        }
        self.schema.fields.push(field);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Drop the named columns; unknown names are configuration errors.
    pub fn drop_columns(&mut self, names: &[String]) -> HarmonizeResult<()> {
        let mut drop_idxs = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .schema
                .index_of(name)
                .ok_or_else(|| HarmonizeError::config(format!("no column named '{name}'")))?;
            drop_idxs.push(idx);
        }
        drop_idxs.sort_unstable();
        drop_idxs.dedup();
        for &idx in drop_idxs.iter().rev() {
            self.schema.fields.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
        self.index_cols.retain(|c| !names.contains(c));
        Ok(())
    }

    /// Rename a column, keeping its position and any index membership.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> HarmonizeResult<()> {
        let idx = self
            .schema
            .index_of(from)
            .ok_or_else(|| HarmonizeError::config(format!("no column named '{from}'")))?;
        let to = to.into();
        if from != to && self.schema.index_of(&to).is_some() {
            return Err(HarmonizeError::config(format!(
                "column '{to}' already exists"
            )));
        }
        for c in &mut self.index_cols {
            if c == from {
                *c = to.clone();
            }
        }
        self.schema.fields[idx].name = to;
        Ok(())
    }

    /// Promote the named columns to the row identifier.
    ///
    /// An empty list clears the index and restores positional identity.
    pub fn set_index(&mut self, cols: Vec<String>) -> HarmonizeResult<()> {
        for col in &cols {
            if self.schema.index_of(col).is_none() {
                return Err(HarmonizeError::config(format!(
                    "index column '{col}' not present in table"
                )));
            }
        }
        self.index_cols = cols;
        Ok(())
    }

    /// The columns currently forming the row identifier (empty = positional).
    pub fn index_cols(&self) -> &[String] {
        &self.index_cols
    }

    /// Row labels: one entry per row, each a tuple of index-column values,
    /// or the position as `Int64` when no index is set.
    pub fn row_labels(&self) -> Vec<Vec<Value>> {
        if self.index_cols.is_empty() {
            return (0..self.rows.len())
                .map(|i| vec![Value::Int64(i as i64)])
                .collect();
        }
        let idxs: Vec<usize> = self
            .index_cols
            .iter()
            .filter_map(|c| self.schema.index_of(c))
            .collect();
        self.rows
            .iter()
            .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
            .collect()
    }

    /// Append all rows of `other`; schemas must be identical.
    pub fn append(&mut self, other: Table) -> HarmonizeResult<()> {
        if other.schema != self.schema {
            return Err(HarmonizeError::schema(format!(
                "cannot concatenate tables with differing schemas ({:?} vs {:?})",
                self.schema.field_names().collect::<Vec<_>>(),
                other.schema.field_names().collect::<Vec<_>>()
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Release excess capacity after column-wise rewrites.
    ///
    /// Housekeeping only; has no semantic effect.
    pub fn compact(&mut self) {
        self.rows.shrink_to_fit();
        for row in &mut self.rows {
            row.shrink_to_fit();
        }
    }
}
