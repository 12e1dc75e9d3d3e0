//! Vocabulary tables and translation between label axes.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{HarmonizeError, HarmonizeResult};
use crate::types::{DataType, Field, Schema, Table, Value};

/// Name of the canonical-code column in a vocabulary table.
pub const CODE_COLUMN: &str = "code";

/// Reserved metadata tags allowed in the metadata-prefixed definition shape.
const META_TAGS: &[&str] = &[
    "code_type",
    "orient",
    "columns",
    "ordered",
    "parent",
    "parent_file",
    "hierarchy_level",
    "data",
];

/// Orientation of a dictionary-of-dictionaries definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orient {
    /// Top-level keys are canonical codes; each value is a record of column
    /// values.
    #[default]
    ByCode,
    /// Top-level keys are column names; each value maps codes to cells.
    ByColumn,
}

impl Orient {
    fn parse(s: &str) -> HarmonizeResult<Self> {
        match s {
            "by_code" | "code" | "index" => Ok(Self::ByCode),
            "by_column" | "column" | "columns" => Ok(Self::ByColumn),
            other => Err(HarmonizeError::config(format!(
                "unknown orientation '{other}' (expected 'by_code' or 'by_column')"
            ))),
        }
    }
}

/// An axis of a vocabulary table: the reserved code axis, or a named
/// alternate-label column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axis {
    /// The canonical-code axis.
    Code,
    /// A named alternate-label column.
    Column(String),
}

impl Axis {
    /// Convenience constructor for a named column axis.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    /// The column name this axis addresses.
    pub fn name(&self) -> &str {
        match self {
            Axis::Code => CODE_COLUMN,
            Axis::Column(name) => name.as_str(),
        }
    }
}

/// What to do with a value that has no vocabulary entry during translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Raise a translation error (default).
    #[default]
    Raise,
    /// Map the value to null instead.
    Null,
}

/// Which labels of a table a [`LabelMap::translate_index`] call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAxis {
    /// The table's row index columns.
    Rows,
    /// The table's column labels.
    Columns,
}

/// Metadata-prefixed definition shape. All tags other than `data` are
/// optional and end up in the vocabulary table's metadata bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelSetMeta {
    code_type: Option<String>,
    orient: Option<String>,
    columns: Option<Vec<String>>,
    ordered: Option<bool>,
    parent: Option<String>,
    parent_file: Option<String>,
    hierarchy_level: Option<String>,
    data: Mapping,
}

/// A vocabulary table mapping canonical codes to alternate labelings.
///
/// The backing table is owned and immutable after construction; read access
/// is by shared reference ([`LabelMap::table`]) or defensive copy
/// ([`LabelMap::to_table`]).
#[derive(Debug, Clone)]
pub struct LabelMap {
    table: Table,
}

impl LabelMap {
    /// Wrap an existing vocabulary table.
    ///
    /// The table must have a `code` column with unique values.
    pub fn from_table(table: Table) -> HarmonizeResult<Self> {
        let Some(code_idx) = table.schema.index_of(CODE_COLUMN) else {
            return Err(HarmonizeError::schema(format!(
                "vocabulary table has no '{CODE_COLUMN}' column"
            )));
        };
        let mut seen: Vec<&Value> = Vec::with_capacity(table.row_count());
        for row in &table.rows {
            let code = &row[code_idx];
            if seen.contains(&code) {
                return Err(HarmonizeError::schema(format!(
                    "duplicate code {code:?} in vocabulary table"
                )));
            }
            seen.push(code);
        }
        Ok(Self { table })
    }

    /// Build from a dictionary-of-dictionaries with default dtypes
    /// (categorical code axis and value columns).
    pub fn from_dict(defs: &Mapping, orient: Orient) -> HarmonizeResult<Self> {
        Self::from_dict_with(defs, orient, DataType::Categorical, DataType::Categorical)
    }

    /// Build from a dictionary-of-dictionaries with explicit dtype hints.
    ///
    /// Dtype hints annotate the schema; cells keep the natural type of the
    /// definition scalars.
    pub fn from_dict_with(
        defs: &Mapping,
        orient: Orient,
        code_dtype: DataType,
        values_dtype: DataType,
    ) -> HarmonizeResult<Self> {
        let (codes, columns) = match orient {
            Orient::ByCode => collect_by_code(defs)?,
            Orient::ByColumn => collect_by_column(defs)?,
        };

        let mut fields = vec![Field::new(CODE_COLUMN, code_dtype)];
        for (name, _) in &columns {
            fields.push(Field::new(name.clone(), values_dtype.clone()));
        }
        let rows = codes
            .iter()
            .enumerate()
            .map(|(row_idx, code)| {
                let mut row = Vec::with_capacity(columns.len() + 1);
                row.push(Value::Utf8(code.clone()));
                for (_, cells) in &columns {
                    row.push(cells[row_idx].clone());
                }
                row
            })
            .collect();

        let mut table = Table::new(Schema::new(fields), rows);
        table.set_index(vec![CODE_COLUMN.to_string()])?;
        Self::from_table(table)
    }

    /// Load from YAML text, distinguishing flat from metadata-prefixed
    /// definitions.
    ///
    /// `keys` optionally navigates into a nested mapping before parsing
    /// (e.g. the label-set name inside a multi-set file). `keep_metadata`
    /// controls whether non-`data` metadata tags are carried into the
    /// table's metadata bag.
    pub fn from_yaml_str(
        yaml: &str,
        keys: &[&str],
        keep_metadata: bool,
    ) -> HarmonizeResult<Self> {
        let parsed: YamlValue = serde_yaml::from_str(yaml)?;
        let mut current = &parsed;
        for key in keys {
            let key_value = YamlValue::String((*key).to_string());
            current = current
                .as_mapping()
                .and_then(|m| m.get(&key_value))
                .ok_or_else(|| {
                    HarmonizeError::config(format!("no label set '{key}' in definition"))
                })?;
        }
        let def = current.as_mapping().ok_or_else(|| {
            HarmonizeError::schema("label definition is not a mapping".to_string())
        })?;
        let mut map = Self::parse_definition(def, keep_metadata)?;
        if let Some(last) = keys.last() {
            map.table.name = Some((*last).to_string());
        }
        Ok(map)
    }

    /// Load from a YAML file; see [`LabelMap::from_yaml_str`].
    pub fn from_yaml_file(
        path: impl AsRef<Path>,
        keys: &[&str],
        keep_metadata: bool,
    ) -> HarmonizeResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text, keys, keep_metadata)
    }

    /// Parse a single definition mapping.
    ///
    /// Disambiguation: a mapping whose key set is a subset of the reserved
    /// metadata tags *and* contains `data` is metadata-prefixed; anything
    /// else (including a metadata-looking block with an unknown tag) parses
    /// as the flat shape.
    fn parse_definition(def: &Mapping, keep_metadata: bool) -> HarmonizeResult<Self> {
        if is_metadata_prefixed(def) {
            let meta: LabelSetMeta = serde_yaml::from_value(YamlValue::Mapping(def.clone()))?;
            let orient = match &meta.orient {
                Some(s) => Orient::parse(s)?,
                None => Orient::default(),
            };
            let code_dtype = match &meta.code_type {
                Some(s) => parse_dtype(s)?,
                None => DataType::Categorical,
            };
            let mut map =
                Self::from_dict_with(&meta.data, orient, code_dtype, DataType::Categorical)?;
            if let Some(order) = &meta.columns {
                map.reorder_columns(order)?;
            }
            if keep_metadata {
                map.absorb_metadata(&meta);
            }
            Ok(map)
        } else {
            Self::from_dict(def, Orient::default())
        }
    }

    fn reorder_columns(&mut self, order: &[String]) -> HarmonizeResult<()> {
        let mut wanted: Vec<String> = vec![CODE_COLUMN.to_string()];
        for name in order {
            if self.table.schema.index_of(name).is_none() {
                return Err(HarmonizeError::config(format!(
                    "column ordering names unknown column '{name}'"
                )));
            }
            wanted.push(name.clone());
        }
        // Unlisted columns keep their relative order after the listed ones.
        for field in &self.table.schema.fields {
            if !wanted.contains(&field.name) {
                wanted.push(field.name.clone());
            }
        }
        let idxs: Vec<usize> = wanted
            .iter()
            .filter_map(|name| self.table.schema.index_of(name))
            .collect();
        self.table.schema.fields = idxs
            .iter()
            .map(|&i| self.table.schema.fields[i].clone())
            .collect();
        for row in &mut self.table.rows {
            *row = idxs.iter().map(|&i| row[i].clone()).collect();
        }
        Ok(())
    }

    fn absorb_metadata(&mut self, meta: &LabelSetMeta) {
        let attrs = &mut self.table.attrs;
        if let Some(v) = &meta.code_type {
            attrs.insert("code_type".to_string(), YamlValue::String(v.clone()));
        }
        if let Some(v) = &meta.orient {
            attrs.insert("orient".to_string(), YamlValue::String(v.clone()));
        }
        if let Some(v) = &meta.columns {
            attrs.insert(
                "columns".to_string(),
                YamlValue::Sequence(
                    v.iter().map(|c| YamlValue::String(c.clone())).collect(),
                ),
            );
        }
        if let Some(v) = meta.ordered {
            attrs.insert("ordered".to_string(), YamlValue::Bool(v));
        }
        if let Some(v) = &meta.parent {
            attrs.insert("parent".to_string(), YamlValue::String(v.clone()));
        }
        if let Some(v) = &meta.parent_file {
            attrs.insert("parent_file".to_string(), YamlValue::String(v.clone()));
        }
        if let Some(v) = &meta.hierarchy_level {
            attrs.insert(
                "hierarchy_level".to_string(),
                YamlValue::String(v.clone()),
            );
        }
    }

    /// Borrow the backing vocabulary table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Defensive copy of the backing vocabulary table.
    pub fn to_table(&self) -> Table {
        self.table.clone()
    }

    /// The canonical codes, in definition order.
    pub fn codes(&self) -> Vec<String> {
        self.axis_values(&Axis::Code)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn axis_values(&self, axis: &Axis) -> HarmonizeResult<Vec<Value>> {
        self.table.column_values(axis.name()).ok_or_else(|| {
            HarmonizeError::config(format!(
                "vocabulary table has no axis named '{}'",
                axis.name()
            ))
        })
    }

    /// Translate a sequence of values from one axis to another.
    ///
    /// Null inputs pass through as null. A value absent from `from` but
    /// already present in `to` passes through unchanged (it is not
    /// newly-missing). A value absent from both raises a translation error
    /// under [`MissingPolicy::Raise`], or becomes null under
    /// [`MissingPolicy::Null`].
    pub fn translate(
        &self,
        values: &[Value],
        from: &Axis,
        to: &Axis,
        on_missing: MissingPolicy,
    ) -> HarmonizeResult<Vec<Value>> {
        let from_values = self.axis_values(from)?;
        let to_values = self.axis_values(to)?;

        let mut out = Vec::with_capacity(values.len());
        for value in values {
            if value.is_null() {
                out.push(Value::Null);
                continue;
            }
            if let Some(pos) = from_values.iter().position(|v| v == value) {
                out.push(to_values[pos].clone());
            } else if to_values.contains(value) {
                out.push(value.clone());
            } else {
                match on_missing {
                    MissingPolicy::Raise => {
                        return Err(HarmonizeError::Translation {
                            value: value_display(value),
                            from_axis: from.name().to_string(),
                            to_axis: to.name().to_string(),
                        });
                    }
                    MissingPolicy::Null => out.push(Value::Null),
                }
            }
        }
        Ok(out)
    }

    /// Translate a table's row index values or column labels.
    ///
    /// For [`TableAxis::Rows`], the table must have index columns; `level`
    /// names which index column to translate when the index is multi-level,
    /// and must be absent when it is single-level. For
    /// [`TableAxis::Columns`], `level` must always be absent (column labels
    /// are single-level); a label whose translation is null keeps its
    /// original name.
    pub fn translate_index(
        &self,
        table: &Table,
        from: &Axis,
        to: &Axis,
        axis: TableAxis,
        level: Option<&str>,
        on_missing: MissingPolicy,
    ) -> HarmonizeResult<Table> {
        match axis {
            TableAxis::Columns => {
                if level.is_some() {
                    return Err(HarmonizeError::config(
                        "level selector not supported for single-level column labels",
                    ));
                }
                let labels: Vec<Value> = table
                    .schema
                    .field_names()
                    .map(|name| Value::Utf8(name.to_string()))
                    .collect();
                let translated = self.translate(&labels, from, to, on_missing)?;
                let mut out = table.clone();
                let old_names: Vec<String> =
                    table.schema.field_names().map(str::to_string).collect();
                for (old, new) in old_names.iter().zip(&translated) {
                    if let Some(new_name) = new.as_str() {
                        out.rename_column(old, new_name)?;
                    }
                }
                Ok(out)
            }
            TableAxis::Rows => {
                let index_cols = table.index_cols();
                if index_cols.is_empty() {
                    return Err(HarmonizeError::config(
                        "table has positional row identity; set index columns before \
                         translating row labels",
                    ));
                }
                let target = if index_cols.len() > 1 {
                    let level = level.ok_or_else(|| {
                        HarmonizeError::config(
                            "level selector required for a multi-level row index",
                        )
                    })?;
                    if !index_cols.iter().any(|c| c == level) {
                        return Err(HarmonizeError::config(format!(
                            "'{level}' is not an index column of the table"
                        )));
                    }
                    level.to_string()
                } else {
                    if level.is_some() {
                        return Err(HarmonizeError::config(
                            "level selector not allowed for a single-level row index",
                        ));
                    }
                    index_cols[0].clone()
                };
                let values = table.column_values(&target).ok_or_else(|| {
                    HarmonizeError::config(format!("no column named '{target}'"))
                })?;
                let translated = self.translate(&values, from, to, on_missing)?;
                let mut out = table.clone();
                out.replace_column(&target, translated)?;
                Ok(out)
            }
        }
    }
}

fn is_metadata_prefixed(def: &Mapping) -> bool {
    let mut has_data = false;
    for (key, _) in def {
        match key.as_str() {
            Some("data") => has_data = true,
            Some(tag) if META_TAGS.contains(&tag) => {}
            _ => return false,
        }
    }
    has_data
}

fn parse_dtype(s: &str) -> HarmonizeResult<DataType> {
    match s {
        "category" | "categorical" => Ok(DataType::Categorical),
        "str" | "string" | "utf8" => Ok(DataType::Utf8),
        "int" | "int64" => Ok(DataType::Int64),
        other => Err(HarmonizeError::config(format!(
            "unknown code_type '{other}'"
        ))),
    }
}

fn yaml_scalar(value: &YamlValue) -> HarmonizeResult<Value> {
    match value {
        YamlValue::Null => Ok(Value::Null),
        YamlValue::Bool(b) => Ok(Value::Bool(*b)),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int64(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float64(f))
            } else {
                Err(HarmonizeError::schema(format!(
                    "unrepresentable number {n} in label definition"
                )))
            }
        }
        YamlValue::String(s) => Ok(Value::Utf8(s.clone())),
        _ => Err(HarmonizeError::schema(
            "label definition cells must be scalars".to_string(),
        )),
    }
}

fn string_key(key: &YamlValue) -> HarmonizeResult<String> {
    key.as_str().map(str::to_string).ok_or_else(|| {
        HarmonizeError::schema("label definition keys must be strings".to_string())
    })
}

type ColumnCells = Vec<(String, Vec<Value>)>;

/// Collect codes and columns from the by-code orientation: keys are codes,
/// values are records of column cells.
fn collect_by_code(defs: &Mapping) -> HarmonizeResult<(Vec<String>, ColumnCells)> {
    let mut codes: Vec<String> = Vec::with_capacity(defs.len());
    let mut columns: ColumnCells = Vec::new();
    for (key, record) in defs {
        let code = string_key(key)?;
        let record = record.as_mapping().ok_or_else(|| {
            HarmonizeError::schema(format!(
                "record for code '{code}' is not a mapping of column values"
            ))
        })?;
        let row_idx = codes.len();
        codes.push(code);
        for (col_key, cell) in record {
            let col = string_key(col_key)?;
            let col_idx = match columns.iter().position(|(name, _)| *name == col) {
                Some(idx) => idx,
                None => {
                    columns.push((col, Vec::new()));
                    columns.len() - 1
                }
            };
            let cells = &mut columns[col_idx].1;
            cells.resize(row_idx, Value::Null);
            cells.push(yaml_scalar(cell)?);
        }
    }
    for (_, cells) in &mut columns {
        cells.resize(codes.len(), Value::Null);
    }
    Ok((codes, columns))
}

/// Collect codes and columns from the by-column orientation: keys are column
/// names, values map codes to cells.
fn collect_by_column(defs: &Mapping) -> HarmonizeResult<(Vec<String>, ColumnCells)> {
    let mut codes: Vec<String> = Vec::new();
    let mut raw_columns: Vec<(String, Vec<(String, Value)>)> = Vec::new();
    for (key, cells) in defs {
        let col = string_key(key)?;
        let cells = cells.as_mapping().ok_or_else(|| {
            HarmonizeError::schema(format!(
                "column '{col}' is not a mapping of code to cell values"
            ))
        })?;
        let mut collected = Vec::with_capacity(cells.len());
        for (code_key, cell) in cells {
            let code = string_key(code_key)?;
            if !codes.contains(&code) {
                codes.push(code.clone());
            }
            collected.push((code, yaml_scalar(cell)?));
        }
        raw_columns.push((col, collected));
    }
    let columns = raw_columns
        .into_iter()
        .map(|(name, collected)| {
            let cells = codes
                .iter()
                .map(|code| {
                    collected
                        .iter()
                        .find(|(c, _)| c == code)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null)
                })
                .collect();
            (name, cells)
        })
        .collect();
    Ok((codes, columns))
}

fn value_display(value: &Value) -> String {
    match value {
        Value::Utf8(s) => s.clone(),
        other => format!("{other:?}"),
    }
}
