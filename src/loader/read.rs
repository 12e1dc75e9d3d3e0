//! Raw-file readers for the loading pipeline.
//!
//! Readers produce *raw* tables: CSV cells stay untyped (`Utf8`, empty →
//! null) because dtype coercion is the pipeline's first processing stage;
//! JSON and Parquet carry their containers' natural types, which the
//! pipeline may still coerce.
//!
//! Formats are inferred from the file extension via [`RawFormat`], or forced
//! by calling a format-specific reader directly.

use std::fs;
use std::path::{Path, PathBuf};

use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field as ParquetField;

use crate::error::{HarmonizeError, HarmonizeResult};
use crate::types::{DataType, Field, Schema, Table, Value};

/// Supported raw-file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array-of-objects or NDJSON.
    Json,
    /// Apache Parquet.
    Parquet,
}

impl RawFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" => Some(Self::Json),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }

    /// Infer a format from a path's extension.
    pub fn infer_from_path(path: &Path) -> HarmonizeResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                HarmonizeError::schema(format!(
                    "cannot infer format: path has no extension ({})",
                    path.display()
                ))
            })?;
        Self::from_extension(ext).ok_or_else(|| {
            HarmonizeError::schema(format!(
                "cannot infer format from extension '{ext}' for path ({})",
                path.display()
            ))
        })
    }
}

/// Read a raw file, inferring the format from its extension.
pub fn read_table(path: impl AsRef<Path>) -> HarmonizeResult<Table> {
    let path = path.as_ref();
    match RawFormat::infer_from_path(path)? {
        RawFormat::Csv => read_csv_table(path),
        RawFormat::Json => read_json_table(path),
        RawFormat::Parquet => read_parquet_table(path),
    }
}

/// Read a CSV file into an untyped raw table.
///
/// Rules:
///
/// - The CSV must have headers; they become the schema, all `Utf8`.
/// - Cells are trimmed; empty cells become null.
pub fn read_csv_table(path: impl AsRef<Path>) -> HarmonizeResult<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    read_csv_table_from_reader(&mut rdr)
}

/// Read CSV data from an existing reader; see [`read_csv_table`].
pub fn read_csv_table_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> HarmonizeResult<Table> {
    let headers = rdr.headers()?.clone();
    let fields: Vec<Field> = headers
        .iter()
        .map(|h| Field::new(h.trim(), DataType::Utf8))
        .collect();
    let width = fields.len();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let mut row = Vec::with_capacity(width);
        for idx in 0..width {
            let raw = record.get(idx).unwrap_or("").trim();
            if raw.is_empty() {
                row.push(Value::Null);
            } else {
                row.push(Value::Utf8(raw.to_string()));
            }
        }
        rows.push(row);
    }
    Ok(Table::new(Schema::new(fields), rows))
}

/// Read a JSON file into a naturally-typed raw table.
pub fn read_json_table(path: impl AsRef<Path>) -> HarmonizeResult<Table> {
    let text = fs::read_to_string(path)?;
    read_json_table_from_str(&text)
}

/// Read JSON from an in-memory string into a raw table.
///
/// Supported inputs:
/// - A JSON array of objects: `[{"a":1}, {"a":2}]`
/// - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
///
/// Columns come from the first record; later records may omit keys (null)
/// and extra keys are ignored.
pub fn read_json_table_from_str(input: &str) -> HarmonizeResult<Table> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HarmonizeError::schema("json input is empty".to_string()));
    }

    // First try parsing as a single JSON value (array or object).
    let values: Vec<serde_json::Value> =
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
            match v {
                serde_json::Value::Array(items) => items,
                serde_json::Value::Object(_) => vec![v],
                _ => {
                    return Err(HarmonizeError::schema(
                        "json must be an object, an array of objects, or NDJSON".to_string(),
                    ));
                }
            }
        } else {
            // Fall back to NDJSON.
            let mut items = Vec::new();
            for (i, line) in trimmed.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                    HarmonizeError::schema(format!("invalid ndjson at line {}: {}", i + 1, e))
                })?;
                items.push(v);
            }
            items
        };

    let Some(first) = values.first() else {
        return Err(HarmonizeError::schema(
            "json input has no records".to_string(),
        ));
    };
    let first = first.as_object().ok_or_else(|| {
        HarmonizeError::schema("row 1 is not a json object".to_string())
    })?;

    let fields: Vec<Field> = first
        .iter()
        .map(|(name, v)| Field::new(name.clone(), json_natural_dtype(v)))
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(values.len());
    for (idx0, v) in values.iter().enumerate() {
        let row_num = idx0 + 1;
        let obj = v.as_object().ok_or_else(|| {
            HarmonizeError::schema(format!("row {row_num} is not a json object"))
        })?;
        let mut row = Vec::with_capacity(fields.len());
        for field in &fields {
            match obj.get(&field.name) {
                None => row.push(Value::Null),
                Some(jv) => row.push(convert_json_value(row_num, &field.name, jv)?),
            }
        }
        rows.push(row);
    }
    Ok(Table::new(Schema::new(fields), rows))
}

fn json_natural_dtype(v: &serde_json::Value) -> DataType {
    match v {
        serde_json::Value::Bool(_) => DataType::Bool,
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
        serde_json::Value::Number(_) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn convert_json_value(
    row: usize,
    column: &str,
    v: &serde_json::Value,
) -> HarmonizeResult<Value> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int64(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float64(f))
            } else {
                Err(HarmonizeError::Parse {
                    row,
                    column: column.to_string(),
                    raw: v.to_string(),
                    message: "number out of representable range".to_string(),
                })
            }
        }
        serde_json::Value::String(s) => Ok(Value::Utf8(s.clone())),
        _ => Err(HarmonizeError::Parse {
            row,
            column: column.to_string(),
            raw: v.to_string(),
            message: "nested arrays/objects are not supported in raw tables".to_string(),
        }),
    }
}

/// Read a Parquet file into a naturally-typed raw table.
///
/// Uses the Parquet record API; columns come from the first row's column
/// iterator (or the file schema's leaf columns for an empty file).
pub fn read_parquet_table(path: impl AsRef<Path>) -> HarmonizeResult<Table> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;

    let leaf_names: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.path().string())
        .collect();

    let mut fields: Option<Vec<Field>> = None;
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;
        let mut converted: Vec<(String, Value)> = Vec::new();
        for (name, field) in row.get_column_iter() {
            converted.push((
                name.clone(),
                convert_parquet_field(row_num, name, field)?,
            ));
        }
        if fields.is_none() {
            fields = Some(
                converted
                    .iter()
                    .map(|(name, value)| Field::new(name.clone(), natural_dtype(value)))
                    .collect(),
            );
        }
        rows.push(converted.into_iter().map(|(_, v)| v).collect());
    }

    let fields = fields.unwrap_or_else(|| {
        leaf_names
            .iter()
            .map(|name| Field::new(name.clone(), DataType::Utf8))
            .collect()
    });
    Ok(Table::new(Schema::new(fields), rows))
}

fn natural_dtype(value: &Value) -> DataType {
    match value {
        Value::Int64(_) => DataType::Int64,
        Value::Float64(_) => DataType::Float64,
        Value::Bool(_) => DataType::Bool,
        _ => DataType::Utf8,
    }
}

fn convert_parquet_field(
    row: usize,
    column: &str,
    f: &ParquetField,
) -> HarmonizeResult<Value> {
    match f {
        ParquetField::Null => Ok(Value::Null),
        ParquetField::Bool(b) => Ok(Value::Bool(*b)),
        ParquetField::Byte(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::Short(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::Int(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::Long(v) => Ok(Value::Int64(*v)),
        ParquetField::UByte(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::UShort(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::UInt(v) => Ok(Value::Int64(i64::from(*v))),
        ParquetField::ULong(v) => {
            i64::try_from(*v)
                .map(Value::Int64)
                .map_err(|_| HarmonizeError::Parse {
                    row,
                    column: column.to_string(),
                    raw: f.to_string(),
                    message: "u64 out of range for i64".to_string(),
                })
        }
        ParquetField::Float(v) => Ok(Value::Float64(f64::from(*v))),
        ParquetField::Double(v) => Ok(Value::Float64(*v)),
        ParquetField::Str(s) => Ok(Value::Utf8(s.clone())),
        ParquetField::Group(_) | ParquetField::ListInternal(_) | ParquetField::MapInternal(_) => {
            Err(HarmonizeError::Parse {
                row,
                column: column.to_string(),
                raw: f.to_string(),
                message: "nested parquet groups are not supported in raw tables".to_string(),
            })
        }
        // Dates, timestamps, decimals and other logical types keep their
        // display form; dtype coercion can refine them downstream.
        other => Ok(Value::Utf8(other.to_string())),
    }
}

/// Read several files with a per-file reader and row-concatenate them.
///
/// Files are concatenated in input order; downstream adjustments may rely on
/// that (e.g. versioned files listed oldest-first). Schemas must match.
pub fn read_and_concat<F>(paths: &[PathBuf], mut read_fn: F) -> HarmonizeResult<Table>
where
    F: FnMut(&Path) -> HarmonizeResult<Table>,
{
    let Some((first, rest)) = paths.split_first() else {
        return Err(HarmonizeError::config(
            "no data files given to concatenate",
        ));
    };
    let mut table = read_fn(first)?;
    for path in rest {
        table.append(read_fn(path)?)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::{
        read_and_concat, read_csv_table, read_csv_table_from_reader, read_json_table_from_str,
        RawFormat,
    };
    use crate::types::Value;
    use std::path::{Path, PathBuf};

    #[test]
    fn format_inference_by_extension() {
        assert_eq!(
            RawFormat::infer_from_path(Path::new("a/b.csv")).unwrap(),
            RawFormat::Csv
        );
        assert_eq!(
            RawFormat::infer_from_path(Path::new("b.NDJSON")).unwrap(),
            RawFormat::Json
        );
        assert_eq!(
            RawFormat::infer_from_path(Path::new("c.pq")).unwrap(),
            RawFormat::Parquet
        );
        assert!(RawFormat::infer_from_path(Path::new("noext")).is_err());
        assert!(RawFormat::infer_from_path(Path::new("d.xml")).is_err());
    }

    #[test]
    fn csv_cells_stay_untyped_and_empty_cells_null() {
        let input = "region,value\nCN,42\nUS,\n";
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input.as_bytes());
        let table = read_csv_table_from_reader(&mut rdr).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][1], Value::Utf8("42".to_string()));
        assert_eq!(table.rows[1][1], Value::Null);
    }

    #[test]
    fn json_array_and_ndjson_agree() {
        let array = r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]"#;
        let ndjson = "{\"id\": 1, \"name\": \"a\"}\n{\"id\": 2, \"name\": \"b\"}\n";
        let a = read_json_table_from_str(array).unwrap();
        let b = read_json_table_from_str(ndjson).unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.rows[0][0], Value::Int64(1));
    }

    #[test]
    fn json_missing_keys_become_null() {
        let input = r#"[{"id": 1, "name": "a"}, {"id": 2}]"#;
        let table = read_json_table_from_str(input).unwrap();
        let name_idx = table.schema.index_of("name").unwrap();
        assert_eq!(table.rows[1][name_idx], Value::Null);
    }

    #[test]
    fn concat_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("v2019.csv");
        let new = dir.path().join("v2020.csv");
        std::fs::write(&old, "id\n1\n2\n").unwrap();
        std::fs::write(&new, "id\n3\n").unwrap();

        let table =
            read_and_concat(&[old, new], |p| read_csv_table(p)).unwrap();
        let ids: Vec<_> = table.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            ids,
            vec![
                Value::Utf8("1".to_string()),
                Value::Utf8("2".to_string()),
                Value::Utf8("3".to_string()),
            ]
        );
    }

    #[test]
    fn concat_rejects_mismatched_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        std::fs::write(&a, "id\n1\n").unwrap();
        std::fs::write(&b, "other\n2\n").unwrap();
        assert!(read_and_concat(&[a, b], |p| read_csv_table(p)).is_err());
    }

    #[test]
    fn concat_requires_at_least_one_path() {
        let paths: Vec<PathBuf> = Vec::new();
        assert!(read_and_concat(&paths, |p| read_csv_table(p)).is_err());
    }
}
