//! The declarative table-loading pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::error::{HarmonizeError, HarmonizeResult};
use crate::loader::observer::{
    severity_for_error, LoadContext, LoadObserver, LoadStats, Severity,
};
use crate::loader::source::{LoadRequest, RawSource};
use crate::types::{DataType, Table, Value};

/// A whole-table transform; must return a new table rather than rely on
/// shared state.
pub type GlobalAdjustment = Box<dyn Fn(Table) -> HarmonizeResult<Table> + Send + Sync>;

/// A single-column transform; must return a column of the same length.
pub type ColumnAdjustment = Box<dyn Fn(Vec<Value>) -> HarmonizeResult<Vec<Value>> + Send + Sync>;

/// Loader turning raw per-source files into a canonically-typed,
/// canonically-indexed table.
///
/// The loader owns its configuration and adjustment functions exclusively;
/// a new source plugs in by implementing [`RawSource`] and declaring dtype
/// coercions and adjustments here, without touching the pipeline.
///
/// Processing runs five ordered stages over the raw table:
///
/// 1. dtype coercion (unmapped columns pass through unchanged)
/// 2. global pre-adjustments, left-to-right
/// 3. per-column adjustments, list order per column, **no ordering guarantee
///    across columns**
/// 4. global post-adjustments, left-to-right
/// 5. indexing (an empty index column list is a no-op)
pub struct TableLoader<S: RawSource> {
    source: S,
    config: SourceConfig,
    dtypes: BTreeMap<String, DataType>,
    index_cols: Vec<String>,
    pre_adjustments: Vec<GlobalAdjustment>,
    column_adjustments: BTreeMap<String, Vec<ColumnAdjustment>>,
    post_adjustments: Vec<GlobalAdjustment>,
    observer: Option<Arc<dyn LoadObserver>>,
    alert_at_or_above: Severity,
}

impl<S: RawSource> TableLoader<S> {
    /// Create a loader with no coercions, adjustments or index columns.
    pub fn new(source: S, config: SourceConfig) -> Self {
        Self {
            source,
            config,
            dtypes: BTreeMap::new(),
            index_cols: Vec::new(),
            pre_adjustments: Vec::new(),
            column_adjustments: BTreeMap::new(),
            post_adjustments: Vec::new(),
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }

    /// Declare a dtype coercion for one raw column.
    pub fn with_dtype(mut self, column: impl Into<String>, dtype: DataType) -> Self {
        self.dtypes.insert(column.into(), dtype);
        self
    }

    /// Declare dtype coercions for several raw columns.
    pub fn with_dtypes<I, N>(mut self, dtypes: I) -> Self
    where
        I: IntoIterator<Item = (N, DataType)>,
        N: Into<String>,
    {
        for (column, dtype) in dtypes {
            self.dtypes.insert(column.into(), dtype);
        }
        self
    }

    /// Declare the columns promoted to the row identifier after processing.
    pub fn with_index_cols<I, N>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.index_cols = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Append a whole-table transform applied before column adjustments.
    pub fn with_pre_adjustment<F>(mut self, adjustment: F) -> Self
    where
        F: Fn(Table) -> HarmonizeResult<Table> + Send + Sync + 'static,
    {
        self.pre_adjustments.push(Box::new(adjustment));
        self
    }

    /// Append a transform to one column's adjustment list.
    ///
    /// Adjustments for a column run in the order declared; adjustments must
    /// not depend on the processing order of sibling columns.
    pub fn with_column_adjustment<F>(mut self, column: impl Into<String>, adjustment: F) -> Self
    where
        F: Fn(Vec<Value>) -> HarmonizeResult<Vec<Value>> + Send + Sync + 'static,
    {
        self.column_adjustments
            .entry(column.into())
            .or_default()
            .push(Box::new(adjustment));
        self
    }

    /// Append a whole-table transform applied after column adjustments.
    pub fn with_post_adjustment<F>(mut self, adjustment: F) -> Self
    where
        F: Fn(Table) -> HarmonizeResult<Table> + Send + Sync + 'static,
    {
        self.post_adjustments.push(Box::new(adjustment));
        self
    }

    /// Attach an observer for load events.
    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set the severity threshold at which failures also raise alerts.
    pub fn with_alert_threshold(mut self, severity: Severity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    /// The loader's configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Mutable access for extending the configuration between loads.
    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    /// Run the full pipeline: locate raw files, read them, process.
    ///
    /// Missing raw files surface as file-not-found errors; they reflect
    /// static configuration problems and are never retried.
    pub fn load(&self, request: &LoadRequest) -> HarmonizeResult<Table> {
        let mut ctx = LoadContext {
            dataset: request.dataset.clone(),
            paths: Vec::new(),
        };
        let result = self.load_inner(request, &mut ctx);
        if let Some(observer) = self.observer.as_ref() {
            match &result {
                Ok(table) => observer.on_success(
                    &ctx,
                    LoadStats {
                        rows: table.row_count(),
                        columns: table.column_count(),
                    },
                ),
                Err(error) => {
                    let severity = severity_for_error(error);
                    observer.on_failure(&ctx, severity, error);
                    if severity >= self.alert_at_or_above {
                        observer.on_alert(&ctx, severity, error);
                    }
                }
            }
        }
        result
    }

    fn load_inner(
        &self,
        request: &LoadRequest,
        ctx: &mut LoadContext,
    ) -> HarmonizeResult<Table> {
        let paths = self.source.raw_datafile_paths(&self.config, request)?;
        ctx.paths = paths.clone();
        let raw = self.source.read_raw_datafiles(&paths, &self.config)?;
        self.process(raw)
    }

    /// Run the processing stages over an already-read raw table.
    ///
    /// The raw table is consumed; the result is a new value and repeated
    /// invocations over equal input produce identical output.
    pub fn process(&self, raw: Table) -> HarmonizeResult<Table> {
        let mut table = raw;

        for (column, dtype) in &self.dtypes {
            let idx = self.require_column(&table, column, "dtype mapping")?;
            let values = table
                .column_values(column)
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(row0, value)| coerce_value(row0 + 1, column, dtype, value))
                .collect::<HarmonizeResult<Vec<Value>>>()?;
            table.replace_column(column, values)?;
            table.schema.fields[idx].data_type = dtype.clone();
        }

        for adjustment in &self.pre_adjustments {
            table = adjustment(table)?;
        }

        for (column, adjustments) in &self.column_adjustments {
            self.require_column(&table, column, "column adjustment")?;
            let mut values = table.column_values(column).unwrap_or_default();
            for adjustment in adjustments {
                values = adjustment(values)?;
                if values.len() != table.row_count() {
                    return Err(HarmonizeError::schema(format!(
                        "adjustment for column '{column}' changed its length \
                         ({} != {})",
                        values.len(),
                        table.row_count()
                    )));
                }
            }
            table.replace_column(column, values)?;
            table.compact();
        }

        for adjustment in &self.post_adjustments {
            table = adjustment(table)?;
        }

        if !self.index_cols.is_empty() {
            table.set_index(self.index_cols.clone())?;
        }
        Ok(table)
    }

    fn require_column(
        &self,
        table: &Table,
        column: &str,
        what: &str,
    ) -> HarmonizeResult<usize> {
        table.schema.index_of(column).ok_or_else(|| {
            HarmonizeError::config(format!(
                "{what} names column '{column}' which is not present in the raw data"
            ))
        })
    }
}

/// Coerce one cell into a target dtype. Nulls stay null.
fn coerce_value(
    row: usize,
    column: &str,
    dtype: &DataType,
    value: Value,
) -> HarmonizeResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let parse_err = |raw: String, message: &str| HarmonizeError::Parse {
        row,
        column: column.to_string(),
        raw,
        message: message.to_string(),
    };
    match dtype {
        DataType::Utf8 | DataType::Categorical => match value {
            Value::Utf8(s) => Ok(Value::Utf8(s)),
            Value::Int64(v) => Ok(Value::Utf8(v.to_string())),
            Value::Float64(v) => Ok(Value::Utf8(v.to_string())),
            Value::Bool(v) => Ok(Value::Utf8(v.to_string())),
            other => Err(parse_err(format!("{other:?}"), "expected string-like value")),
        },
        DataType::Int64 => match value {
            Value::Int64(v) => Ok(Value::Int64(v)),
            Value::Float64(v) if v.fract() == 0.0 => Ok(Value::Int64(v as i64)),
            Value::Utf8(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| parse_err(s.clone(), &e.to_string())),
            other => Err(parse_err(format!("{other:?}"), "expected integer")),
        },
        DataType::Float64 => match value {
            Value::Float64(v) => Ok(Value::Float64(v)),
            Value::Int64(v) => Ok(Value::Float64(v as f64)),
            Value::Utf8(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|e| parse_err(s.clone(), &e.to_string())),
            other => Err(parse_err(format!("{other:?}"), "expected number")),
        },
        DataType::Bool => match value {
            Value::Bool(v) => Ok(Value::Bool(v)),
            Value::Utf8(s) => parse_bool(s.trim())
                .map(Value::Bool)
                .map_err(|message| parse_err(s.clone(), &message)),
            other => Err(parse_err(format!("{other:?}"), "expected bool")),
        },
        DataType::Interval => match value {
            Value::Interval(iv) => Ok(Value::Interval(iv)),
            other => Err(parse_err(
                format!("{other:?}"),
                "intervals cannot be coerced from scalars; use the interval helper",
            )),
        },
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::TableLoader;
    use crate::config::SourceConfig;
    use crate::loader::source::{LoadRequest, RawSource};
    use crate::types::{DataType, Field, Schema, Table, Value};
    use std::path::PathBuf;

    /// Source that hands back a fixed raw table, for pipeline-only tests.
    struct FixedSource(Table);

    impl RawSource for FixedSource {
        fn raw_datafile_paths(
            &self,
            _config: &SourceConfig,
            _request: &LoadRequest,
        ) -> crate::error::HarmonizeResult<Vec<PathBuf>> {
            Ok(vec![PathBuf::from("fixed")])
        }

        fn read_raw_datafiles(
            &self,
            _paths: &[PathBuf],
            _config: &SourceConfig,
        ) -> crate::error::HarmonizeResult<Table> {
            Ok(self.0.clone())
        }
    }

    fn raw_table() -> Table {
        let schema = Schema::new(vec![
            Field::new("region", DataType::Utf8),
            Field::new("year", DataType::Utf8),
            Field::new("value", DataType::Utf8),
        ]);
        Table::new(
            schema,
            vec![
                vec![
                    Value::Utf8("CN".to_string()),
                    Value::Utf8("2019".to_string()),
                    Value::Utf8("10.5".to_string()),
                ],
                vec![
                    Value::Utf8("US".to_string()),
                    Value::Utf8("2019".to_string()),
                    Value::Null,
                ],
            ],
        )
    }

    fn loader(table: Table) -> TableLoader<FixedSource> {
        TableLoader::new(FixedSource(table), SourceConfig::new())
    }

    #[test]
    fn coercion_types_mapped_columns_and_passes_others() {
        let loader = loader(raw_table())
            .with_dtype("year", DataType::Int64)
            .with_dtype("value", DataType::Float64);
        let out = loader.process(raw_table()).unwrap();

        assert_eq!(out.rows[0][1], Value::Int64(2019));
        assert_eq!(out.rows[0][2], Value::Float64(10.5));
        assert_eq!(out.rows[1][2], Value::Null);
        // Unmapped column untouched.
        assert_eq!(out.rows[0][0], Value::Utf8("CN".to_string()));
        assert_eq!(
            out.schema.fields[1],
            Field::new("year", DataType::Int64)
        );
    }

    #[test]
    fn coercion_failure_names_row_and_column() {
        let loader = loader(raw_table()).with_dtype("region", DataType::Int64);
        let err = loader.process(raw_table()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 1"));
        assert!(msg.contains("column 'region'"));
    }

    #[test]
    fn dtype_for_absent_column_is_a_config_error() {
        let loader = loader(raw_table()).with_dtype("missing", DataType::Int64);
        let err = loader.process(raw_table()).unwrap_err();
        assert!(err.to_string().contains("dtype mapping"));
    }

    #[test]
    fn column_adjustments_apply_in_list_order() {
        let loader = loader(raw_table())
            .with_dtype("value", DataType::Float64)
            .with_column_adjustment("value", |values| {
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Float64(x) => Value::Float64(x + 1.0),
                        other => other,
                    })
                    .collect())
            })
            .with_column_adjustment("value", |values| {
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Float64(x) => Value::Float64(x * 2.0),
                        other => other,
                    })
                    .collect())
            });
        let out = loader.process(raw_table()).unwrap();
        // (10.5 + 1) * 2, not 10.5 * 2 + 1
        assert_eq!(out.rows[0][2], Value::Float64(23.0));
    }

    #[test]
    fn column_adjustment_is_independent_of_sibling_columns() {
        let base = loader(raw_table())
            .with_dtype("value", DataType::Float64)
            .with_column_adjustment("value", |values| {
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Float64(x) => Value::Float64(x * 2.0),
                        other => other,
                    })
                    .collect())
            });
        let alone = base.process(raw_table()).unwrap();

        let with_sibling = loader(raw_table())
            .with_dtype("value", DataType::Float64)
            .with_column_adjustment("value", |values| {
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Float64(x) => Value::Float64(x * 2.0),
                        other => other,
                    })
                    .collect())
            })
            .with_column_adjustment("region", |values| {
                Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Utf8(s) => Value::Utf8(s.to_lowercase()),
                        other => other,
                    })
                    .collect())
            })
            .process(raw_table())
            .unwrap();

        assert_eq!(
            alone.column_values("value"),
            with_sibling.column_values("value")
        );
    }

    #[test]
    fn length_changing_adjustment_is_rejected() {
        let loader = loader(raw_table()).with_column_adjustment("value", |mut values| {
            values.pop();
            Ok(values)
        });
        let err = loader.process(raw_table()).unwrap_err();
        assert!(err.to_string().contains("changed its length"));
    }

    #[test]
    fn global_adjustments_run_around_column_adjustments() {
        let loader = loader(raw_table())
            .with_pre_adjustment(|mut table| {
                table.rename_column("value", "amount")?;
                Ok(table)
            })
            .with_column_adjustment("amount", |values| Ok(values))
            .with_post_adjustment(|mut table| {
                table.drop_columns(&["year".to_string()])?;
                Ok(table)
            });
        let out = loader.process(raw_table()).unwrap();
        assert_eq!(
            out.schema.field_names().collect::<Vec<_>>(),
            vec!["region", "amount"]
        );
    }

    #[test]
    fn empty_index_config_keeps_positional_identity() {
        let out = loader(raw_table()).process(raw_table()).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(
            out.row_labels(),
            vec![vec![Value::Int64(0)], vec![Value::Int64(1)]]
        );
    }

    #[test]
    fn configured_index_promotes_columns() {
        let out = loader(raw_table())
            .with_index_cols(["region", "year"])
            .process(raw_table())
            .unwrap();
        assert_eq!(out.index_cols(), &["region".to_string(), "year".to_string()]);
    }

    #[test]
    fn load_runs_source_then_pipeline() {
        let loader = loader(raw_table()).with_dtype("value", DataType::Float64);
        let out = loader.load(&LoadRequest::default()).unwrap();
        assert_eq!(out.rows[0][2], Value::Float64(10.5));
    }

    #[test]
    fn processing_is_deterministic() {
        let loader = loader(raw_table())
            .with_dtype("value", DataType::Float64)
            .with_column_adjustment("value", |values| Ok(values))
            .with_index_cols(["region"]);
        let a = loader.process(raw_table()).unwrap();
        let b = loader.process(raw_table()).unwrap();
        assert_eq!(a, b);
    }
}
