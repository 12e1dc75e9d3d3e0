//! Adjustment building blocks for the pipeline stages.

use std::collections::BTreeMap;

use crate::error::{HarmonizeError, HarmonizeResult};
use crate::labels::map::{Axis, LabelMap, MissingPolicy};
use crate::loader::pipeline::ColumnAdjustment;
use crate::types::{Closed, DataType, Field, IntervalValue, Table, Value};

/// Closedness selection for [`set_intervals`].
#[derive(Debug, Clone)]
pub enum ClosedSpec {
    /// One closedness for every new interval column.
    Uniform(Closed),
    /// Closedness per new interval column name.
    PerColumn(BTreeMap<String, Closed>),
}

impl Default for ClosedSpec {
    fn default() -> Self {
        Self::Uniform(Closed::Right)
    }
}

impl ClosedSpec {
    fn for_column(&self, column: &str) -> HarmonizeResult<Closed> {
        match self {
            Self::Uniform(closed) => Ok(*closed),
            Self::PerColumn(map) => map.get(column).copied().ok_or_else(|| {
                HarmonizeError::config(format!(
                    "no closedness configured for interval column '{column}'"
                ))
            }),
        }
    }
}

/// Combine pairs of numeric columns into interval-typed columns.
///
/// `interval_cols` maps each new column name to the `(left, right)` source
/// column pair. Rows where either endpoint is null yield a null interval;
/// non-numeric endpoints are parse errors. When `drop` is set the source
/// columns are removed from the result.
///
/// Returns a new table; the input is not mutated.
pub fn set_intervals(
    table: &Table,
    interval_cols: &[(String, (String, String))],
    closed: &ClosedSpec,
    drop: bool,
) -> HarmonizeResult<Table> {
    let mut new_columns: Vec<(String, Vec<Value>)> = Vec::with_capacity(interval_cols.len());
    for (target, (left_col, right_col)) in interval_cols {
        let closed = closed.for_column(target)?;
        let left = table.column_values(left_col).ok_or_else(|| {
            HarmonizeError::config(format!("no column named '{left_col}'"))
        })?;
        let right = table.column_values(right_col).ok_or_else(|| {
            HarmonizeError::config(format!("no column named '{right_col}'"))
        })?;

        let mut cells = Vec::with_capacity(left.len());
        for (row0, (lv, rv)) in left.iter().zip(&right).enumerate() {
            if lv.is_null() || rv.is_null() {
                cells.push(Value::Null);
                continue;
            }
            let endpoint = |value: &Value, column: &str| {
                value.as_f64().ok_or_else(|| HarmonizeError::Parse {
                    row: row0 + 1,
                    column: column.to_string(),
                    raw: format!("{value:?}"),
                    message: "interval endpoints must be numeric".to_string(),
                })
            };
            cells.push(Value::Interval(IntervalValue {
                left: endpoint(lv, left_col)?,
                right: endpoint(rv, right_col)?,
                closed,
            }));
        }
        new_columns.push((target.clone(), cells));
    }

    let mut out = table.clone();
    if drop {
        let mut drop_cols: Vec<String> = interval_cols
            .iter()
            .flat_map(|(_, (left, right))| [left.clone(), right.clone()])
            .collect();
        drop_cols.sort();
        drop_cols.dedup();
        out.drop_columns(&drop_cols)?;
    }
    for (target, cells) in new_columns {
        out.push_column(Field::new(target, DataType::Interval), cells)?;
    }
    Ok(out)
}

/// Column adjustment computing the relative change over `shift_n` rows.
///
/// The semantic is the raw step rate `(x[i] - x[i-n]) / x[i-n]`: the divisor
/// is the shifted value alone, *not* `n` times it. Callers wanting a
/// per-step (time-normalized) rate divide the result by `n` themselves.
/// The first `n` positions, null operands, and zero divisors all yield null.
pub fn relative_change(shift_n: usize) -> ColumnAdjustment {
    Box::new(move |values| {
        let out = (0..values.len())
            .map(|i| {
                if i < shift_n {
                    return Value::Null;
                }
                match (values[i].as_f64(), values[i - shift_n].as_f64()) {
                    (Some(current), Some(shifted)) if shifted != 0.0 => {
                        Value::Float64((current - shifted) / shifted)
                    }
                    _ => Value::Null,
                }
            })
            .collect();
        Ok(out)
    })
}

/// Column adjustment translating codes through a [`LabelMap`].
///
/// Lets code harmonization run as an ordinary column-adjustment stage.
pub fn translate_with(
    map: LabelMap,
    from: Axis,
    to: Axis,
    on_missing: MissingPolicy,
) -> ColumnAdjustment {
    Box::new(move |values| map.translate(&values, &from, &to, on_missing))
}
