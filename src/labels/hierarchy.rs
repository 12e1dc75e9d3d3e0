//! Rollup relations derived from a vocabulary table.
//!
//! Hierarchical vocabularies carry a nesting level per code (1 = the
//! root/total, deeper levels increasing) and a parent code naming the
//! containing aggregate. Cross-cutting "memo" items — codes reported
//! alongside a hierarchy without being part of its sums — use the reserved
//! level 99 and, when they have a natural containing parent, a synthetic
//! `MEMO_<parent>` tag instead of the plain parent code.

use std::collections::BTreeMap;

use crate::error::{HarmonizeError, HarmonizeResult};
use crate::labels::map::LabelMap;
use crate::types::{Table, Value};

/// Reserved level for cross-cutting memo items.
pub const MEMO_LEVEL: i64 = 99;

/// Prefix marking a memo item's synthetic parent tag.
pub const MEMO_PARENT_PREFIX: &str = "MEMO_";

/// Default column holding nesting levels.
pub const LEVEL_COLUMN: &str = "hierarchy_level";

/// Default column holding parent codes.
pub const PARENT_COLUMN: &str = "parent";

/// One code's rollup metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyEntry {
    /// Nesting level: 1 for the root, [`MEMO_LEVEL`] for memo items.
    pub level: i64,
    /// Parent code, possibly a `MEMO_<parent>` tag; `None` for roots.
    pub parent: Option<String>,
}

impl HierarchyEntry {
    /// Whether this entry is a cross-cutting memo item.
    pub fn is_memo(&self) -> bool {
        self.level == MEMO_LEVEL
            || self
                .parent
                .as_deref()
                .is_some_and(|p| p.starts_with(MEMO_PARENT_PREFIX))
    }

    /// The natural containing parent, with any memo tag stripped.
    pub fn natural_parent(&self) -> Option<&str> {
        self.parent
            .as_deref()
            .map(|p| p.strip_prefix(MEMO_PARENT_PREFIX).unwrap_or(p))
    }
}

/// A parent whose children's values do not sum to the parent's value.
///
/// Reconciliation is a soft, source-dependent guarantee; mismatches are
/// reported, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupMismatch {
    /// The parent code.
    pub parent: String,
    /// The parent's own value.
    pub expected: f64,
    /// The sum over the parent's non-memo children.
    pub actual: f64,
    /// The children that were summed.
    pub children: Vec<String>,
}

/// Derived per-code level/parent view over a vocabulary table.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    entries: Vec<(String, HierarchyEntry)>,
}

impl Hierarchy {
    /// Derive the hierarchy view from a vocabulary table.
    ///
    /// The level and parent column names default to `hierarchy_level` and
    /// `parent` and can be overridden by same-named metadata tags on the
    /// label map. Every code needs a level; parents may be null (roots).
    pub fn from_label_map(map: &LabelMap) -> HarmonizeResult<Self> {
        let table = map.table();
        let level_col = attr_or(table, "hierarchy_level", LEVEL_COLUMN);
        let parent_col = attr_or(table, "parent", PARENT_COLUMN);

        let levels = table.column_values(&level_col).ok_or_else(|| {
            HarmonizeError::config(format!(
                "vocabulary table has no level column '{level_col}'"
            ))
        })?;
        let parents = table.column_values(&parent_col).ok_or_else(|| {
            HarmonizeError::config(format!(
                "vocabulary table has no parent column '{parent_col}'"
            ))
        })?;

        let codes = map.codes();
        let mut entries = Vec::with_capacity(codes.len());
        for ((code, level), parent) in codes.into_iter().zip(levels).zip(parents) {
            let level = parse_level(&level).ok_or_else(|| {
                HarmonizeError::config(format!(
                    "code '{code}' has no usable value in level column '{level_col}'"
                ))
            })?;
            let parent = match parent {
                Value::Null => None,
                Value::Utf8(p) => Some(p),
                other => {
                    return Err(HarmonizeError::config(format!(
                        "code '{code}' has non-string parent {other:?}"
                    )));
                }
            };
            entries.push((code, HierarchyEntry { level, parent }));
        }
        Ok(Self { entries })
    }

    /// All codes, in vocabulary order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(code, _)| code.as_str())
    }

    /// The entry for a code.
    pub fn entry(&self, code: &str) -> Option<&HierarchyEntry> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, e)| e)
    }

    /// Nesting level of a code.
    pub fn level_of(&self, code: &str) -> Option<i64> {
        self.entry(code).map(|e| e.level)
    }

    /// Raw parent tag of a code (may be a `MEMO_` tag).
    pub fn parent_of(&self, code: &str) -> Option<&str> {
        self.entry(code).and_then(|e| e.parent.as_deref())
    }

    /// Whether a code is a cross-cutting memo item.
    pub fn is_memo(&self, code: &str) -> bool {
        self.entry(code).is_some_and(HierarchyEntry::is_memo)
    }

    /// Root codes (level 1), in vocabulary order.
    pub fn roots(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.level == 1)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    /// Direct non-memo children of a parent code, in vocabulary order.
    ///
    /// Memo items tagged `MEMO_<parent>` are *not* children for rollup
    /// purposes; use [`Hierarchy::memo_items_of`] for those.
    pub fn children_of(&self, parent: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_memo() && e.parent.as_deref() == Some(parent))
            .map(|(code, _)| code.as_str())
            .collect()
    }

    /// Memo items whose natural containing parent is the given code.
    pub fn memo_items_of(&self, parent: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_memo() && e.natural_parent() == Some(parent))
            .map(|(code, _)| code.as_str())
            .collect()
    }

    /// Check that children sum to their parents in a data table.
    ///
    /// `code_col` and `value_col` name the columns holding codes and values;
    /// codes appearing on several rows are summed first. Parents without any
    /// children present in the data are skipped. The result is an
    /// informational report — reconciliation is best-effort and
    /// source-dependent, so callers decide what a mismatch means.
    pub fn reconcile(
        &self,
        table: &Table,
        code_col: &str,
        value_col: &str,
        rel_tolerance: f64,
    ) -> HarmonizeResult<Vec<RollupMismatch>> {
        let codes = table.column_values(code_col).ok_or_else(|| {
            HarmonizeError::config(format!("no column named '{code_col}'"))
        })?;
        let values = table.column_values(value_col).ok_or_else(|| {
            HarmonizeError::config(format!("no column named '{value_col}'"))
        })?;

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for (code, value) in codes.iter().zip(&values) {
            let (Some(code), Some(value)) = (code.as_str(), value.as_f64()) else {
                continue;
            };
            *totals.entry(code.to_string()).or_insert(0.0) += value;
        }

        let mut mismatches = Vec::new();
        for (parent, _) in &self.entries {
            let children = self.children_of(parent);
            if children.is_empty() {
                continue;
            }
            let Some(&expected) = totals.get(parent) else {
                continue;
            };
            let present: Vec<String> = children
                .iter()
                .filter(|c| totals.contains_key(**c))
                .map(|c| (*c).to_string())
                .collect();
            if present.is_empty() {
                continue;
            }
            let actual: f64 = present.iter().filter_map(|c| totals.get(c)).sum();
            let scale = expected.abs().max(actual.abs()).max(1.0);
            if (expected - actual).abs() > rel_tolerance * scale {
                mismatches.push(RollupMismatch {
                    parent: parent.clone(),
                    expected,
                    actual,
                    children: present,
                });
            }
        }
        Ok(mismatches)
    }
}

fn attr_or(table: &Table, attr: &str, default: &str) -> String {
    table
        .attrs
        .get(attr)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

fn parse_level(value: &Value) -> Option<i64> {
    match value {
        Value::Int64(v) => Some(*v),
        Value::Float64(v) if v.fract() == 0.0 => Some(*v as i64),
        Value::Utf8(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Hierarchy, MEMO_LEVEL};
    use crate::labels::map::{LabelMap, Orient};
    use crate::types::{DataType, Field, Schema, Table, Value};

    fn energy_hierarchy() -> Hierarchy {
        let defs = serde_yaml::from_str(
            "\
TOT:
  hierarchy_level: 1
FOSSIL:
  hierarchy_level: 2
  parent: TOT
RENEW:
  hierarchy_level: 2
  parent: TOT
COAL:
  hierarchy_level: 3
  parent: FOSSIL
BUNKERS:
  hierarchy_level: 99
  parent: MEMO_TOT
",
        )
        .unwrap();
        let map = LabelMap::from_dict(&defs, Orient::ByCode).unwrap();
        Hierarchy::from_label_map(&map).unwrap()
    }

    #[test]
    fn levels_parents_and_roots() {
        let h = energy_hierarchy();
        assert_eq!(h.level_of("TOT"), Some(1));
        assert_eq!(h.level_of("COAL"), Some(3));
        assert_eq!(h.parent_of("COAL"), Some("FOSSIL"));
        assert_eq!(h.parent_of("TOT"), None);
        assert_eq!(h.roots(), vec!["TOT"]);
    }

    #[test]
    fn memo_items_are_detected_and_excluded_from_children() {
        let h = energy_hierarchy();
        assert!(h.is_memo("BUNKERS"));
        assert_eq!(h.level_of("BUNKERS"), Some(MEMO_LEVEL));
        assert_eq!(h.children_of("TOT"), vec!["FOSSIL", "RENEW"]);
        assert_eq!(h.memo_items_of("TOT"), vec!["BUNKERS"]);
    }

    fn value_table(rows: &[(&str, f64)]) -> Table {
        let schema = Schema::new(vec![
            Field::new("product", DataType::Utf8),
            Field::new("value", DataType::Float64),
        ]);
        Table::new(
            schema,
            rows.iter()
                .map(|(code, v)| {
                    vec![Value::Utf8((*code).to_string()), Value::Float64(*v)]
                })
                .collect(),
        )
    }

    #[test]
    fn reconcile_reports_mismatches_informationally() {
        let h = energy_hierarchy();
        let consistent = value_table(&[
            ("TOT", 100.0),
            ("FOSSIL", 70.0),
            ("RENEW", 30.0),
            ("COAL", 70.0),
            ("BUNKERS", 5.0),
        ]);
        assert!(h
            .reconcile(&consistent, "product", "value", 1e-6)
            .unwrap()
            .is_empty());

        let off = value_table(&[("TOT", 100.0), ("FOSSIL", 70.0), ("RENEW", 20.0)]);
        let report = h.reconcile(&off, "product", "value", 1e-6).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].parent, "TOT");
        assert_eq!(report[0].expected, 100.0);
        assert_eq!(report[0].actual, 90.0);
    }

    #[test]
    fn missing_level_column_is_a_config_error() {
        let defs = serde_yaml::from_str("X:\n  name: Ex\n").unwrap();
        let map = LabelMap::from_dict(&defs, Orient::ByCode).unwrap();
        let err = Hierarchy::from_label_map(&map).unwrap_err();
        assert!(err.to_string().contains("no level column"));
    }
}
