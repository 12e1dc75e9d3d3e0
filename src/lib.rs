//! `stat-harmonize` ingests heterogeneous statistical datasets (energy,
//! emissions, economic statistics) published under different code
//! vocabularies and normalizes them into tables with consistent dimension
//! names, codes and units.
//!
//! Three subsystems carry the weight:
//!
//! - [`resolve`]: a recursive variable-substitution engine resolving
//!   cross-referencing configuration values (`${a/b/c}` references over a
//!   YAML tree, fixed-point iteration, cycle detection)
//! - [`labels`]: a label-harmonization engine translating between parallel
//!   code systems and exposing hierarchy/rollup relations
//! - [`loader`]: a declarative loading pipeline turning raw per-source
//!   files into canonically-typed, canonically-indexed [`types::Table`]s
//!   via a configurable stage sequence, parametrized by a
//!   [`config::SourceConfig`]
//!
//! New data sources plug in by supplying file locations, dtype coercions
//! and column-wise adjustment functions, without rewriting the pipeline.
//!
//! ## Quick example: translate labels
//!
//! ```rust
//! use stat_harmonize::labels::{Axis, LabelMap, MissingPolicy, Orient};
//! use stat_harmonize::types::Value;
//!
//! let defs = serde_yaml::from_str("COAL:\n  name: Coal\nGAS:\n  name: Natural gas\n").unwrap();
//! let map = LabelMap::from_dict(&defs, Orient::ByCode).unwrap();
//!
//! let names = map
//!     .translate(
//!         &[Value::Utf8("GAS".to_string())],
//!         &Axis::Code,
//!         &Axis::column("name"),
//!         MissingPolicy::Raise,
//!     )
//!     .unwrap();
//! assert_eq!(names, vec![Value::Utf8("Natural gas".to_string())]);
//! ```
//!
//! ## Quick example: a configured load
//!
//! ```no_run
//! use stat_harmonize::config::SourceConfig;
//! use stat_harmonize::loader::{CsvDirSource, LoadRequest, TableLoader};
//! use stat_harmonize::types::DataType;
//!
//! # fn main() -> Result<(), stat_harmonize::HarmonizeError> {
//! let config = SourceConfig::from_file("sources.cfg")?;
//! let loader = TableLoader::new(CsvDirSource::new(), config)
//!     .with_dtype("year", DataType::Int64)
//!     .with_dtype("value", DataType::Float64)
//!     .with_index_cols(["region", "year"]);
//!
//! let table = loader.load(&LoadRequest::dataset("energy_balance"))?;
//! println!("rows={}", table.row_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: the shared table model (schema, values, index columns)
//! - [`resolve`]: configuration-tree variable substitution
//! - [`labels`]: vocabulary tables, translation, hierarchies, registry
//! - [`config`]: section/option source configuration with a root path
//! - [`loader`]: raw readers, the pipeline, adjustment helpers, observers
//! - [`error`]: the crate-wide error type

pub mod config;
pub mod error;
pub mod labels;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::{HarmonizeError, HarmonizeResult};
