//! Declarative data-loading pipeline.
//!
//! A [`TableLoader`] turns raw per-source files into a canonically-typed,
//! canonically-indexed [`crate::types::Table`]:
//!
//! 1. locate raw files via a [`RawSource`]
//! 2. read them into a raw table ([`read`])
//! 3. coerce dtypes, run global and per-column adjustments, set the index
//!    ([`pipeline`])
//!
//! New data sources plug in by implementing the two [`RawSource`]
//! operations and declaring dtype coercions and adjustment functions;
//! the pipeline itself stays untouched. Adjustment building blocks
//! (interval construction, relative change, label translation) live in
//! [`adjust`], and load outcomes can be reported to a [`LoadObserver`].

pub mod adjust;
pub mod observer;
pub mod pipeline;
pub mod read;
pub mod source;

pub use adjust::{relative_change, set_intervals, translate_with, ClosedSpec};
pub use observer::{
    severity_for_error, CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadStats,
    Severity, StdErrObserver,
};
pub use pipeline::{ColumnAdjustment, GlobalAdjustment, TableLoader};
pub use read::{
    read_and_concat, read_csv_table, read_csv_table_from_reader, read_json_table,
    read_json_table_from_str, read_parquet_table, read_table, RawFormat,
};
pub use source::{CsvDirSource, LoadRequest, RawSource};
