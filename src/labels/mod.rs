//! Label harmonization: vocabulary tables, code translation, hierarchy
//! rollups, and the registry of label-definition files.
//!
//! Statistical agencies publish the same dimension (fuel products, economic
//! sectors, regions) under different code systems. A [`LabelMap`] holds one
//! vocabulary table per dimension — canonical codes plus one column per
//! alternate naming scheme — and translates value sequences or table labels
//! between any two axes. A [`Hierarchy`] view derives per-code level/parent
//! rollup relations from the same table, and a [`LabelSetRegistry`] keeps
//! track of which label sets exist in which definition file without eagerly
//! materializing them.

pub mod hierarchy;
pub mod map;
pub mod registry;

pub use hierarchy::{Hierarchy, RollupMismatch, MEMO_LEVEL, MEMO_PARENT_PREFIX};
pub use map::{Axis, LabelMap, MissingPolicy, Orient, TableAxis, CODE_COLUMN};
pub use registry::LabelSetRegistry;
