use thiserror::Error;

/// Convenience result type used across the crate.
pub type HarmonizeResult<T> = Result<T, HarmonizeError>;

/// Error type shared by the resolver, vocabulary, configuration and loader
/// components.
///
/// Every failure class gets its own inspectable variant; no component retries,
/// all failures are fail-fast.
#[derive(Debug, Error)]
pub enum HarmonizeError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet read error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Malformed YAML in a vocabulary or configuration tree.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Missing or contradictory configuration (unknown section/option,
    /// unresolvable substitution path, conflicting parameters).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Variable substitution did not reach a fixed point within the
    /// iteration budget, which usually means circular definitions.
    #[error(
        "variable resolution did not converge after {iterations} passes; \
         this may indicate circular variable definitions"
    )]
    Resolution { iterations: u32 },

    /// A value had no corresponding vocabulary entry when mapping between
    /// axes.
    #[error("cannot translate '{value}' from axis '{from_axis}' to axis '{to_axis}'")]
    Translation {
        value: String,
        from_axis: String,
        to_axis: String,
    },

    /// A cell could not be coerced into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    Parse {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// The input does not conform to the expected table shape (missing
    /// columns, mismatched schemas, undetectable formats, ...).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },
}

impl HarmonizeError {
    /// Shorthand for a [`HarmonizeError::Config`] with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`HarmonizeError::SchemaMismatch`] with a formatted
    /// message.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}
