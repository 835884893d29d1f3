use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DataError>;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// All failure modes of the data/validation/model core.
///
/// Loader- and validator-level errors propagate through the repository
/// unmodified. The only non-fatal fallbacks in the crate are chart-type
/// substitution (see `registry`) and the silent timestamp-parse fallback in
/// `DataRepository::prepare_for_visualization`.
#[derive(Debug, Error)]
pub enum DataError {
    /// The source (file path or store collection) does not exist.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The source exists but contains zero parseable rows.
    #[error("no parseable rows in {0}")]
    EmptyData(String),

    /// Malformed structure: inconsistent column counts, bad delimiter, …
    #[error("parse error: {0}")]
    Parse(String),

    /// Type/range/null-policy violation. Carries up to five offending
    /// sample values so the failure is observable, never silent.
    #[error("validation failed for column '{column}': {reason}")]
    Validation {
        column: String,
        reason: String,
        examples: Vec<String>,
    },

    /// A referenced column is absent from the dataset.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// An operation restricted to numeric columns hit a non-numeric one.
    #[error("column '{column}' is not numeric (dtype {dtype})")]
    TypeMismatch { column: String, dtype: String },

    /// Caller supplied an argument outside its documented domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No live document-store connection.
    #[error("no document store connection established")]
    ConnectionError,

    /// A lower-level store fetch/insert failure, wrapped.
    #[error("document store operation failed: {0}")]
    Runtime(#[source] anyhow::Error),

    /// A model precondition on the input size was not met.
    #[error("insufficient data: need at least {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Columns the model was fitted on are absent from the predict input.
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    /// Unknown model key in the registry. Fatal: silently substituting an
    /// analytical model would corrupt results.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// The identifier has not been loaded into the repository yet.
    #[error("identifier '{0}' has not been loaded")]
    NotLoaded(String),

    /// The visualization projection found no numeric Y columns.
    #[error("no numeric columns available to plot")]
    NoNumericData,
}

impl DataError {
    /// Build a [`DataError::Validation`], capping the examples at five.
    pub fn validation(
        column: impl Into<String>,
        reason: impl Into<String>,
        mut examples: Vec<String>,
    ) -> Self {
        examples.truncate(5);
        DataError::Validation {
            column: column.into(),
            reason: reason.into(),
            examples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_examples_are_capped_at_five() {
        let examples: Vec<String> = (0..9).map(|i| i.to_string()).collect();
        let err = DataError::validation("price", "not coercible", examples);
        match err {
            DataError::Validation { examples, .. } => assert_eq!(examples.len(), 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn display_names_the_column() {
        let err = DataError::validation("price", "3 values out of range", vec![]);
        assert!(err.to_string().contains("price"));
    }
}
