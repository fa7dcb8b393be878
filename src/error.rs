use thiserror::Error;

/// Errors raised while resolving mapping metadata, member paths and names.
///
/// None of these are retried internally; they surface to the immediate caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("record `{record}` has no mapped column named `{column}`")]
    UnresolvedColumn { record: &'static str, column: String },

    #[error("unsupported member-path expression: {0}")]
    UnsupportedExpression(String),

    #[error("a mapper is already registered for {0}")]
    DuplicateKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl MappingError {
    pub(crate) fn blank(what: &str) -> Self {
        MappingError::InvalidArgument(format!("{what} must not be empty or blank"))
    }
}
