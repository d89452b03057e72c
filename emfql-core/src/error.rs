//! Error types for emfql-core.
//!
//! One variant per failure class of the pipeline. Parsing and planning are pure and
//! deterministic, so none of these are retried; a data source failure aborts the query.

use thiserror::Error;

/// EMF query error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmfError {
    /// Malformed input text: empty query, missing FROM, unparseable condition,
    /// undeclared grouping variable in SUCH THAT.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Structurally parsed but semantically incomplete query.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plan compilation failures, including unregistered aggregate references.
    #[error("Plan error: {0}")]
    Plan(String),

    /// Runtime evaluation failures while scanning or projecting.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The underlying tabular reader failed.
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Type error: {0}")]
    Type(String),
}

/// Result type for EMF operations
pub type EmfResult<T> = Result<T, EmfError>;

impl EmfError {
    pub fn parse(msg: impl Into<String>) -> Self {
        EmfError::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EmfError::Validation(msg.into())
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        EmfError::Plan(msg.into())
    }
}

impl serde::Serialize for EmfError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
