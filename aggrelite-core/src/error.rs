// src/error.rs
// Error types for pipeline parsing and evaluation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregationError {
    /// Malformed stage parameters (unknown stage or accumulator, bad limit, bad sort direction)
    #[error("Stage error: {0}")]
    Stage(String),

    /// A referenced field path is missing (strict field path mode only)
    #[error("Field path error: {0}")]
    FieldPath(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Input collection element that is not a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AggregationError>;

impl AggregationError {
    /// Shorthand used by the stage parsers
    pub(crate) fn stage(msg: impl Into<String>) -> Self {
        AggregationError::Stage(msg.into())
    }
}
