//! Errors raised while converting raw node values into mirror types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid integer {value:?} for field {field}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("empty identifier for field {0}")]
    EmptyIdentifier(&'static str),
}

/// Parse a decimal integer that the node encodes as a JSON string.
pub fn parse_u64(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidInteger {
            field,
            value: value.to_string(),
        })
}
