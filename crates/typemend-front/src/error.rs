//! Front-end errors.

use thiserror::Error;

/// Errors that can occur during preprocessing and parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },

    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Syntax error at offset {pos}: {message}")]
    SyntaxError { pos: usize, message: String },
}

/// Result type for front-end operations.
pub type ParseResult<T> = Result<T, ParseError>;
