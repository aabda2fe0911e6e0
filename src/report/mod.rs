pub mod clover;
pub mod junit;

use thiserror::Error;

/// Raised when a report document is empty or structurally invalid.
/// Carries every diagnostic collected while reading, joined into one
/// message; parsing never yields a partial result alongside it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid report: {message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(diagnostics: Vec<String>) -> Self {
        Self {
            message: diagnostics.join("; "),
        }
    }

    pub fn single(diagnostic: impl Into<String>) -> Self {
        Self {
            message: diagnostic.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
