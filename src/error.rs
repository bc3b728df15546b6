//! Error types for the quickjump library.

use std::io;
use thiserror::Error;

pub use crate::script::{CompileError, ScriptError};

/// Result type alias for quickjump operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while navigating or evaluating rules.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing the rules file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The rules file is not valid JSON or does not fit the schema.
    #[error("Invalid rules file: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression failed to compile.
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// Paragraph movement or search ran past a document boundary.
    #[error("Not found")]
    NotFound,

    /// A user script raised an error while running.
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// A bookmark's pattern or snippet could not be compiled.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A script broke the `match()` contract, e.g. an offset that is not an
    /// int or a paragraph.
    #[error("Contract violation: {0}")]
    Contract(ScriptError),

    /// A `Future` was completed more than once.
    #[error("Future has already been set")]
    FutureAlreadySet,

    /// The background worker behind a `Future` went away without completing it.
    #[error("Future was abandoned before completion")]
    FutureAbandoned,

    /// An attribute filter string could not be parsed.
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A keystroke is malformed or reserved for host navigation.
    #[error("Invalid keystroke: {0}")]
    InvalidKeystroke(String),

    /// Keyboard input is already blocked by another automation.
    #[error("Keys are already blocked")]
    KeysBlocked,

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is a recoverable `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound;
        assert_eq!(err.to_string(), "Not found");

        let err = Error::Contract(ScriptError::contract("offset must be int"));
        assert_eq!(err.to_string(), "Contract violation: offset must be int");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_script_error_conversion() {
        let err: Error = ScriptError::new("boom").into();
        assert!(matches!(err, Error::Script(_)));
        assert_eq!(err.to_string(), "Script error: boom");
    }

    #[test]
    fn test_compile_error_conversion() {
        let err: Error = crate::script::Script::compile("import os").unwrap_err().into();
        assert!(matches!(err, Error::Compile(_)));
    }
}
