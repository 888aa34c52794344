//! Error types for the Lancea library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`LanceaError`] enum. Parse problems are *not* errors: the parser always
//! returns a document plus a diagnostic list. `LanceaError` covers the
//! visitor side of the house, where user callbacks and validation can fail.
//!
//! # Examples
//!
//! ```
//! use lancea::error::{LanceaError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(LanceaError::query("unsupported construct"))
//! }
//!
//! assert!(example_operation().is_err());
//! ```

use std::io;

use anyhow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A diagnostic attached to a byte span of the original input.
///
/// Lexical and syntactic problems never abort parsing; they accumulate as
/// `ParseError` values on the parse result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Human-readable description of the problem.
    pub message: String,
    /// Byte offset into the original input.
    pub offset: usize,
    /// Byte length of the offending span.
    pub length: usize,
}

impl ParseError {
    /// Create a new parse diagnostic.
    pub fn new<S: Into<String>>(message: S, offset: usize, length: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
            length,
        }
    }
}

/// The main error type for Lancea operations.
#[derive(Error, Debug)]
pub enum LanceaError {
    /// I/O errors (resolver callbacks doing file or network work)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Query-related errors (malformed constructs reaching a visitor)
    #[error("Query error: {0}")]
    Query(String),

    /// Visitor traversal errors
    #[error("Visitor error: {0}")]
    Visitor(String),

    /// Field resolution errors (user resolver callback failed)
    #[error("Resolver error for '{name}': {message}")]
    Resolver {
        /// The field or include name that was being resolved.
        name: String,
        /// What the callback reported.
        message: String,
    },

    /// Validation failed and the options requested an error
    #[error("Validation failed: {}", messages.join("; "))]
    Validation {
        /// The accumulated validation error messages.
        messages: Vec<String>,
    },

    /// Operation cancelled
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with LanceaError.
pub type Result<T> = std::result::Result<T, LanceaError>;

impl LanceaError {
    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        LanceaError::Query(msg.into())
    }

    /// Create a new visitor error.
    pub fn visitor<S: Into<String>>(msg: S) -> Self {
        LanceaError::Visitor(msg.into())
    }

    /// Create a new resolver error naming the offending field or include.
    pub fn resolver<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        LanceaError::Resolver {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error from the collected messages.
    pub fn validation(messages: Vec<String>) -> Self {
        LanceaError::Validation { messages }
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        LanceaError::OperationCancelled(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LanceaError::Other(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        LanceaError::Other(format!("Invalid argument: {}", msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = LanceaError::query("bad query");
        assert_eq!(error.to_string(), "Query error: bad query");

        let error = LanceaError::resolver("status", "backend unavailable");
        assert_eq!(
            error.to_string(),
            "Resolver error for 'status': backend unavailable"
        );

        let error = LanceaError::validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "Validation failed: a; b");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing");
        let error = LanceaError::from(io_error);

        match error {
            LanceaError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
