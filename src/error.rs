//! Error types for the Hindsight library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`HindsightError`] enum. Constructor helpers keep call sites short:
//!
//! ```
//! use hindsight::error::{HindsightError, Result};
//!
//! fn check(q: Option<&str>) -> Result<&str> {
//!     q.ok_or_else(|| HindsightError::validation("missing query parameter \"q\""))
//! }
//!
//! assert!(check(None).is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Hindsight operations.
#[derive(Error, Debug)]
pub enum HindsightError {
    /// I/O errors (log files, snapshots, query files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Rejected request (missing or malformed input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Term preprocessing failures
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Query filter failures
    #[error("Filter error: {0}")]
    Filter(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A uniqueness violation or a row changed underneath a transaction.
    ///
    /// This is the only recoverable storage error: callers may look the row
    /// up again or retry the whole transaction.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row that must exist after a conflict could not be found
    #[error("Inconsistent store: {0}")]
    Inconsistent(String),

    /// Damaged commit log or snapshot
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binary serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with HindsightError.
pub type Result<T> = std::result::Result<T, HindsightError>;

impl HindsightError {
    /// Create a new validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        HindsightError::Validation(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        HindsightError::Analysis(msg.into())
    }

    /// Create a new filter error.
    pub fn filter<S: Into<String>>(msg: S) -> Self {
        HindsightError::Filter(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        HindsightError::Storage(msg.into())
    }

    /// Create a new conflict error.
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        HindsightError::Conflict(msg.into())
    }

    /// Create a new inconsistency error.
    pub fn inconsistent<S: Into<String>>(msg: S) -> Self {
        HindsightError::Inconsistent(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        HindsightError::Corruption(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        HindsightError::Config(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        HindsightError::Storage(format!("Not found: {}", msg.into()))
    }

    /// Whether this error is a recoverable uniqueness or concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, HindsightError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = HindsightError::validation("missing q");
        assert_eq!(error.to_string(), "Validation error: missing q");

        let error = HindsightError::storage("log closed");
        assert_eq!(error.to_string(), "Storage error: log closed");

        let error = HindsightError::not_found("term 7");
        assert_eq!(error.to_string(), "Storage error: Not found: term 7");
    }

    #[test]
    fn test_conflict_detection() {
        assert!(HindsightError::conflict("term \"dog\" exists").is_conflict());
        assert!(!HindsightError::inconsistent("term \"dog\" vanished").is_conflict());
        assert!(!HindsightError::storage("x").is_conflict());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = HindsightError::from(io_error);

        match error {
            HindsightError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
