//! Error taxonomy for the import pipeline
//!
//! Row-level failures (`RowRejected`) are caught at the per-row boundary and
//! recorded; everything else is an infrastructure failure and propagates out
//! of the run.

use thiserror::Error;

/// Reason attached to a row whose email and mobile number are both unusable
pub const CONTACTS_UNUSABLE: &str = "Email and Mobile Number already exist or are invalid";

/// Result type for store and pipeline operations
pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// The row cannot be persisted; processing continues with the next row
    #[error("{0}")]
    RowRejected(String),

    /// Persistent store failure (wraps rusqlite::Error)
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Malformed upload
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column or payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A validation rule pattern failed to compile
    #[error("Invalid rule pattern: {0}")]
    Rule(#[from] regex::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ImportError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ImportError::RowRejected(reason.into())
    }

    /// True when the error only concerns the current row
    pub fn is_row_level(&self) -> bool {
        matches!(self, ImportError::RowRejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_rejection_is_row_level() {
        let err = ImportError::rejected(CONTACTS_UNUSABLE);
        assert!(err.is_row_level());
        assert_eq!(err.to_string(), CONTACTS_UNUSABLE);
    }

    #[test]
    fn test_store_error_is_not_row_level() {
        let err = ImportError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_row_level());
        assert!(err.to_string().starts_with("Database error"));
    }
}
