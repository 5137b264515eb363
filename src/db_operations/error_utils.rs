//! Error handling utilities for storage operations
//!
//! Keeps error wording consistent across the sled-backed stores and keeps
//! I/O failures in the `Sled` variant so callers can classify them as
//! transient.

use crate::error::RectusError;
use sled::transaction::TransactionError;

/// Utility functions for common error handling patterns in storage operations
pub struct ErrorUtils;

impl ErrorUtils {
    /// Creates a serialization error with consistent formatting
    pub fn serialization_error(context: &str, error: serde_json::Error) -> RectusError {
        RectusError::Storage(format!("Serialization failed for {}: {}", context, error))
    }

    /// Creates a deserialization error with consistent formatting
    pub fn deserialization_error(context: &str, error: serde_json::Error) -> RectusError {
        RectusError::Storage(format!("Deserialization failed for {}: {}", context, error))
    }

    /// Creates a database operation error. I/O errors are passed through unchanged.
    pub fn database_error(operation: &str, error: sled::Error) -> RectusError {
        match error {
            sled::Error::Io(_) => RectusError::Sled(error),
            other => RectusError::Storage(format!("Database {} failed: {}", operation, other)),
        }
    }

    /// Unwraps an aborted transaction into its cause
    pub fn transaction_error(operation: &str, error: TransactionError<RectusError>) -> RectusError {
        match error {
            TransactionError::Abort(cause) => cause,
            TransactionError::Storage(e) => Self::database_error(operation, e),
        }
    }

    /// Creates a not found error with consistent formatting
    pub fn not_found_error(resource_type: &str, identifier: &str) -> RectusError {
        RectusError::NotFound(format!("{} '{}' not found", resource_type, identifier))
    }

    /// Helper for converting sled errors in database operations
    pub fn from_sled_error(operation: &str) -> impl Fn(sled::Error) -> RectusError + '_ {
        move |e| Self::database_error(operation, e)
    }

    /// Helper for converting serialization errors
    pub fn from_serialization_error(context: &str) -> impl Fn(serde_json::Error) -> RectusError + '_ {
        move |e| Self::serialization_error(context, e)
    }

    /// Helper for converting deserialization errors
    pub fn from_deserialization_error(
        context: &str,
    ) -> impl Fn(serde_json::Error) -> RectusError + '_ {
        move |e| Self::deserialization_error(context, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_stay_transient() {
        let err = ErrorUtils::database_error(
            "insert",
            sled::Error::Io(io::Error::new(io::ErrorKind::Other, "disk")),
        );
        assert!(err.is_transient());

        let err = ErrorUtils::database_error("insert", sled::Error::Unsupported("x".into()));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Database insert failed"));
    }

    #[test]
    fn aborted_transactions_keep_their_cause() {
        let err = ErrorUtils::transaction_error(
            "apply",
            TransactionError::Abort(RectusError::not_found("x")),
        );
        assert!(matches!(err, RectusError::NotFound(_)));
    }
}
