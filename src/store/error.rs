//! Key/value store error types

use thiserror::Error;

/// Errors that can occur in a key/value store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a value failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored value could not be decoded
    #[error("Corrupt value under {key}: {error}")]
    Decode { key: String, error: String },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Decode {
            key: "deploymentChecker".to_string(),
            error: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt value under deploymentChecker: expected value"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
    }
}
