//! # Store Errors
//!
//! Error types for the store boundary.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store unreachable (connect failed, connection lost)
    #[error("Store unreachable: {0}")]
    Connectivity(String),

    /// Query or row decoding failed while reading
    #[error("Read failed: {0}")]
    Read(String),

    /// Mutation rejected by the store
    #[error("Write failed: {0}")]
    Write(String),

    /// Store settings are unusable
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Whether the store itself is unavailable, as opposed to one bad request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity(_))
    }

    /// Stable error code reported to HTTP clients
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Connectivity(_) => "STORE_UNREACHABLE",
            StoreError::Read(_) => "STORE_READ_FAILED",
            StoreError::Write(_) => "STORE_WRITE_FAILED",
            StoreError::InvalidConfig(_) => "STORE_CONFIG_INVALID",
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        if e.is_closed() {
            StoreError::Connectivity(e.to_string())
        } else {
            StoreError::Read(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::Connectivity("x".into()).code(), "STORE_UNREACHABLE");
        assert_eq!(StoreError::Read("x".into()).code(), "STORE_READ_FAILED");
        assert_eq!(StoreError::Write("x".into()).code(), "STORE_WRITE_FAILED");
    }

    #[test]
    fn test_is_connectivity() {
        assert!(StoreError::Connectivity("down".into()).is_connectivity());
        assert!(!StoreError::Read("bad row".into()).is_connectivity());
    }
}
