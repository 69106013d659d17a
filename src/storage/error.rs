//! Storage error types
//!
//! Defines all errors that can occur in the document store.

use thiserror::Error;

/// Errors that can occur in the document store
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Collection name or document id is not usable as a path segment
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A field value is not a flat primitive
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Snapshot file format error
    #[error("Invalid snapshot format: {0}")]
    InvalidSnapshot(String),

    /// WAL format or recovery error
    #[error("WAL error: {0}")]
    WalError(String),

    /// The store has been shut down
    #[error("Store is shut down")]
    Closed,

    /// Another process already has the data directory open
    #[error("Data directory is locked by another process: {0}")]
    Locked(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::InvalidPath("a/b".to_string());
        assert_eq!(err.to_string(), "Invalid path: a/b");

        let err = StorageError::InvalidField {
            field: "tags".to_string(),
            reason: "arrays are not supported".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid field 'tags': arrays are not supported"
        );
    }

    #[test]
    fn test_locked_display() {
        let err = StorageError::Locked("data/LOCK".to_string());
        assert_eq!(
            err.to_string(),
            "Data directory is locked by another process: data/LOCK"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
