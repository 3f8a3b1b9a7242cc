//! Error types for sitedeploy-store

use thiserror::Error;

/// Errors that can occur while reading or writing objects
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object does not exist
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Key cannot be mapped onto the backend (empty, absolute, `..` segments)
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// No store registered for a bucket name
    #[error("no store registered for bucket '{0}'")]
    UnknownBucket(String),

    /// Bucket exists in configuration but not on the backend
    #[error("bucket '{0}' does not exist")]
    BucketNotFound(String),

    /// Backend configuration is unusable
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by the storage backend
    #[error("storage backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound { key: path },
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for StorageError {
    fn from(err: walkdir::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
