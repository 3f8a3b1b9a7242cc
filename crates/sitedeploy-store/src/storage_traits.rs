//! Storage trait definitions for sitedeploy
//!
//! - `StorageLocation`: a `(bucket, key)` pair as it appears on the wire
//! - `ObjectAttributes`: HTTP metadata attached to an uploaded object
//! - `BlobStore`: key/value object storage for a single bucket
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// StorageLocation
// ---------------------------------------------------------------------------

/// Location of an object: bucket name plus object key.
///
/// Serialized with the field names the provisioning engine uses
/// (`BucketName`, `ObjectKey`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageLocation {
    pub bucket_name: String,
    pub object_key: String,
}

impl StorageLocation {
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket_name, self.object_key)
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// HTTP metadata stored alongside an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttributes {
    /// `Cache-Control` header value
    pub cache_control: Option<String>,
    /// `Content-Type` header value
    pub content_type: Option<String>,
}

impl ObjectAttributes {
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }
}

/// An object body together with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub attributes: ObjectAttributes,
}

/// Check that `key` is a relative, `/`-separated object key with no empty,
/// `.` or `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with('/') {
        return Err(invalid("absolute key"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash in key"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            _ => {}
        }
    }
    Ok(())
}

/// Object storage for a single bucket.
///
/// Guarantees:
/// - `put` overwrites atomically at key granularity (last write wins).
/// - `get` returns the exact bytes of the last `put`, or `NotFound`.
/// - `delete` of a missing key is a no-op.
/// - `list` returns keys in ascending byte order.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8], attributes: &ObjectAttributes)
        -> StorageResult<()>;

    /// Read the object stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List keys, optionally restricted to those starting with `prefix`.
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<String>>;

    /// Check whether `key` exists.
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
