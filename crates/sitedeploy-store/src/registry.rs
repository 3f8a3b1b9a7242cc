//! Bucket-name resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::fakes::MemoryBlobStore;
use crate::fs::FsBlobStore;
use crate::s3::S3BlobStore;
use crate::storage_traits::{BlobStore, StorageLocation, StorageResult};

/// Configuration for one storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the bucket directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name on the backend
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// A bucket name bound to the backend that serves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketConfig {
    pub bucket: String,
    pub backend: StoreConfig,
}

/// Maps bucket names to stores.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn BlobStore>>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buckets: Vec<_> = self.stores.keys().collect();
        buckets.sort();
        f.debug_struct("StoreRegistry")
            .field("buckets", &buckets)
            .finish()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from bucket configurations.
    pub async fn from_configs(configs: &[BucketConfig]) -> StorageResult<Self> {
        let mut registry = Self::new();
        for cfg in configs {
            let store: Arc<dyn BlobStore> = match &cfg.backend {
                StoreConfig::Memory => Arc::new(MemoryBlobStore::new()),
                StoreConfig::Local { path } => Arc::new(FsBlobStore::new(path)?),
                StoreConfig::S3 {
                    endpoint,
                    access_key,
                    secret_key,
                    bucket,
                    region,
                } => Arc::new(
                    S3BlobStore::connect(
                        endpoint,
                        access_key,
                        secret_key,
                        bucket,
                        region.as_deref(),
                    )
                    .await?,
                ),
            };
            debug!(bucket = %cfg.bucket, "registered store");
            registry.insert(&cfg.bucket, store);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, bucket: &str, store: Arc<dyn BlobStore>) {
        self.stores.insert(bucket.to_string(), store);
    }

    pub fn with_store(mut self, bucket: &str, store: Arc<dyn BlobStore>) -> Self {
        self.insert(bucket, store);
        self
    }

    /// Resolve the store for `bucket`.
    pub fn bucket(&self, bucket: &str) -> StorageResult<Arc<dyn BlobStore>> {
        self.stores
            .get(bucket)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBucket(bucket.to_string()))
    }

    /// Read the object at `location`.
    pub async fn read(&self, location: &StorageLocation) -> StorageResult<Vec<u8>> {
        self.bucket(&location.bucket_name)?
            .get(&location.object_key)
            .await
    }
}
