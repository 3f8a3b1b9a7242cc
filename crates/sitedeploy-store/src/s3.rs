//! S3-compatible bucket backed by the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};

use crate::error::StorageError;
use crate::storage_traits::{validate_key, BlobStore, ObjectAttributes, StorageResult};

/// A bucket on AWS S3, MinIO, or any other `object_store` backend.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    inner: Arc<dyn ObjectStore>,
}

impl S3BlobStore {
    /// Connect to an S3-compatible endpoint and verify the bucket exists.
    pub async fn connect(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        region: Option<&str>,
    ) -> StorageResult<Self> {
        let builder = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_bucket_name(bucket)
            .with_region(region.unwrap_or("us-east-1"))
            .with_allow_http(endpoint.starts_with("http://"));

        let inner: Arc<dyn ObjectStore> = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::InvalidConfig(e.to_string()))?,
        );

        // Fail fast on a missing bucket instead of on the first upload.
        let mut stream = inner.list(None);
        match stream.try_next().await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NoSuchBucket") {
                    return Err(StorageError::BucketNotFound(bucket.to_string()));
                }
                return Err(e.into());
            }
        }
        drop(stream);

        Ok(Self { inner })
    }

    /// Wrap an already-built `object_store` backend.
    pub fn from_object_store(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    fn path(key: &str) -> StorageResult<ObjectPath> {
        validate_key(key)?;
        ObjectPath::parse(key).map_err(|e| StorageError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn attributes(attrs: &ObjectAttributes) -> Attributes {
        let mut out = Attributes::new();
        if let Some(cc) = &attrs.cache_control {
            out.insert(Attribute::CacheControl, cc.clone().into());
        }
        if let Some(ct) = &attrs.content_type {
            out.insert(Attribute::ContentType, ct.clone().into());
        }
        out
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        attributes: &ObjectAttributes,
    ) -> StorageResult<()> {
        let path = Self::path(key)?;
        let opts = PutOptions {
            attributes: Self::attributes(attributes),
            ..Default::default()
        };
        self.inner
            .put_opts(&path, PutPayload::from(data.to_vec()), opts)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = Self::path(key)?;
        let result = self.inner.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                key: key.to_string(),
            },
            other => other.into(),
        })?;
        Ok(result.bytes().await?.to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = Self::path(key)?;
        // S3 deletes are idempotent; other backends may report NotFound.
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let items: Vec<_> = self.inner.list(None).try_collect().await?;
        let mut keys: Vec<String> = items
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        let path = Self::path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
