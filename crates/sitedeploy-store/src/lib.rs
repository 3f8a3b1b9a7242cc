//! sitedeploy-store: object storage for static site deployments
//!
//! Every bucket the pipeline touches (the asset bucket holding archives and
//! filename listings, and the destination bucket served by the CDN) is
//! reached through the [`BlobStore`] trait.
//!
//! ## Backends
//!
//! - `MemoryBlobStore`: in-memory fake with failure injection (tests)
//! - `FsBlobStore`: a local directory, one file per key
//! - `S3BlobStore`: any S3-compatible service via the `object_store` crate
//!
//! Buckets are resolved by name through a [`StoreRegistry`] that callers
//! build once and pass down explicitly.

mod error;
pub mod fakes;
mod fs;
mod registry;
mod s3;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::FsBlobStore;
pub use registry::{BucketConfig, StoreConfig, StoreRegistry};
pub use s3::S3BlobStore;
pub use storage_traits::{
    validate_key, BlobStore, ObjectAttributes, StorageLocation, StorageResult, StoredObject,
};
