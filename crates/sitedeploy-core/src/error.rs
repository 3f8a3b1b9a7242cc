//! Error taxonomy for the deployment pipeline.

use std::path::PathBuf;

use sitedeploy_store::StorageError;

/// Errors raised by the CDN control plane.
#[derive(Debug, thiserror::Error)]
pub enum CdnError {
    #[error("distribution not found: {0}")]
    DistributionNotFound(String),

    #[error("invalidation not found: {0}")]
    InvalidationNotFound(String),

    #[error("CDN request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("CDN transport error: {0}")]
    Transport(String),

    #[error("CDN not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for CdnError {
    fn from(err: reqwest::Error) -> Self {
        CdnError::Transport(err.to_string())
    }
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "output directory {} overlaps source directory {}",
        output.display(),
        source_dir.display()
    )]
    OutputOverlapsSource {
        source_dir: PathBuf,
        output: PathBuf,
    },

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("unsafe path in archive {archive}: {entry}")]
    UnsafeArchiveEntry { archive: String, entry: String },

    #[error("invalid file option: {0}")]
    InvalidFileOption(String),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upload of '{key}' failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("CDN error: {0}")]
    Cdn(#[from] CdnError),

    #[error("invalidation still pending after {waited_secs}s: {invalidation_ids:?}")]
    InvalidationTimeout {
        invalidation_ids: Vec<String>,
        waited_secs: u64,
    },

    #[error("{resource} {request_type} failed: {reason}")]
    ResourceFailed {
        resource: &'static str,
        request_type: String,
        reason: String,
    },

    #[error("failed to deliver response to {url}: {reason}")]
    ResponseDelivery { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, DeployError>;
