//! sitedeploy-core: package, upload and invalidate static sites
//!
//! The pipeline runs in two places:
//!
//! - **Build time**: [`archiver`] splits the build output into size-bounded
//!   zips, [`fingerprint`] derives a [`BuildId`] from the path structure, and
//!   [`package`] publishes the archives to an asset bucket.
//! - **Deploy time**: [`lifecycle::DeploymentHandler`] answers Create, Update
//!   and Delete requests by extracting archives into the destination bucket
//!   ([`uploader`]) and purging stale objects ([`purge`]);
//!   [`invalidation::InvalidationOrchestrator`] issues CDN invalidations and
//!   optionally waits for them.
//!
//! [`driver::LocalDriver`] plays both sides locally for `sitedeploy deploy`.

pub mod archiver;
pub mod config;
pub mod driver;
pub mod error;
pub mod fakes;
pub mod file_options;
pub mod fingerprint;
pub mod invalidation;
pub mod lifecycle;
pub mod manifest;
pub mod metrics;
pub mod obs;
pub mod package;
pub mod placeholder;
pub mod protocol;
pub mod purge;
pub mod replace;
pub mod state;
pub mod telemetry;
pub mod uploader;

pub use archiver::{archive_directory, Archive, ArchiveOutput, FileEntry};
pub use config::SiteConfig;
pub use driver::{DeployOutcome, LocalDriver};
pub use error::{CdnError, DeployError, Result};
pub use file_options::FileOptionRule;
pub use fingerprint::{build_id_for_dir, build_id_from_paths, BuildId, LIVE_BUILD_ID};
pub use invalidation::{
    CdnClient, CdnConfig, HandlerOutcome, HttpCdnClient, InvalidationEvent,
    InvalidationOrchestrator, InvalidationProperties, ResumeToken, WaiterConfig,
};
pub use lifecycle::{DeploymentEvent, DeploymentHandler, DeploymentProperties};
pub use manifest::{ArchiveManifest, DeploymentState, ManifestEntry};
pub use protocol::{CustomResourceEvent, CustomResourceResponse, RequestType, ResponseStatus};
pub use telemetry::{init_tracing, LogFormat};
