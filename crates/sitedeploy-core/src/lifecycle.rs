//! Create/Update/Delete handling for the site deployment resource.
//!
//! Every request becomes a [`Transition`] and runs through one dispatch
//! function. Uploads always finish before anything is deleted, so a reader
//! of the destination bucket sees either the old or the new version of each
//! path at every point of an Update.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sitedeploy_store::{BlobStore, StorageLocation, StoreRegistry};
use tracing::{info, warn};
use uuid::Uuid;

use crate::archiver::parse_filenames;
use crate::error::Result;
use crate::file_options::FileOptionRule;
use crate::fingerprint::BuildId;
use crate::manifest::{ArchiveManifest, DeploymentState};
use crate::metrics::METRICS;
use crate::obs::{self, RequestSpan};
use crate::protocol::{CustomResourceEvent, CustomResourceResponse, RequestType};
use crate::purge;
use crate::replace::{self, ReplaceValue};
use crate::uploader::{Uploader, DEFAULT_ARCHIVE_CONCURRENCY, DEFAULT_FILE_CONCURRENCY};

/// `ResourceProperties` of the deployment resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentProperties {
    pub sources: Vec<StorageLocation>,
    pub destination_bucket_name: String,
    /// Listing of every deployed path. Its presence turns purging on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filenames: Option<StorageLocation>,
    #[serde(default)]
    pub file_options: Vec<FileOptionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_values: Vec<ReplaceValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<BuildId>,
    #[serde(
        default,
        deserialize_with = "crate::protocol::lenient_bool",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub destination_auto_delete: bool,
}

impl DeploymentProperties {
    pub fn new(sources: Vec<StorageLocation>, destination_bucket_name: impl Into<String>) -> Self {
        Self {
            sources,
            destination_bucket_name: destination_bucket_name.into(),
            filenames: None,
            file_options: Vec::new(),
            replace_values: Vec::new(),
            build_id: None,
            destination_auto_delete: false,
        }
    }

    pub fn purge_files(&self) -> bool {
        self.filenames.is_some()
    }

    pub fn manifest(&self) -> ArchiveManifest {
        ArchiveManifest::from_sources(self.sources.iter().cloned())
    }
}

/// `Data` of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentData {
    pub archives: usize,
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<BuildId>,
    pub purged: usize,
}

pub type DeploymentEvent = CustomResourceEvent<DeploymentProperties>;

/// Allocate a physical id for a newly created resource.
pub fn new_physical_id() -> String {
    format!("sitedeploy.{}", Uuid::new_v4())
}

#[derive(Debug)]
pub enum Transition<'a> {
    Create {
        new: &'a DeploymentProperties,
    },
    Update {
        new: &'a DeploymentProperties,
        previous: DeploymentState,
    },
    Delete {
        current: &'a DeploymentProperties,
    },
}

impl<'a> Transition<'a> {
    pub fn from_event(event: &'a DeploymentEvent) -> Self {
        match event.request_type {
            RequestType::Create => Transition::Create {
                new: &event.resource_properties,
            },
            RequestType::Update => Transition::Update {
                new: &event.resource_properties,
                previous: DeploymentState::from_properties(event.old_resource_properties.as_ref()),
            },
            RequestType::Delete => Transition::Delete {
                current: &event.resource_properties,
            },
        }
    }
}

/// Runs deployment requests against the buckets in a [`StoreRegistry`].
#[derive(Debug, Clone)]
pub struct DeploymentHandler {
    registry: StoreRegistry,
    archive_concurrency: usize,
    file_concurrency: usize,
}

impl DeploymentHandler {
    pub fn new(registry: StoreRegistry) -> Self {
        Self {
            registry,
            archive_concurrency: DEFAULT_ARCHIVE_CONCURRENCY,
            file_concurrency: DEFAULT_FILE_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, archives: usize, files: usize) -> Self {
        self.archive_concurrency = archives;
        self.file_concurrency = files;
        self
    }

    /// Handle one request. Failures become a `FAILED` response.
    pub async fn handle(&self, event: &DeploymentEvent) -> CustomResourceResponse {
        let _span = RequestSpan::enter(
            &event.request_id,
            event.request_type.as_str(),
            &event.logical_resource_id,
        );
        let started = Instant::now();

        let physical_id = match event.request_type {
            RequestType::Create => new_physical_id(),
            _ => match event.require_physical_id() {
                Ok(id) => id.to_string(),
                Err(e) => {
                    return CustomResourceResponse::failed(
                        event,
                        event.logical_resource_id.clone(),
                        e.to_string(),
                    )
                }
            },
        };

        let response = match self.apply(Transition::from_event(event)).await {
            Ok(data) => {
                CustomResourceResponse::success(event, physical_id, serde_json::to_value(data).ok())
            }
            Err(e) => {
                warn!(error = %e, "deployment request failed");
                CustomResourceResponse::failed(event, physical_id, e.to_string())
            }
        };

        obs::emit_deploy_finished(
            event.request_type.as_str(),
            response.is_success(),
            started.elapsed().as_millis() as u64,
        );
        METRICS.flush();
        response
    }

    /// Run one transition of the lifecycle state machine.
    pub async fn apply(&self, transition: Transition<'_>) -> Result<DeploymentData> {
        match transition {
            Transition::Create { new } => {
                let manifest = new.manifest();
                obs::emit_deploy_started("Create", manifest.len(), new.purge_files());
                let report = self.uploader(new)?.apply_all(&manifest).await?;
                Ok(DeploymentData {
                    archives: report.archives,
                    file_count: report.keys.len(),
                    build_id: new.build_id.clone(),
                    purged: 0,
                })
            }
            Transition::Update { new, previous } => {
                let manifest = new.manifest();
                obs::emit_deploy_started("Update", manifest.len(), new.purge_files());
                let destination = self.registry.bucket(&new.destination_bucket_name)?;
                let report = self.uploader(new)?.apply_all(&manifest).await?;

                let purged = if new.purge_files() {
                    self.purge_stale(&previous, &report.keys, destination.as_ref())
                        .await
                } else {
                    0
                };
                Ok(DeploymentData {
                    archives: report.archives,
                    file_count: report.keys.len(),
                    build_id: new.build_id.clone(),
                    purged,
                })
            }
            Transition::Delete { current } => {
                obs::emit_deploy_started("Delete", current.sources.len(), false);
                let removed = self.teardown(current).await;
                Ok(DeploymentData {
                    archives: 0,
                    file_count: 0,
                    build_id: current.build_id.clone(),
                    purged: removed,
                })
            }
        }
    }

    fn uploader(&self, props: &DeploymentProperties) -> Result<Uploader> {
        let destination = self.registry.bucket(&props.destination_bucket_name)?;
        Ok(Uploader::new(
            self.registry.clone(),
            destination,
            props.file_options.clone(),
            replace::compile(&props.replace_values)?,
        )
        .with_concurrency(self.archive_concurrency, self.file_concurrency))
    }

    async fn read_listing(&self, location: &StorageLocation) -> Result<BTreeSet<String>> {
        let bytes = self.registry.read(location).await?;
        Ok(parse_filenames(&String::from_utf8_lossy(&bytes))
            .into_iter()
            .collect())
    }

    /// Keys deployed before this Update: the old listing when it can be
    /// read, otherwise whatever the destination currently holds.
    async fn previous_keys(
        &self,
        previous: &DeploymentState,
        destination: &dyn BlobStore,
    ) -> Result<BTreeSet<String>> {
        if let Some(location) = &previous.previous_filenames {
            match self.read_listing(location).await {
                Ok(keys) => return Ok(keys),
                Err(e) => warn!(
                    location = %location,
                    error = %e,
                    "previous filenames unreadable, falling back to bucket listing"
                ),
            }
        }
        Ok(destination.list(None).await?.into_iter().collect())
    }

    async fn purge_stale(
        &self,
        previous: &DeploymentState,
        current: &BTreeSet<String>,
        destination: &dyn BlobStore,
    ) -> usize {
        let previous_keys = match self.previous_keys(previous, destination).await {
            Ok(keys) => keys,
            Err(e) => {
                obs::emit_purge_failed("*", &e);
                METRICS.inc_purge_failures();
                return 0;
            }
        };
        let stale = purge::stale_keys(&previous_keys, current);
        if stale.is_empty() {
            return 0;
        }
        info!(stale = stale.len(), "purging stale objects");
        purge::purge(destination, &stale).await.deleted.len()
    }

    /// Remove everything the deployment wrote. Never fails: a Delete that
    /// cannot find or remove its objects still lets the stack go away.
    async fn teardown(&self, current: &DeploymentProperties) -> usize {
        if current.destination_auto_delete {
            info!(
                bucket = %current.destination_bucket_name,
                "destination deletes its own objects, skipping teardown"
            );
            return 0;
        }

        let (destination, keys) = match self.deployed_keys(current).await {
            Ok(found) => found,
            Err(e) => {
                obs::emit_teardown_failed("*", &e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in &keys {
            match destination.delete(key).await {
                Ok(()) => removed += 1,
                Err(e) => obs::emit_teardown_failed(key, &e),
            }
        }
        removed
    }

    async fn deployed_keys(
        &self,
        current: &DeploymentProperties,
    ) -> Result<(Arc<dyn BlobStore>, BTreeSet<String>)> {
        let destination = self.registry.bucket(&current.destination_bucket_name)?;
        let keys = match &current.filenames {
            Some(location) => self.read_listing(location).await?,
            None => {
                self.uploader(current)?
                    .manifest_keys(&current.manifest())
                    .await?
            }
        };
        Ok((destination, keys))
    }
}
