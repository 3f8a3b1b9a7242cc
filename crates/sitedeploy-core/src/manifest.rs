//! Archive manifests and the state carried between deployments.

use serde::{Deserialize, Serialize};
use sitedeploy_store::StorageLocation;

use crate::fingerprint::BuildId;
use crate::lifecycle::DeploymentProperties;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub archive_index: usize,
    pub location: StorageLocation,
}

/// Where each archive of one deployment attempt lives. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveManifest {
    entries: Vec<ManifestEntry>,
}

impl ArchiveManifest {
    /// Index archives in the order given.
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = StorageLocation>,
    {
        let entries = sources
            .into_iter()
            .enumerate()
            .map(|(archive_index, location)| ManifestEntry {
                archive_index,
                location,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `Sources` request property for this manifest.
    pub fn sources(&self) -> Vec<StorageLocation> {
        self.entries.iter().map(|e| e.location.clone()).collect()
    }
}

/// What the previous successful deployment left behind.
///
/// The provisioning engine owns this; the handler only sees it through the
/// `OldResourceProperties` of an Update or the properties of a Delete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeploymentState {
    pub previous_manifest: Option<ArchiveManifest>,
    pub previous_filenames: Option<StorageLocation>,
    pub previous_build_id: Option<BuildId>,
}

impl DeploymentState {
    pub fn from_properties(props: Option<&DeploymentProperties>) -> Self {
        match props {
            Some(p) => Self {
                previous_manifest: Some(ArchiveManifest::from_sources(p.sources.iter().cloned())),
                previous_filenames: p.filenames.clone(),
                previous_build_id: p.build_id.clone(),
            },
            None => Self::default(),
        }
    }

    pub fn is_first_deployment(&self) -> bool {
        self.previous_manifest.is_none()
    }
}
