//! Build identifiers derived from the structure of a file tree.
//!
//! A [`BuildId`] hashes the sorted set of relative paths, not file bytes.
//! Paths under an excluded subtree (a bundler's content-hashed output
//! directory) are ignored, so the id only moves when files outside it are
//! added, removed or renamed.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::archiver;
use crate::error::Result;

/// Build id used by placeholder deployments. Never equal to a real hash.
pub const LIVE_BUILD_ID: &str = "live";

/// Opaque fingerprint of a build's path structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The placeholder sentinel.
    pub fn live() -> Self {
        Self(LIVE_BUILD_ID.to_string())
    }

    pub fn is_live(&self) -> bool {
        self.0 == LIVE_BUILD_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_subdir(subdir: &str) -> String {
    subdir.trim_matches('/').replace('\\', "/")
}

fn is_excluded(path: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|dir| {
        !dir.is_empty()
            && path
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Compute a [`BuildId`] from relative paths.
///
/// Input order does not matter; duplicates count once.
pub fn build_id_from_paths<I, S>(paths: I, excluded_subdirs: &[String]) -> BuildId
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let excluded: Vec<String> = excluded_subdirs
        .iter()
        .map(|d| normalize_subdir(d))
        .collect();

    let sorted: BTreeSet<String> = paths
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .filter(|p| !is_excluded(p, &excluded))
        .collect();

    let mut hasher = Sha256::new();
    for path in &sorted {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
    }
    let id = BuildId(hex::encode(hasher.finalize()));
    debug!(build_id = %id.short(), paths = sorted.len(), "computed build id");
    id
}

/// Compute the [`BuildId`] of every file under `dir`.
pub fn build_id_for_dir(dir: &Path, excluded_subdirs: &[String]) -> Result<BuildId> {
    let entries = archiver::list_files(dir)?;
    Ok(build_id_from_paths(
        entries.iter().map(|e| e.relative_path.as_str()),
        excluded_subdirs,
    ))
}
