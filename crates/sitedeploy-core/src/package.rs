//! Build-side packaging: archive the site, fingerprint it, publish archives.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sitedeploy_store::{BlobStore, ObjectAttributes, StorageLocation};
use tracing::{debug, info};

use crate::archiver;
use crate::error::{DeployError, Result};
use crate::fingerprint::{self, BuildId};
use crate::manifest::ArchiveManifest;
use crate::placeholder::{self, PlaceholderSource};

/// Key prefix for published archives and listings in the asset bucket.
pub const ASSET_PREFIX: &str = "assets";

#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_archive_bytes: u64,
    /// Subtrees whose file names are already content-hashed.
    pub versioned_subdirs: Vec<String>,
    /// Set to skip the real build output entirely.
    pub placeholder: Option<PlaceholderSource>,
}

/// Archives on disk plus the build id they were fingerprinted as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePackage {
    pub output_dir: PathBuf,
    pub parts: Vec<PathBuf>,
    pub filenames_path: PathBuf,
    pub file_count: usize,
    pub build_id: BuildId,
    pub placeholder: bool,
}

pub fn package_site(opts: &PackageOptions) -> Result<SitePackage> {
    let (output, build_id, is_placeholder) = match &opts.placeholder {
        Some(source) => (
            placeholder::write_placeholder(source, &opts.output_dir)?,
            BuildId::live(),
            true,
        ),
        None => {
            let output = archiver::archive_directory(
                &opts.source_dir,
                &opts.output_dir,
                opts.max_archive_bytes,
            )?;
            let build_id =
                fingerprint::build_id_from_paths(&output.filenames, &opts.versioned_subdirs);
            (output, build_id, false)
        }
    };

    info!(
        build_id = %build_id.short(),
        archives = output.parts.len(),
        files = output.filenames.len(),
        placeholder = is_placeholder,
        "packaged site"
    );
    Ok(SitePackage {
        output_dir: opts.output_dir.clone(),
        parts: output.parts,
        filenames_path: output.filenames_path,
        file_count: output.filenames.len(),
        build_id,
        placeholder: is_placeholder,
    })
}

/// Archive and listing locations in the asset bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAssets {
    pub sources: Vec<StorageLocation>,
    pub filenames: StorageLocation,
}

impl PublishedAssets {
    pub fn manifest(&self) -> ArchiveManifest {
        ArchiveManifest::from_sources(self.sources.iter().cloned())
    }
}

async fn publish_file(
    store: &dyn BlobStore,
    bucket: &str,
    path: &Path,
    extension: &str,
    content_type: &str,
) -> Result<StorageLocation> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| DeployError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    let digest = hex::encode(Sha256::digest(&data));
    let key = format!("{ASSET_PREFIX}/{digest}.{extension}");

    if store.contains(&key).await? {
        debug!(key = %key, "asset already published");
    } else {
        let attrs = ObjectAttributes::default().with_content_type(content_type);
        store
            .put(&key, &data, &attrs)
            .await
            .map_err(|source| DeployError::UploadFailed {
                key: key.clone(),
                source,
            })?;
        debug!(key = %key, bytes = data.len(), "published asset");
    }
    Ok(StorageLocation::new(bucket, key))
}

/// Upload every archive and the listing under content-addressed keys.
/// Already-present keys are not rewritten.
pub async fn publish_assets(
    package: &SitePackage,
    store: &dyn BlobStore,
    bucket: &str,
) -> Result<PublishedAssets> {
    let mut sources = Vec::with_capacity(package.parts.len());
    for part in &package.parts {
        sources.push(publish_file(store, bucket, part, "zip", "application/zip").await?);
    }
    let filenames = publish_file(
        store,
        bucket,
        &package.filenames_path,
        "filenames",
        "text/plain",
    )
    .await?;
    info!(bucket = %bucket, archives = sources.len(), "published site assets");
    Ok(PublishedAssets { sources, filenames })
}

#[cfg(test)]
mod tests {
    use sitedeploy_store::fakes::MemoryBlobStore;

    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir_all(dir.path().join("_app/immutable")).unwrap();
        std::fs::write(dir.path().join("_app/immutable/app-1a2b.js"), "x").unwrap();
        dir
    }

    fn options(src: &Path, out: &Path) -> PackageOptions {
        PackageOptions {
            source_dir: src.to_path_buf(),
            output_dir: out.to_path_buf(),
            max_archive_bytes: 200 * 1024 * 1024,
            versioned_subdirs: vec!["_app/immutable".to_string()],
            placeholder: None,
        }
    }

    #[test]
    fn build_id_ignores_versioned_subdir() {
        let src = site();
        let out = tempfile::tempdir().unwrap();
        let first = package_site(&options(src.path(), &out.path().join("a"))).unwrap();

        std::fs::rename(
            src.path().join("_app/immutable/app-1a2b.js"),
            src.path().join("_app/immutable/app-ffff.js"),
        )
        .unwrap();
        let second = package_site(&options(src.path(), &out.path().join("b"))).unwrap();
        assert_eq!(first.build_id, second.build_id);
        assert_eq!(second.file_count, 2);
        assert!(!second.placeholder);
    }

    #[test]
    fn placeholder_skips_the_build_output() {
        let out = tempfile::tempdir().unwrap();
        let mut opts = options(&out.path().join("missing-build"), &out.path().join("a"));
        opts.placeholder = Some(PlaceholderSource::BuiltIn);
        let pkg = package_site(&opts).unwrap();
        assert!(pkg.build_id.is_live());
        assert!(pkg.placeholder);
        assert_eq!(pkg.parts.len(), 1);
    }

    #[tokio::test]
    async fn publish_uses_content_addressed_keys() {
        let src = site();
        let out = tempfile::tempdir().unwrap();
        let pkg = package_site(&options(src.path(), out.path())).unwrap();
        let store = MemoryBlobStore::new();

        let published = publish_assets(&pkg, &store, "assets").await.unwrap();
        assert_eq!(published.sources.len(), 1);
        let key = &published.sources[0].object_key;
        assert!(key.starts_with("assets/") && key.ends_with(".zip"));
        assert!(published.filenames.object_key.ends_with(".filenames"));

        store.clear_history();
        let again = publish_assets(&pkg, &store, "assets").await.unwrap();
        assert_eq!(again, published);
        assert!(store.history().is_empty());
    }
}
