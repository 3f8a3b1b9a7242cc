//! Extract published archives into the destination bucket.
//!
//! Archives are independent, so several are fetched and unpacked at once and
//! the files of each are written concurrently. The first failed write aborts
//! the whole apply; nothing reports success after a partial upload.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::{Component, Path};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use sitedeploy_store::{validate_key, BlobStore, StorageLocation, StoreRegistry};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{DeployError, Result};
use crate::file_options::{attributes_for, FileOptionRule};
use crate::manifest::ArchiveManifest;
use crate::metrics::METRICS;
use crate::obs;
use crate::replace::{self, CompiledReplace};

pub const DEFAULT_ARCHIVE_CONCURRENCY: usize = 4;
pub const DEFAULT_FILE_CONCURRENCY: usize = 16;

/// What one apply wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub archives: usize,
    pub keys: BTreeSet<String>,
    pub bytes: u64,
}

struct ArchiveUpload {
    keys: Vec<String>,
    bytes: u64,
}

/// Copies archive contents into one destination bucket.
#[derive(Clone)]
pub struct Uploader {
    registry: StoreRegistry,
    destination: Arc<dyn BlobStore>,
    rules: Arc<Vec<FileOptionRule>>,
    replacements: Arc<Vec<CompiledReplace>>,
    archive_concurrency: usize,
    file_concurrency: usize,
}

impl Uploader {
    pub fn new(
        registry: StoreRegistry,
        destination: Arc<dyn BlobStore>,
        rules: Vec<FileOptionRule>,
        replacements: Vec<CompiledReplace>,
    ) -> Self {
        Self {
            registry,
            destination,
            rules: Arc::new(rules),
            replacements: Arc::new(replacements),
            archive_concurrency: DEFAULT_ARCHIVE_CONCURRENCY,
            file_concurrency: DEFAULT_FILE_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, archives: usize, files: usize) -> Self {
        self.archive_concurrency = archives.max(1);
        self.file_concurrency = files.max(1);
        self
    }

    /// Upload every archive of `manifest`. Safe to re-run.
    pub async fn apply_all(&self, manifest: &ArchiveManifest) -> Result<UploadReport> {
        let uploads: Vec<ArchiveUpload> = stream::iter(manifest.entries())
            .map(|entry| self.upload_archive(&entry.location))
            .buffer_unordered(self.archive_concurrency)
            .try_collect()
            .await?;

        let mut report = UploadReport {
            archives: uploads.len(),
            ..Default::default()
        };
        for upload in uploads {
            report.bytes += upload.bytes;
            report.keys.extend(upload.keys);
        }
        Ok(report)
    }

    async fn upload_archive(&self, location: &StorageLocation) -> Result<ArchiveUpload> {
        let bytes = self.registry.read(location).await?;
        let label = location.to_string();
        let files = tokio::task::spawn_blocking(move || extract(&label, bytes))
            .await
            .map_err(|e| DeployError::Io(std::io::Error::other(e)))??;

        let keys: Vec<String> = files.iter().map(|(k, _)| k.clone()).collect();
        let total: u64 = files.iter().map(|(_, d)| d.len() as u64).sum();

        stream::iter(files)
            .map(Ok)
            .try_for_each_concurrent(self.file_concurrency, |(key, data)| async move {
                let data = replace::apply(&self.replacements, &key, data);
                let attributes = attributes_for(&self.rules, &key);
                let size = data.len() as u64;
                self.destination
                    .put(&key, &data, &attributes)
                    .await
                    .map_err(|source| DeployError::UploadFailed {
                        key: key.clone(),
                        source,
                    })?;
                METRICS.record_upload(size);
                debug!(key = %key, bytes = size, cache_control = ?attributes.cache_control, "uploaded");
                Ok::<(), DeployError>(())
            })
            .await?;

        obs::emit_archive_uploaded(&location.to_string(), keys.len(), total);
        Ok(ArchiveUpload { keys, bytes: total })
    }

    /// Keys contained in the archives of `manifest`, without uploading.
    pub async fn manifest_keys(&self, manifest: &ArchiveManifest) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for entry in manifest.entries() {
            let bytes = self.registry.read(&entry.location).await?;
            let label = entry.location.to_string();
            let names = tokio::task::spawn_blocking(move || entry_names(&label, bytes))
                .await
                .map_err(|e| DeployError::Io(std::io::Error::other(e)))??;
            keys.extend(names);
        }
        Ok(keys)
    }
}

fn key_from_path(archive: &str, raw: &str, path: &Path) -> Result<String> {
    let unsafe_entry = || DeployError::UnsafeArchiveEntry {
        archive: archive.to_string(),
        entry: raw.to_string(),
    };
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => segments.push(s.to_str().ok_or_else(unsafe_entry)?),
            Component::CurDir => {}
            _ => return Err(unsafe_entry()),
        }
    }
    let key = segments.join("/");
    validate_key(&key).map_err(|_| unsafe_entry())?;
    Ok(key)
}

fn extract(archive: &str, bytes: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let path = file.enclosed_name().ok_or_else(|| DeployError::UnsafeArchiveEntry {
            archive: archive.to_string(),
            entry: file.name().to_string(),
        })?;
        let key = key_from_path(archive, file.name(), &path)?;
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)?;
        files.push((key, data));
    }
    Ok(files)
}

fn entry_names(archive: &str, bytes: Vec<u8>) -> Result<Vec<String>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let file = zip.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let path = file.enclosed_name().ok_or_else(|| DeployError::UnsafeArchiveEntry {
            archive: archive.to_string(),
            entry: file.name().to_string(),
        })?;
        names.push(key_from_path(archive, file.name(), &path)?);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sitedeploy_store::fakes::MemoryBlobStore;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::file_options::default_rules;
    use crate::replace::{compile, ReplaceValue};

    fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn setup(
        archives: &[&[(&str, &str)]],
    ) -> (Arc<MemoryBlobStore>, Arc<MemoryBlobStore>, StoreRegistry, ArchiveManifest) {
        let assets = Arc::new(MemoryBlobStore::new());
        let dest = Arc::new(MemoryBlobStore::new());
        let mut sources = Vec::new();
        for (i, files) in archives.iter().enumerate() {
            let key = format!("assets/part{i}.zip");
            assets.insert(&key, &zip_of(files));
            sources.push(StorageLocation::new("assets", key));
        }
        let registry = StoreRegistry::new()
            .with_store("assets", assets.clone())
            .with_store("site", dest.clone());
        (assets, dest, registry, ArchiveManifest::from_sources(sources))
    }

    #[tokio::test]
    async fn uploads_every_file_with_rule_attributes() {
        let (_assets, dest, registry, manifest) = setup(&[
            &[("index.html", "<h1>hi</h1>"), ("css/site.css", "body{}")],
            &[("img/logo.png", "PNG!")],
        ]);
        let uploader = Uploader::new(registry, dest.clone(), default_rules().unwrap(), vec![]);

        let report = uploader.apply_all(&manifest).await.unwrap();
        assert_eq!(report.archives, 2);
        assert_eq!(report.keys.len(), 3);
        assert_eq!(report.bytes, 11 + 6 + 4);

        let html = dest.object("index.html").unwrap();
        assert_eq!(
            html.attributes.cache_control.as_deref(),
            Some(crate::file_options::HTML_CACHE_CONTROL)
        );
        assert_eq!(html.attributes.content_type.as_deref(), Some("text/html"));
        assert_eq!(dest.object("img/logo.png").unwrap().attributes.cache_control, None);
    }

    #[tokio::test]
    async fn re_running_overwrites_idempotently() {
        let (_assets, dest, registry, manifest) = setup(&[&[("a.txt", "a")]]);
        let uploader = Uploader::new(registry, dest.clone(), vec![], vec![]);
        uploader.apply_all(&manifest).await.unwrap();
        uploader.apply_all(&manifest).await.unwrap();
        assert_eq!(dest.keys().len(), 1);
        assert_eq!(dest.object("a.txt").unwrap().data, b"a");
    }

    #[tokio::test]
    async fn single_write_failure_fails_the_apply() {
        let (_assets, dest, registry, manifest) =
            setup(&[&[("a.txt", "a"), ("b.txt", "b")]]);
        dest.fail_put("b.txt");
        let uploader = Uploader::new(registry, dest.clone(), vec![], vec![]);
        let err = uploader.apply_all(&manifest).await.unwrap_err();
        assert!(matches!(err, DeployError::UploadFailed { ref key, .. } if key == "b.txt"));
    }

    #[tokio::test]
    async fn missing_archive_fails_the_apply() {
        let (assets, dest, registry, manifest) = setup(&[&[("a.txt", "a")]]);
        assets.fail_get("assets/part0.zip");
        let uploader = Uploader::new(registry, dest, vec![], vec![]);
        assert!(uploader.apply_all(&manifest).await.is_err());
    }

    #[tokio::test]
    async fn replace_values_rewrite_matching_files() {
        let (_assets, dest, registry, manifest) =
            setup(&[&[("app.js", "url='{{URL}}'"), ("a.txt", "{{URL}}")]]);
        let replacements = compile(&[ReplaceValue {
            files: "*.js".to_string(),
            search: "{{URL}}".to_string(),
            replace: "https://x".to_string(),
        }])
        .unwrap();
        let uploader = Uploader::new(registry, dest.clone(), vec![], replacements);
        uploader.apply_all(&manifest).await.unwrap();
        assert_eq!(dest.object("app.js").unwrap().data, b"url='https://x'");
        assert_eq!(dest.object("a.txt").unwrap().data, b"{{URL}}");
    }

    #[tokio::test]
    async fn traversal_entries_are_rejected() {
        let (_assets, dest, registry, manifest) = setup(&[&[("../evil.txt", "x")]]);
        let uploader = Uploader::new(registry, dest.clone(), vec![], vec![]);
        let err = uploader.apply_all(&manifest).await.unwrap_err();
        assert!(matches!(err, DeployError::UnsafeArchiveEntry { .. }));
        assert!(dest.keys().is_empty());
    }

    #[tokio::test]
    async fn manifest_keys_lists_without_uploading() {
        let (_assets, dest, registry, manifest) =
            setup(&[&[("a.txt", "a")], &[("dir/b.txt", "b")]]);
        let uploader = Uploader::new(registry, dest.clone(), vec![], vec![]);
        let keys = uploader.manifest_keys(&manifest).await.unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["a.txt", "dir/b.txt"]);
        assert!(dest.keys().is_empty());
    }
}
