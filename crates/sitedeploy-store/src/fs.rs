use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::storage_traits::{validate_key, BlobStore, ObjectAttributes, StorageResult};

/// Filesystem-backed bucket: each key is a file below `root`.
///
/// Layout: `<root>/<key>` with `/` in the key mapped to directories.
/// Object attributes are not persisted.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a new `FsBlobStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
        let dir = path.parent().ok_or_else(|| StorageError::InvalidKey {
            key: path.display().to_string(),
            reason: "no parent directory".to_string(),
        })?;
        std::fs::create_dir_all(dir)?;

        // Write to a temp file in the same directory, then rename over the target.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn list_blocking(root: &Path, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if prefix.map_or(true, |p| key.starts_with(p)) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        _attributes: &ObjectAttributes,
    ) -> StorageResult<()> {
        let path = self.object_path(key)?;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || Self::write_atomic(&path, &data))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.map(str::to_string);
        tokio::task::spawn_blocking(move || Self::list_blocking(&root, prefix.as_deref()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn nested_key_lands_in_subdirectory() {
        let (dir, store) = make_store();
        store
            .put("_app/immutable/a.js", b"js", &ObjectAttributes::default())
            .await
            .unwrap();

        let on_disk = dir.path().join("_app").join("immutable").join("a.js");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"js");
        assert_eq!(store.get("_app/immutable/a.js").await.unwrap(), b"js");
    }

    #[tokio::test]
    async fn put_overwrites_existing_object() {
        let (_dir, store) = make_store();
        let attrs = ObjectAttributes::default();
        store.put("index.html", b"v1", &attrs).await.unwrap();
        store.put("index.html", b"v2", &attrs).await.unwrap();
        assert_eq!(store.get("index.html").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let (_dir, store) = make_store();
        match store.get("nope.txt").await {
            Err(StorageError::NotFound { key }) => assert_eq!(key, "nope.txt"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let (_dir, store) = make_store();
        store.delete("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_sorted_and_filtered() {
        let (_dir, store) = make_store();
        let attrs = ObjectAttributes::default();
        for key in ["b.txt", "a/2.txt", "a/1.txt"] {
            store.put(key, b"x", &attrs).await.unwrap();
        }
        assert_eq!(
            store.list(None).await.unwrap(),
            vec!["a/1.txt", "a/2.txt", "b.txt"]
        );
        assert_eq!(store.list(Some("a/")).await.unwrap(), vec!["a/1.txt", "a/2.txt"]);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (_dir, store) = make_store();
        let err = store
            .put("../outside", b"x", &ObjectAttributes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
