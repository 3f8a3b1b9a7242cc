//! Trait contract tests for BlobStore.
//!
//! Every backend that ships with the crate must behave the same way for the
//! operations the deployment pipeline relies on. The fake and the filesystem
//! store are exercised here; the S3 store is covered against `object_store`'s
//! in-memory backend in its unit tests.

use std::sync::Arc;

use sitedeploy_store::fakes::{MemoryBlobStore, StoreOp};
use sitedeploy_store::{BlobStore, FsBlobStore, ObjectAttributes, StorageError};

fn backends() -> (tempfile::TempDir, Vec<(&'static str, Arc<dyn BlobStore>)>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsBlobStore::new(dir.path()).unwrap();
    let stores: Vec<(&'static str, Arc<dyn BlobStore>)> = vec![
        ("memory", Arc::new(MemoryBlobStore::new())),
        ("fs", Arc::new(fs)),
    ];
    (dir, stores)
}

// ===========================================================================
// BlobStore contract tests
// ===========================================================================

#[tokio::test]
async fn put_then_get_returns_same_bytes() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        store
            .put("css/site.css", b"body{}", &ObjectAttributes::default())
            .await
            .unwrap();
        assert_eq!(store.get("css/site.css").await.unwrap(), b"body{}", "{name}");
    }
}

#[tokio::test]
async fn last_write_wins() {
    let (_dir, stores) = backends();
    let attrs = ObjectAttributes::default();
    for (name, store) in stores {
        store.put("a.txt", b"first", &attrs).await.unwrap();
        store.put("a.txt", b"second", &attrs).await.unwrap();
        assert_eq!(store.get("a.txt").await.unwrap(), b"second", "{name}");
    }
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let err = store.get("missing.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }), "{name}: {err}");
    }
}

#[tokio::test]
async fn delete_removes_and_is_idempotent() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        store
            .put("old.txt", b"x", &ObjectAttributes::default())
            .await
            .unwrap();
        store.delete("old.txt").await.unwrap();
        store.delete("old.txt").await.unwrap();
        assert!(!store.contains("old.txt").await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn list_returns_sorted_keys() {
    let (_dir, stores) = backends();
    let attrs = ObjectAttributes::default();
    for (name, store) in stores {
        for key in ["z.txt", "a/b.txt", "m.txt"] {
            store.put(key, b"x", &attrs).await.unwrap();
        }
        assert_eq!(
            store.list(None).await.unwrap(),
            vec!["a/b.txt", "m.txt", "z.txt"],
            "{name}"
        );
    }
}

#[tokio::test]
async fn invalid_keys_are_rejected() {
    let (_dir, stores) = backends();
    for (name, store) in stores {
        let err = store
            .put("../escape.txt", b"x", &ObjectAttributes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }), "{name}");
    }
}

// ===========================================================================
// MemoryBlobStore fake behaviour
// ===========================================================================

#[tokio::test]
async fn fake_keeps_attributes() {
    let store = MemoryBlobStore::new();
    let attrs = ObjectAttributes::default().with_cache_control("max-age=60");
    store.put("index.html", b"x", &attrs).await.unwrap();
    assert_eq!(store.object("index.html").unwrap().attributes, attrs);
}

#[tokio::test]
async fn fake_records_history_with_visible_keys() {
    let store = MemoryBlobStore::new();
    let attrs = ObjectAttributes::default();
    store.put("a.txt", b"a", &attrs).await.unwrap();
    store.put("b.txt", b"b", &attrs).await.unwrap();
    store.delete("a.txt").await.unwrap();

    let history = store.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].op, StoreOp::Put("a.txt".to_string()));
    assert_eq!(history[2].op, StoreOp::Delete("a.txt".to_string()));
    assert!(history[2].keys_after.contains("b.txt"));
    assert!(!history[2].keys_after.contains("a.txt"));
}

#[tokio::test]
async fn fake_injected_failures_surface_as_backend_errors() {
    let store = MemoryBlobStore::new();
    store.fail_put("broken.txt");
    store.fail_delete("sticky.txt");
    store.insert("sticky.txt", b"x");

    let put = store
        .put("broken.txt", b"x", &ObjectAttributes::default())
        .await;
    assert!(matches!(put, Err(StorageError::Backend(_))));
    assert!(matches!(
        store.delete("sticky.txt").await,
        Err(StorageError::Backend(_))
    ));
    assert!(store.contains("sticky.txt").await.unwrap());
}
