//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryBlobStore` satisfies the [`BlobStore`] contract without any
//! external dependencies, can be told to fail specific keys, and records
//! every mutation together with the key set visible right after it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// A single mutation observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put(String),
    Delete(String),
}

/// A mutation plus the keys present immediately after it was applied.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub op: StoreOp,
    pub keys_after: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Failures {
    puts: HashSet<String>,
    deletes: HashSet<String>,
    gets: HashSet<String>,
}

/// In-memory bucket backed by a `BTreeMap<key, object>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failures: Mutex<Failures>,
    history: Mutex<Vec<StoreEvent>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording it in the history.
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                attributes: ObjectAttributes::default(),
            },
        );
    }

    /// Make every `put` of `key` fail with a backend error.
    pub fn fail_put(&self, key: &str) {
        self.failures.lock().unwrap().puts.insert(key.to_string());
    }

    /// Make every `delete` of `key` fail with a backend error.
    pub fn fail_delete(&self, key: &str) {
        self.failures.lock().unwrap().deletes.insert(key.to_string());
    }

    /// Make every `get` of `key` fail with a backend error.
    pub fn fail_get(&self, key: &str) {
        self.failures.lock().unwrap().gets.insert(key.to_string());
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn history(&self) -> Vec<StoreEvent> {
        self.history.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    fn record(&self, op: StoreOp, objects: &BTreeMap<String, StoredObject>) {
        self.history.lock().unwrap().push(StoreEvent {
            op,
            keys_after: objects.keys().cloned().collect(),
        });
    }
}

fn injected(action: &str, key: &str) -> StorageError {
    StorageError::Backend(format!("injected {action} failure for '{key}'"))
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        attributes: &ObjectAttributes,
    ) -> StorageResult<()> {
        validate_key(key)?;
        if self.failures.lock().unwrap().puts.contains(key) {
            return Err(injected("put", key));
        }
        let mut objects = self.objects.lock().unwrap();
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                attributes: attributes.clone(),
            },
        );
        self.record(StoreOp::Put(key.to_string()), &objects);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        if self.failures.lock().unwrap().gets.contains(key) {
            return Err(injected("get", key));
        }
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.failures.lock().unwrap().deletes.contains(key) {
            return Err(injected("delete", key));
        }
        let mut objects = self.objects.lock().unwrap();
        if objects.remove(key).is_some() {
            self.record(StoreOp::Delete(key.to_string()), &objects);
        }
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}
