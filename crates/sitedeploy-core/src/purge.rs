//! Stale-object deletion.
//!
//! Deletions here never fail a deployment. Each failure is logged and
//! counted, and the remaining keys are still attempted.

use std::collections::BTreeSet;

use sitedeploy_store::BlobStore;

use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Keys present before that are absent now.
pub fn stale_keys(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Vec<String> {
    previous.difference(current).cloned().collect()
}

/// Delete `keys` from `store`, warning on each failure.
pub async fn purge(store: &dyn BlobStore, keys: &[String]) -> PurgeReport {
    let mut report = PurgeReport::default();
    for key in keys {
        match store.delete(key).await {
            Ok(()) => {
                METRICS.inc_purged();
                report.deleted.push(key.clone());
            }
            Err(e) => {
                METRICS.inc_purge_failures();
                obs::emit_purge_failed(key, &e);
                report.failed.push(key.clone());
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use sitedeploy_store::fakes::MemoryBlobStore;

    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn stale_is_previous_minus_current() {
        let stale = stale_keys(&set(&["a.txt", "b.txt", "c.txt"]), &set(&["b.txt", "d.txt"]));
        assert_eq!(stale, vec!["a.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_purge() {
        let store = MemoryBlobStore::new();
        store.insert("a.txt", b"a");
        store.insert("b.txt", b"b");
        store.fail_delete("a.txt");

        let report = purge(&store, &["a.txt".to_string(), "b.txt".to_string()]).await;
        assert_eq!(report.deleted, vec!["b.txt"]);
        assert_eq!(report.failed, vec!["a.txt"]);
        assert!(store.object("a.txt").is_some());
        assert!(store.object("b.txt").is_none());
    }
}
