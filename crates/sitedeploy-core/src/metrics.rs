//! Process-wide deployment counters.
//!
//! Incremented at the call site; [`Metrics::flush`] emits the current values
//! as one `tracing::info!` event at the end of an invocation.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    files_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    objects_purged: AtomicU64,
    purge_failures: AtomicU64,
    invalidations_issued: AtomicU64,
    invalidation_polls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_uploaded: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            objects_purged: AtomicU64::new(0),
            purge_failures: AtomicU64::new(0),
            invalidations_issued: AtomicU64::new(0),
            invalidation_polls: AtomicU64::new(0),
        }
    }

    pub fn record_upload(&self, bytes: u64) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_purged(&self) {
        self.objects_purged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_purge_failures(&self) {
        self.purge_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalidations(&self) {
        self.invalidations_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_polls(&self) {
        self.invalidation_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_uploaded = self.files_uploaded(),
            bytes_uploaded = self.bytes_uploaded(),
            objects_purged = self.objects_purged(),
            purge_failures = self.purge_failures(),
            invalidations_issued = self.invalidations_issued(),
            invalidation_polls = self.invalidation_polls(),
        );
    }

    pub fn files_uploaded(&self) -> u64 {
        self.files_uploaded.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    pub fn objects_purged(&self) -> u64 {
        self.objects_purged.load(Ordering::Relaxed)
    }

    pub fn purge_failures(&self) -> u64 {
        self.purge_failures.load(Ordering::Relaxed)
    }

    pub fn invalidations_issued(&self) -> u64 {
        self.invalidations_issued.load(Ordering::Relaxed)
    }

    pub fn invalidation_polls(&self) -> u64 {
        self.invalidation_polls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.files_uploaded,
            &self.bytes_uploaded,
            &self.objects_purged,
            &self.purge_failures,
            &self.invalidations_issued,
            &self.invalidation_polls,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
