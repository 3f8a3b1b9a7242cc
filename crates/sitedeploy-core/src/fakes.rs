//! In-memory CDN client for tests.
//!
//! Each invalidation reports `InProgress` until it has been polled a set
//! number of times. Caller references are deduplicated the way a real CDN
//! does it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CdnError;
use crate::invalidation::{CdnClient, InvalidationStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvalidation {
    pub id: String,
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub caller_reference: String,
    pub polls: u32,
}

#[derive(Default)]
struct State {
    invalidations: Vec<RecordedInvalidation>,
    by_reference: HashMap<String, String>,
    fail_create: bool,
}

pub struct MemoryCdnClient {
    completes_after: u32,
    state: Mutex<State>,
}

impl Default for MemoryCdnClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCdnClient {
    /// Invalidations complete on their first poll.
    pub fn new() -> Self {
        Self::completing_after(1)
    }

    /// Invalidations report completed on poll number `polls`.
    pub fn completing_after(polls: u32) -> Self {
        Self {
            completes_after: polls,
            state: Mutex::new(State::default()),
        }
    }

    /// Make every create call fail.
    pub fn fail_creates(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    /// Undo [`fail_creates`](Self::fail_creates).
    pub fn allow_creates(&self) {
        self.state.lock().unwrap().fail_create = false;
    }

    pub fn invalidations(&self) -> Vec<RecordedInvalidation> {
        self.state.lock().unwrap().invalidations.clone()
    }

    pub fn total_polls(&self) -> u32 {
        self.state
            .lock()
            .unwrap()
            .invalidations
            .iter()
            .map(|i| i.polls)
            .sum()
    }
}

#[async_trait]
impl CdnClient for MemoryCdnClient {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, CdnError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(CdnError::Rejected {
                status: 400,
                body: "TooManyInvalidationsInProgress".to_string(),
            });
        }
        if let Some(id) = state.by_reference.get(caller_reference) {
            return Ok(id.clone());
        }
        let id = format!("I{}", state.invalidations.len() + 1);
        state.invalidations.push(RecordedInvalidation {
            id: id.clone(),
            distribution_id: distribution_id.to_string(),
            paths: paths.to_vec(),
            caller_reference: caller_reference.to_string(),
            polls: 0,
        });
        state
            .by_reference
            .insert(caller_reference.to_string(), id.clone());
        Ok(id)
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, CdnError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .invalidations
            .iter_mut()
            .find(|i| i.id == invalidation_id && i.distribution_id == distribution_id)
            .ok_or_else(|| CdnError::InvalidationNotFound(invalidation_id.to_string()))?;
        record.polls += 1;
        if record.polls >= self.completes_after {
            Ok(InvalidationStatus::Completed)
        } else {
            Ok(InvalidationStatus::InProgress)
        }
    }
}
