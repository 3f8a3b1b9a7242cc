//! Cache invalidation resource.
//!
//! Issues one invalidation per batch of paths and, when asked to, waits for
//! all of them to complete. The wait is bounded twice: by the overall wait
//! budget, which fails the request when exhausted, and by the budget of the
//! current invocation, which suspends it into a [`ResumeToken`] that a later
//! invocation continues with [`InvalidationOrchestrator::resume`].

mod cdn;
pub mod paths;

pub use cdn::{CdnClient, CdnConfig, HttpCdnClient, InvalidationStatus};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::fingerprint::BuildId;
use crate::lifecycle::new_physical_id;
use crate::metrics::METRICS;
use crate::obs::{self, RequestSpan};
use crate::protocol::{lenient_bool, CustomResourceEvent, CustomResourceResponse, RequestType};

fn default_paths() -> Vec<String> {
    vec![paths::DEFAULT_PATH.to_string()]
}

fn default_true() -> bool {
    true
}

/// `ResourceProperties` of the invalidation resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvalidationProperties {
    pub build_id: BuildId,
    #[serde(default)]
    pub distribution_id: String,
    #[serde(default = "default_paths")]
    pub distribution_paths: Vec<String>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub wait_for_invalidation: bool,
}

pub type InvalidationEvent = CustomResourceEvent<InvalidationProperties>;

/// Polling cadence and budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterConfig {
    pub poll_interval: Duration,
    /// Total time allowed for invalidations to complete.
    pub max_wait: Duration,
    /// Time one invocation may spend waiting before it suspends.
    pub invocation_budget: Duration,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            max_wait: Duration::from_secs(600),
            invocation_budget: Duration::from_secs(840),
        }
    }
}

/// Everything needed to continue a wait in a fresh invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeToken {
    pub distribution_id: String,
    /// Invalidations not yet seen completed.
    pub invalidation_ids: Vec<String>,
    /// Every invalidation the request issued, reported on completion.
    #[serde(default)]
    pub issued_ids: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub physical_resource_id: String,
    pub request: InvalidationEvent,
}

/// Result of one invocation.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Final response; send it to the provisioning engine.
    Complete(CustomResourceResponse),
    /// Still waiting; resume later with the token. No response yet.
    Suspended(ResumeToken),
}

enum WaitResult {
    Completed,
    Pending(Vec<String>),
}

/// Tag for one batch. Stable across retries of one request, fresh for
/// every new request.
pub fn caller_reference(build_id: &BuildId, request_id: &str, chunk: usize) -> String {
    format!("{build_id}-{request_id}-{chunk}")
}

pub struct InvalidationOrchestrator {
    client: Arc<dyn CdnClient>,
    config: WaiterConfig,
}

impl InvalidationOrchestrator {
    pub fn new(client: Arc<dyn CdnClient>, config: WaiterConfig) -> Self {
        Self { client, config }
    }

    /// Handle one request.
    pub async fn handle(&self, event: &InvalidationEvent) -> HandlerOutcome {
        let _span = RequestSpan::enter(
            &event.request_id,
            event.request_type.as_str(),
            &event.logical_resource_id,
        );

        let physical_id = match event.request_type {
            RequestType::Create => new_physical_id(),
            _ => match event.require_physical_id() {
                Ok(id) => id.to_string(),
                Err(e) => {
                    return HandlerOutcome::Complete(CustomResourceResponse::failed(
                        event,
                        event.logical_resource_id.clone(),
                        e.to_string(),
                    ))
                }
            },
        };

        let outcome = match self.run(event, &physical_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "invalidation request failed");
                HandlerOutcome::Complete(CustomResourceResponse::failed(
                    event,
                    physical_id,
                    e.to_string(),
                ))
            }
        };
        METRICS.flush();
        outcome
    }

    async fn run(&self, event: &InvalidationEvent, physical_id: &str) -> Result<HandlerOutcome> {
        let props = &event.resource_properties;
        if event.request_type == RequestType::Delete {
            return Ok(HandlerOutcome::Complete(CustomResourceResponse::success(
                event,
                physical_id,
                None,
            )));
        }
        if props.distribution_id.is_empty() {
            info!("no distribution configured, nothing to invalidate");
            return Ok(HandlerOutcome::Complete(CustomResourceResponse::success(
                event,
                physical_id,
                None,
            )));
        }

        let ids = self.issue(event).await?;
        let data = serde_json::json!({ "InvalidationIds": ids });
        if !props.wait_for_invalidation {
            return Ok(HandlerOutcome::Complete(CustomResourceResponse::success(
                event,
                physical_id,
                Some(data),
            )));
        }

        let deadline = Utc::now()
            + chrono::Duration::from_std(self.config.max_wait)
                .map_err(|e| DeployError::Config(e.to_string()))?;
        match self.wait(&props.distribution_id, ids.clone(), deadline).await? {
            WaitResult::Completed => Ok(HandlerOutcome::Complete(
                CustomResourceResponse::success(event, physical_id, Some(data)),
            )),
            WaitResult::Pending(pending) => {
                obs::emit_invalidation_suspended(&props.distribution_id, pending.len());
                Ok(HandlerOutcome::Suspended(ResumeToken {
                    distribution_id: props.distribution_id.clone(),
                    invalidation_ids: pending,
                    issued_ids: ids,
                    deadline,
                    physical_resource_id: physical_id.to_string(),
                    request: event.clone(),
                }))
            }
        }
    }

    async fn issue(&self, event: &InvalidationEvent) -> Result<Vec<String>> {
        let props = &event.resource_properties;
        let request_id = if event.request_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            event.request_id.clone()
        };

        let mut ids = Vec::new();
        for (i, batch) in paths::chunk(&props.distribution_paths).iter().enumerate() {
            let reference = caller_reference(&props.build_id, &request_id, i);
            let id = self
                .client
                .create_invalidation(&props.distribution_id, batch, &reference)
                .await?;
            METRICS.inc_invalidations();
            obs::emit_invalidation_issued(&props.distribution_id, &id, batch.len());
            ids.push(id);
        }
        Ok(ids)
    }

    /// Poll until every invalidation completes, the overall deadline passes
    /// (error), or this invocation's budget runs out (pending).
    async fn wait(
        &self,
        distribution_id: &str,
        mut pending: Vec<String>,
        deadline: DateTime<Utc>,
    ) -> Result<WaitResult> {
        let started = Instant::now();
        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let overall_end = started + remaining;
        let invocation_end = started + self.config.invocation_budget;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut still_pending = Vec::new();
            for id in pending {
                match self.client.invalidation_status(distribution_id, &id).await? {
                    InvalidationStatus::Completed => {}
                    InvalidationStatus::InProgress => still_pending.push(id),
                }
            }
            METRICS.inc_polls();
            obs::emit_invalidation_poll(distribution_id, still_pending.len(), attempt);

            if still_pending.is_empty() {
                return Ok(WaitResult::Completed);
            }
            pending = still_pending;

            let next_poll = Instant::now() + self.config.poll_interval;
            if next_poll > overall_end {
                return Err(DeployError::InvalidationTimeout {
                    invalidation_ids: pending,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            if next_poll > invocation_end {
                return Ok(WaitResult::Pending(pending));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Continue a suspended wait and produce the next outcome.
    pub async fn resume(&self, token: ResumeToken) -> HandlerOutcome {
        let event = &token.request;
        let _span = RequestSpan::enter(
            &event.request_id,
            event.request_type.as_str(),
            &event.logical_resource_id,
        );
        info!(
            distribution_id = %token.distribution_id,
            pending = token.invalidation_ids.len(),
            deadline = %token.deadline,
            "resuming invalidation wait"
        );

        let result = self
            .wait(
                &token.distribution_id,
                token.invalidation_ids.clone(),
                token.deadline,
            )
            .await;
        let outcome = match result {
            Ok(WaitResult::Completed) => HandlerOutcome::Complete(CustomResourceResponse::success(
                event,
                token.physical_resource_id.clone(),
                Some(serde_json::json!({ "InvalidationIds": token.issued_ids })),
            )),
            Ok(WaitResult::Pending(pending)) => {
                obs::emit_invalidation_suspended(&token.distribution_id, pending.len());
                HandlerOutcome::Suspended(ResumeToken {
                    invalidation_ids: pending,
                    ..token.clone()
                })
            }
            Err(e) => {
                warn!(error = %e, "invalidation wait failed");
                HandlerOutcome::Complete(CustomResourceResponse::failed(
                    event,
                    token.physical_resource_id.clone(),
                    e.to_string(),
                ))
            }
        };
        METRICS.flush();
        outcome
    }
}
