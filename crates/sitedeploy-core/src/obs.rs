//! Structured observability hooks for deployment lifecycle events.
//!
//! Events are emitted at `info!` (failures at `warn!`) with an `event` field
//! naming the lifecycle step, so log pipelines can filter on it.

use tracing::{info, warn};

/// RAII guard that tags every log line of one custom-resource invocation.
///
/// # Example
///
/// ```ignore
/// let _span = RequestSpan::enter("req-1", "Update", "SiteDeployment");
/// ```
pub struct RequestSpan {
    _span: tracing::span::EnteredSpan,
}

impl RequestSpan {
    pub fn enter(request_id: &str, request_type: &str, logical_id: &str) -> Self {
        let span = tracing::info_span!(
            "sitedeploy.request",
            request_id = %request_id,
            request_type = %request_type,
            logical_id = %logical_id,
        );
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_deploy_started(request_type: &str, archives: usize, purge: bool) {
    info!(
        event = "deploy.started",
        request_type = %request_type,
        archives = archives,
        purge = purge,
    );
}

pub fn emit_deploy_finished(request_type: &str, success: bool, duration_ms: u64) {
    info!(
        event = "deploy.finished",
        request_type = %request_type,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_archive_uploaded(source: &str, files: usize, bytes: u64) {
    info!(event = "upload.archive", source = %source, files = files, bytes = bytes);
}

/// Stale-object deletion failed; the deployment continues.
pub fn emit_purge_failed(key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "purge.failed", key = %key, error = %error);
}

/// Teardown could not delete an object; the teardown continues.
pub fn emit_teardown_failed(key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "teardown.failed", key = %key, error = %error);
}

pub fn emit_invalidation_issued(distribution_id: &str, invalidation_id: &str, paths: usize) {
    info!(
        event = "invalidation.issued",
        distribution_id = %distribution_id,
        invalidation_id = %invalidation_id,
        paths = paths,
    );
}

pub fn emit_invalidation_poll(distribution_id: &str, pending: usize, attempt: u32) {
    info!(
        event = "invalidation.poll",
        distribution_id = %distribution_id,
        pending = pending,
        attempt = attempt,
    );
}

pub fn emit_invalidation_suspended(distribution_id: &str, pending: usize) {
    warn!(
        event = "invalidation.suspended",
        distribution_id = %distribution_id,
        pending = pending,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_span_enters_and_drops() {
        let _span = RequestSpan::enter("req-1", "Create", "SiteDeployment");
        emit_deploy_started("Create", 2, true);
    }
}
