//! Structured observability hooks for job and task lifecycle events.
//!
//! Provides a job-scoped span guard ([`JobSpan`]) and one emission function
//! per lifecycle event. Events are emitted at `info!` unless noted.

use tracing::{info, warn};

/// RAII guard that enters a job-scoped tracing span.
///
/// ```ignore
/// let _span = JobSpan::enter("doc_20250101_120000_ab12cd34");
/// // tracing calls on this thread now carry job_id
/// ```
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(job_id: &str) -> Self {
        Self {
            _span: job_span(job_id).entered(),
        }
    }
}

/// Job-scoped span for instrumenting futures; `JobSpan` is not `Send`.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("docgen.job", job_id = %job_id)
}

pub fn emit_job_started(job_id: &str, repo_url: &str, task_count: usize) {
    info!(event = "job.started", job_id = %job_id, repo_url = %repo_url, task_count = task_count);
}

pub fn emit_job_finished(job_id: &str, status: &str, succeeded: usize, failed: usize) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        status = %status,
        succeeded = succeeded,
        failed = failed,
    );
}

/// Job-level failure (warning level).
pub fn emit_job_failed(job_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "job.failed", job_id = %job_id, error = %error);
}

pub fn emit_task_dispatched(task_id: &str, task_type: &str, timeout_ms: u64) {
    info!(event = "task.dispatched", task_id = %task_id, task_type = %task_type, timeout_ms = timeout_ms);
}

pub fn emit_task_finished(task_id: &str, success: bool, duration_ms: u64, error: Option<&str>) {
    info!(
        event = "task.finished",
        task_id = %task_id,
        success = success,
        duration_ms = duration_ms,
        error = error.unwrap_or(""),
    );
}

/// Deadline hit (warning level).
pub fn emit_task_timed_out(task_id: &str, timeout_ms: u64) {
    warn!(event = "task.timed_out", task_id = %task_id, timeout_ms = timeout_ms);
}

/// Agent errored or panicked (warning level).
pub fn emit_task_infrastructure_failure(task_id: &str, detail: &dyn std::fmt::Display) {
    warn!(event = "task.infrastructure_failure", task_id = %task_id, detail = %detail);
}

pub fn emit_late_result_discarded(task_id: &str) {
    info!(event = "task.late_result_discarded", task_id = %task_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_create() {
        let _span = JobSpan::enter("doc_test");
        emit_task_finished("t1", false, 5, Some("timeout"));
    }
}
