//! Global atomic counters for docgen scheduling.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a job finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    tasks_dispatched: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_timed_out: AtomicU64,
    late_results_discarded: AtomicU64,
    jobs_finished: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_dispatched: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_timed_out: AtomicU64::new(0),
            late_results_discarded: AtomicU64::new(0),
            jobs_finished: AtomicU64::new(0),
        }
    }

    pub fn inc_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_dispatched", "counter incremented");
    }

    /// Count a settled task by outcome. Timeouts count as failures too.
    pub fn record_outcome(&self, success: bool, timed_out: bool) {
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        if timed_out {
            self.tasks_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "tasks_settled", success, timed_out, "counter incremented");
    }

    pub fn inc_late_discarded(&self) {
        self.late_results_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "late_results_discarded", "counter incremented");
    }

    pub fn inc_jobs_finished(&self) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_finished", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_dispatched = self.tasks_dispatched(),
            tasks_succeeded = self.tasks_succeeded(),
            tasks_failed = self.tasks_failed(),
            tasks_timed_out = self.tasks_timed_out(),
            late_results_discarded = self.late_results_discarded(),
            jobs_finished = self.jobs_finished(),
        );
    }

    pub fn tasks_dispatched(&self) -> u64 {
        self.tasks_dispatched.load(Ordering::Relaxed)
    }

    pub fn tasks_succeeded(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn tasks_timed_out(&self) -> u64 {
        self.tasks_timed_out.load(Ordering::Relaxed)
    }

    pub fn late_results_discarded(&self) -> u64 {
        self.late_results_discarded.load(Ordering::Relaxed)
    }

    pub fn jobs_finished(&self) -> u64 {
        self.jobs_finished.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.tasks_dispatched.store(0, Ordering::Relaxed);
        self.tasks_succeeded.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.tasks_timed_out.store(0, Ordering::Relaxed);
        self.late_results_discarded.store(0, Ordering::Relaxed);
        self.jobs_finished.store(0, Ordering::Relaxed);
    }
}
