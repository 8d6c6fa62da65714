//! Observability metrics for schedule computation.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `cadence_occurrences_generated_total` | Counter | - | Occurrences produced by the generator |
//! | `cadence_activities_saved_total` | Counter | - | Activities written by reconciliation and updates |
//! | `cadence_activities_deleted_total` | Counter | `reason` | Activities removed |
//! | `cadence_plan_failures_total` | Counter | `kind` | Plans skipped because of an error |
//! | `cadence_rejected_edits_total` | Counter | `reason` | Participant edits rejected per item |
//! | `cadence_batch_failures_total` | Counter | `operation` | Batch items that could not be written |
//! | `cadence_reconcile_duration_seconds` | Histogram | - | Time to compute and persist one schedule |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cadence_flow::metrics::SchedulerMetrics;
//!
//! let metrics = SchedulerMetrics::new();
//! metrics.record_generated(12);
//! metrics.record_saved(3);
//! ```
//!
//! Metrics go through the `metrics` crate facade; without an installed
//! recorder every call is a no-op.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Occurrences produced by the generator.
    pub const OCCURRENCES_GENERATED_TOTAL: &str = "cadence_occurrences_generated_total";
    /// Counter: Activities persisted.
    pub const ACTIVITIES_SAVED_TOTAL: &str = "cadence_activities_saved_total";
    /// Counter: Activities deleted.
    pub const ACTIVITIES_DELETED_TOTAL: &str = "cadence_activities_deleted_total";
    /// Counter: Plans skipped because of an error.
    pub const PLAN_FAILURES_TOTAL: &str = "cadence_plan_failures_total";
    /// Counter: Participant edits rejected.
    pub const REJECTED_EDITS_TOTAL: &str = "cadence_rejected_edits_total";
    /// Counter: Batch items that could not be written.
    pub const BATCH_FAILURES_TOTAL: &str = "cadence_batch_failures_total";
    /// Histogram: Time to compute and persist one participant's schedule.
    pub const RECONCILE_DURATION_SECONDS: &str = "cadence_reconcile_duration_seconds";
}

/// Label keys used across metrics.
pub mod labels {
    /// Why something was deleted or rejected.
    pub const REASON: &str = "reason";
    /// Error kind (configuration, storage).
    pub const KIND: &str = "kind";
    /// Batch operation (save, delete, update).
    pub const OPERATION: &str = "operation";
}

/// High-level interface for recording scheduler metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records generated occurrences.
    pub fn record_generated(&self, count: usize) {
        counter!(names::OCCURRENCES_GENERATED_TOTAL).increment(as_u64(count));
    }

    /// Records persisted activities.
    pub fn record_saved(&self, count: usize) {
        counter!(names::ACTIVITIES_SAVED_TOTAL).increment(as_u64(count));
    }

    /// Records deleted activities.
    ///
    /// `reason` is `orphaned`, `participant` or `plan`.
    pub fn record_deleted(&self, reason: &'static str, count: usize) {
        counter!(names::ACTIVITIES_DELETED_TOTAL, labels::REASON => reason).increment(as_u64(count));
    }

    /// Records a plan that was skipped.
    pub fn record_plan_failure(&self, kind: &'static str) {
        counter!(names::PLAN_FAILURES_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records a rejected participant edit.
    pub fn record_rejected_edit(&self, reason: &'static str) {
        counter!(names::REJECTED_EDITS_TOTAL, labels::REASON => reason).increment(1);
    }

    /// Records batch items that were not written.
    pub fn record_batch_failures(&self, operation: &'static str, count: usize) {
        counter!(names::BATCH_FAILURES_TOTAL, labels::OPERATION => operation)
            .increment(as_u64(count));
    }

    /// Records how long one schedule request took.
    pub fn observe_reconcile_duration(&self, duration: Duration) {
        histogram!(names::RECONCILE_DURATION_SECONDS).record(duration.as_secs_f64());
    }
}

fn as_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Creates a timing guard for one schedule request.
#[must_use]
pub fn time_reconcile() -> TimingGuard<impl FnOnce(Duration) + Send> {
    TimingGuard::new(|duration| SchedulerMetrics::new().observe_reconcile_duration(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        let metrics = SchedulerMetrics::new();
        metrics.record_generated(3);
        metrics.record_saved(2);
        metrics.record_deleted("orphaned", 1);
        metrics.record_plan_failure("configuration");
        metrics.record_rejected_edit("unknown_guid");
        metrics.record_batch_failures("save", 1);
        metrics.observe_reconcile_duration(Duration::from_millis(5));
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(5)));
    }
}
