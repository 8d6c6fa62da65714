//! Error types for the scheduling domain.

use std::fmt::Write as _;

use crate::store::BatchFailure;

/// The result type used throughout cadence-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while computing or persisting schedules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A schedule plan failed validation.
    #[error("invalid schedule plan {plan_guid}: {}", .messages.join("; "))]
    InvalidConfiguration {
        /// GUID of the offending plan.
        plan_guid: String,
        /// Every problem found in the plan.
        messages: Vec<String>,
    },

    /// A recurring schedule carries a cron expression that cannot be parsed.
    #[error("invalid cron expression '{expression}' in schedule {schedule_guid}: {message}")]
    InvalidCron {
        /// GUID of the schedule.
        schedule_guid: String,
        /// The expression as authored.
        expression: String,
        /// Parser message.
        message: String,
    },

    /// A recurring schedule has a non-positive interval.
    #[error("invalid recurrence interval in schedule {schedule_guid}: {message}")]
    InvalidInterval {
        /// GUID of the schedule.
        schedule_guid: String,
        /// Description of the problem.
        message: String,
    },

    /// A schedule produced more occurrences than the configured bound.
    #[error("schedule {schedule_guid} exceeds {limit} occurrences before the window end")]
    OccurrenceLimitExceeded {
        /// GUID of the schedule.
        schedule_guid: String,
        /// The configured bound.
        limit: usize,
    },

    /// The request context is malformed.
    #[error("invalid schedule context: {message}")]
    InvalidContext {
        /// Description of the problem.
        message: String,
    },

    /// Every plan in the study failed to produce a schedule.
    #[error("all {} schedule plans failed: {}", .failures.len(), summarize_plan_failures(.failures))]
    PlansFailed {
        /// `(plan GUID, error message)` for each failed plan.
        failures: Vec<(String, String)>,
    },

    /// Some items of a batch write were not persisted.
    ///
    /// Items that were written successfully are not rolled back.
    #[error("{operation} failed for {} scheduled activities: {}", .failures.len(), summarize_batch_failures(.failures))]
    BatchFailed {
        /// The batch operation (`save`, `delete`, `update`).
        operation: &'static str,
        /// Each item that was not written and why.
        failures: Vec<BatchFailure>,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from cadence-core.
    #[error("core error: {0}")]
    Core(#[from] cadence_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Core(cadence_core::Error::configuration(message))
    }

    /// Returns true for errors caused by plan authoring mistakes.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::InvalidCron { .. }
                | Self::InvalidInterval { .. }
                | Self::OccurrenceLimitExceeded { .. }
        )
    }
}

fn summarize_batch_failures(failures: &[BatchFailure]) -> String {
    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} ({})", failure.guid, failure.cause);
    }
    out
}

fn summarize_plan_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(plan, message)| format!("{plan}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn batch_failure_lists_every_item() {
        let err = Error::BatchFailed {
            operation: "save",
            failures: vec![
                BatchFailure::new("g1", "throttled"),
                BatchFailure::new("g2", "conditional check failed"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("save failed for 2 scheduled activities"));
        assert!(msg.contains("g1 (throttled)"));
        assert!(msg.contains("g2 (conditional check failed)"));
    }

    #[test]
    fn invalid_configuration_joins_messages() {
        let err = Error::InvalidConfiguration {
            plan_guid: "plan-1".into(),
            messages: vec!["weights sum to 120".into(), "label is blank".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid schedule plan plan-1: weights sum to 120; label is blank"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = Error::storage_with_source("failed to load activities", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn core_errors_convert() {
        let err: Error = cadence_core::Error::configuration("bad").into();
        assert!(err.to_string().starts_with("core error"));
    }
}
