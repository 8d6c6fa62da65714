//! Status derivation for scheduled activities.
//!
//! Status is never stored. It is computed from an occurrence's timestamps and
//! the evaluation instant, with this precedence:
//!
//! 1. `finished_on` set: [`ScheduledActivityStatus::Finished`]
//! 2. `started_on` set: [`ScheduledActivityStatus::Started`]
//! 3. `now` after `expires_on`: [`ScheduledActivityStatus::Expired`]
//! 4. `now` at or after `scheduled_on`: [`ScheduledActivityStatus::Available`]
//! 5. otherwise [`ScheduledActivityStatus::Scheduled`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ScheduledActivity;

/// Lifecycle status of a scheduled activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledActivityStatus {
    /// Scheduled for the future.
    Scheduled,
    /// Due and not yet started.
    Available,
    /// Started but not finished.
    Started,
    /// Finished.
    Finished,
    /// Passed its expiration without being started.
    Expired,
    /// Deleted by the study. Accepted from other systems but never derived.
    Deleted,
}

impl ScheduledActivityStatus {
    /// Derives the status of an occurrence at `now`.
    #[must_use]
    pub fn derive(activity: &ScheduledActivity, now: DateTime<Utc>) -> Self {
        Self::from_timestamps(
            activity.scheduled_on,
            activity.expires_on,
            activity.started_on,
            activity.finished_on,
            now,
        )
    }

    /// Derives a status from raw timestamps.
    #[must_use]
    pub fn from_timestamps(
        scheduled_on: DateTime<Utc>,
        expires_on: Option<DateTime<Utc>>,
        started_on: Option<DateTime<Utc>>,
        finished_on: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if finished_on.is_some() {
            Self::Finished
        } else if started_on.is_some() {
            Self::Started
        } else if expires_on.is_some_and(|expires| now > expires) {
            Self::Expired
        } else if now >= scheduled_on {
            Self::Available
        } else {
            Self::Scheduled
        }
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Expired | Self::Deleted)
    }
}

impl std::fmt::Display for ScheduledActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::Available => "available",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Returns true if an occurrence should be shown to the participant at `now`.
///
/// Hidden occurrences stay in storage until an explicit cleanup removes them.
#[must_use]
pub fn is_visible(
    status: ScheduledActivityStatus,
    hides_on: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status != ScheduledActivityStatus::Deleted && hides_on.is_none_or(|hides| hides > now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    #[test]
    fn finished_takes_precedence() {
        let status = ScheduledActivityStatus::from_timestamps(
            t(0),
            Some(t(1)),
            Some(t(0)),
            Some(t(0)),
            t(5),
        );
        assert_eq!(status, ScheduledActivityStatus::Finished);
    }

    #[test]
    fn started_beats_expired() {
        let status =
            ScheduledActivityStatus::from_timestamps(t(0), Some(t(1)), Some(t(0)), None, t(5));
        assert_eq!(status, ScheduledActivityStatus::Started);
    }

    #[test]
    fn expiry_is_exclusive() {
        let status = |now| ScheduledActivityStatus::from_timestamps(t(0), Some(t(3)), None, None, now);
        assert_eq!(status(t(3)), ScheduledActivityStatus::Available);
        assert_eq!(
            status(t(3) + Duration::seconds(1)),
            ScheduledActivityStatus::Expired
        );
    }

    #[test]
    fn available_from_scheduled_time() {
        let status = |now| ScheduledActivityStatus::from_timestamps(t(2), None, None, None, now);
        assert_eq!(
            status(t(2) - Duration::seconds(1)),
            ScheduledActivityStatus::Scheduled
        );
        assert_eq!(status(t(2)), ScheduledActivityStatus::Available);
        assert_eq!(status(t(400)), ScheduledActivityStatus::Available);
    }

    #[test]
    fn visibility_respects_hides_on() {
        let available = ScheduledActivityStatus::Available;
        assert!(is_visible(available, None, t(10)));
        assert!(is_visible(available, Some(t(11)), t(10)));
        assert!(!is_visible(available, Some(t(10)), t(10)));
        assert!(!is_visible(ScheduledActivityStatus::Deleted, None, t(10)));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ScheduledActivityStatus::Available).unwrap();
        assert_eq!(json, "\"available\"");
        assert_eq!(ScheduledActivityStatus::Expired.to_string(), "expired");
    }
}
