use cadence_core::HealthCode;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{Activity, Schedule};
use crate::ids::occurrence_guid;
use crate::status::{ScheduledActivityStatus, is_visible};

/// One concrete occurrence of a schedule for one participant.
///
/// Timestamps are stored in UTC. The participant's time zone is kept so the
/// occurrence can be rendered in local time by [`ScheduledActivity::view`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledActivity {
    /// Deterministic GUID, see [`crate::ids::occurrence_guid`].
    pub guid: String,
    /// GUID of the plan that produced this occurrence.
    pub schedule_plan_guid: String,
    /// GUID of the schedule that produced this occurrence.
    pub schedule_guid: String,
    /// The participant.
    pub health_code: HealthCode,
    /// The activity offered.
    pub activity: Activity,
    /// The participant's time zone when the occurrence was generated.
    pub time_zone: Tz,
    /// When the activity becomes available.
    pub scheduled_on: DateTime<Utc>,
    /// When the activity expires; absent means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    /// When the participant started the activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<Utc>>,
    /// When the participant finished the activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
    /// When the activity stops being shown; absent means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hides_on: Option<DateTime<Utc>>,
}

impl ScheduledActivity {
    /// Creates a fresh occurrence of `schedule` at `scheduled_on`.
    ///
    /// The occurrence expires after the schedule's expiration and hides when
    /// it expires.
    #[must_use]
    pub fn new(
        plan_guid: &str,
        schedule: &Schedule,
        health_code: HealthCode,
        time_zone: Tz,
        scheduled_on: DateTime<Utc>,
    ) -> Self {
        let expires_on = schedule.expires.map(|expires| scheduled_on + expires);
        Self {
            guid: occurrence_guid(plan_guid, &schedule.guid, scheduled_on),
            schedule_plan_guid: plan_guid.to_string(),
            schedule_guid: schedule.guid.clone(),
            health_code,
            activity: schedule.activity.clone(),
            time_zone,
            scheduled_on,
            expires_on,
            started_on: None,
            finished_on: None,
            hides_on: expires_on,
        }
    }

    /// Returns the status at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> ScheduledActivityStatus {
        ScheduledActivityStatus::derive(self, now)
    }

    /// Returns true if the occurrence is shown to the participant at `now`.
    #[must_use]
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        is_visible(self.status(now), self.hides_on, now)
    }

    /// Returns true if the participant has recorded progress on this occurrence.
    ///
    /// Such occurrences are never deleted by reconciliation.
    #[must_use]
    pub const fn has_progress(&self) -> bool {
        self.started_on.is_some() || self.finished_on.is_some()
    }

    /// Applies the non-empty timestamps of an edit.
    ///
    /// Returns true if the edit set or moved the finish time.
    pub fn apply_edit(&mut self, edit: &ActivityEdit) -> bool {
        let previous_finish = self.finished_on;
        if let Some(started_on) = edit.started_on {
            self.started_on = Some(started_on);
        }
        if let Some(finished_on) = edit.finished_on {
            self.finished_on = Some(finished_on);
        }
        self.hides_on = self.computed_hides_on();
        self.finished_on.is_some() && self.finished_on != previous_finish
    }

    fn computed_hides_on(&self) -> Option<DateTime<Utc>> {
        if let Some(finished_on) = self.finished_on {
            Some(finished_on)
        } else if self.started_on.is_some() {
            None
        } else {
            self.expires_on
        }
    }

    /// Renders the occurrence for the participant at `now`.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>) -> ScheduledActivityView {
        let local = |at: DateTime<Utc>| at.with_timezone(&self.time_zone).fixed_offset();
        ScheduledActivityView {
            guid: self.guid.clone(),
            activity: self.activity.clone(),
            scheduled_on: local(self.scheduled_on),
            expires_on: self.expires_on.map(local),
            started_on: self.started_on.map(local),
            finished_on: self.finished_on.map(local),
            hides_on: self.hides_on.map(local),
            status: self.status(now),
        }
    }
}

/// Participant-entered progress on one scheduled activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEdit {
    /// GUID of the occurrence being edited.
    #[serde(default)]
    pub guid: Option<String>,
    /// When the participant started the activity.
    #[serde(default)]
    pub started_on: Option<DateTime<Utc>>,
    /// When the participant finished the activity.
    #[serde(default)]
    pub finished_on: Option<DateTime<Utc>>,
}

impl ActivityEdit {
    /// Creates an edit that marks an occurrence as started.
    #[must_use]
    pub fn started(guid: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            guid: Some(guid.into()),
            started_on: Some(at),
            finished_on: None,
        }
    }

    /// Creates an edit that marks an occurrence as finished.
    #[must_use]
    pub fn finished(guid: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            guid: Some(guid.into()),
            started_on: None,
            finished_on: Some(at),
        }
    }

    /// Returns true if the edit carries at least one timestamp.
    #[must_use]
    pub const fn has_timestamps(&self) -> bool {
        self.started_on.is_some() || self.finished_on.is_some()
    }
}

/// Client-facing rendering of a [`ScheduledActivity`] with derived status.
///
/// Times are expressed in the participant's time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledActivityView {
    /// Occurrence GUID.
    pub guid: String,
    /// The activity offered.
    pub activity: Activity,
    /// When the activity becomes available.
    pub scheduled_on: DateTime<FixedOffset>,
    /// When the activity expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<FixedOffset>>,
    /// When the participant started the activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<FixedOffset>>,
    /// When the participant finished the activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<FixedOffset>>,
    /// When the activity stops being shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hides_on: Option<DateTime<FixedOffset>>,
    /// Derived status.
    pub status: ScheduledActivityStatus,
}
