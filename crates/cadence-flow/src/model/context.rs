use std::collections::{BTreeSet, HashMap};

use cadence_core::{ClientInfo, HealthCode, StudyId};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Event name recorded when a participant enrolls in a study.
pub const ENROLLMENT_EVENT: &str = "enrollment";

/// Everything needed to compute one participant's schedule for one request.
///
/// Built by the service from the caller's request and the participant's
/// recorded events; the scheduler itself never reads storage.
#[derive(Debug, Clone)]
pub struct ScheduleContext {
    /// The participant.
    pub health_code: HealthCode,
    /// The study the participant belongs to.
    pub study_id: StudyId,
    /// The calling app, used for app-version targeting.
    pub client_info: ClientInfo,
    /// The participant's time zone; cron triggers are evaluated in it.
    pub time_zone: Tz,
    /// The instant the request is evaluated at.
    pub now: DateTime<Utc>,
    /// Earliest occurrence time of interest; absent means unbounded.
    pub starts_on: Option<DateTime<Utc>>,
    /// Latest occurrence time of interest, inclusive.
    pub ends_on: DateTime<Utc>,
    /// Data groups the participant is assigned to.
    pub data_groups: BTreeSet<String>,
    /// Named event timestamps that schedules anchor on.
    pub events: HashMap<String, DateTime<Utc>>,
}

impl ScheduleContext {
    /// Creates a context for an unknown client in UTC with no events.
    #[must_use]
    pub fn new(
        health_code: HealthCode,
        study_id: StudyId,
        now: DateTime<Utc>,
        ends_on: DateTime<Utc>,
    ) -> Self {
        Self {
            health_code,
            study_id,
            client_info: ClientInfo::unknown(),
            time_zone: Tz::UTC,
            now,
            starts_on: None,
            ends_on,
            data_groups: BTreeSet::new(),
            events: HashMap::new(),
        }
    }

    /// Sets the calling client.
    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    /// Sets the participant's time zone.
    #[must_use]
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Sets the start of the window.
    #[must_use]
    pub fn with_starts_on(mut self, starts_on: Option<DateTime<Utc>>) -> Self {
        self.starts_on = starts_on;
        self
    }

    /// Sets the participant's data groups.
    #[must_use]
    pub fn with_data_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the recorded events.
    #[must_use]
    pub fn with_events(mut self, events: HashMap<String, DateTime<Utc>>) -> Self {
        self.events = events;
        self
    }

    /// Records a single event.
    #[must_use]
    pub fn with_event(mut self, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.events.insert(name.into(), at);
        self
    }

    /// Returns the requested window.
    #[must_use]
    pub const fn window(&self) -> ActivityWindow {
        ActivityWindow {
            starts_on: self.starts_on,
            ends_on: self.ends_on,
        }
    }

    /// Returns the participant's enrollment timestamp, if known.
    #[must_use]
    pub fn enrollment(&self) -> Option<DateTime<Utc>> {
        self.events.get(ENROLLMENT_EVENT).copied()
    }
}

/// Range of scheduled times a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    /// Inclusive lower bound; absent means unbounded.
    pub starts_on: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub ends_on: DateTime<Utc>,
}

impl ActivityWindow {
    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_on.is_none_or(|start| at >= start) && at <= self.ends_on
    }
}
