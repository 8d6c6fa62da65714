use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Activity;

/// When a schedule fires, relative to its anchoring event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Trigger {
    /// Fires once, `delay` after the anchor.
    Once {
        /// Offset from the anchor; zero fires at the anchor itself.
        #[serde(default = "zero", with = "super::serde_secs")]
        delay: Duration,
    },
    /// Fires every `interval`, starting `delay` after the anchor.
    Interval {
        /// Offset of the first firing from the anchor.
        #[serde(default = "zero", with = "super::serde_secs")]
        delay: Duration,
        /// Time between firings; must be positive.
        #[serde(with = "super::serde_secs")]
        interval: Duration,
    },
    /// Fires on a cron expression evaluated in the participant's time zone,
    /// starting at or after the anchor.
    ///
    /// Expressions use the six or seven field form with seconds first, e.g.
    /// `0 0 9 * * Mon` for every Monday at 09:00.
    Cron {
        /// The cron expression.
        expression: String,
    },
}

fn zero() -> Duration {
    Duration::zero()
}

impl Trigger {
    /// Returns true for triggers that can fire more than once.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        !matches!(self, Self::Once { .. })
    }
}

/// A trigger + activity + expiration template from which occurrences are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Schedule GUID; part of every generated occurrence's identity.
    pub guid: String,
    /// Human-readable label.
    pub label: String,
    /// When the schedule fires.
    pub trigger: Trigger,
    /// The activity each occurrence offers.
    pub activity: Activity,
    /// How long an occurrence stays available; absent means it never expires.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "super::serde_secs::option")]
    pub expires: Option<Duration>,
    /// Anchoring event name, or a comma-separated list of names where the
    /// first one present wins. Absent means the configured default event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Occurrences scheduled before this instant are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<DateTime<Utc>>,
    /// Occurrences scheduled after this instant are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Creates a schedule that never expires and is anchored on the default event.
    #[must_use]
    pub fn new(
        guid: impl Into<String>,
        label: impl Into<String>,
        trigger: Trigger,
        activity: Activity,
    ) -> Self {
        Self {
            guid: guid.into(),
            label: label.into(),
            trigger,
            activity,
            expires: None,
            event_id: None,
            starts_on: None,
            ends_on: None,
        }
    }

    /// Sets how long each occurrence stays available.
    #[must_use]
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Sets the anchoring event name(s).
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Limits occurrences to the `[starts_on, ends_on]` range.
    #[must_use]
    pub fn with_bounds(
        mut self,
        starts_on: Option<DateTime<Utc>>,
        ends_on: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_on = starts_on;
        self.ends_on = ends_on;
        self
    }

    /// Resolves the timestamp this schedule is anchored on.
    ///
    /// Returns `None` when none of the named events has happened yet, in which
    /// case the schedule contributes no occurrences.
    #[must_use]
    pub fn anchor(
        &self,
        events: &HashMap<String, DateTime<Utc>>,
        default_event: &str,
    ) -> Option<DateTime<Utc>> {
        self.event_id
            .as_deref()
            .unwrap_or(default_event)
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .find_map(|name| events.get(name).copied())
    }
}
