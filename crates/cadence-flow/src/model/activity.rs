use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::finished_event_key;

/// Kind of work an activity asks the participant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    /// A task implemented by the client app.
    Task,
    /// A survey defined on the server.
    Survey,
}

/// Reference to the task or survey an activity resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActivityReference {
    /// A client-side task.
    #[serde(rename_all = "camelCase")]
    Task {
        /// Task identifier known to the client app.
        identifier: String,
    },
    /// A server-side survey, optionally pinned to one published version.
    #[serde(rename_all = "camelCase")]
    Survey {
        /// Survey GUID.
        guid: String,
        /// Published version; absent means the most recently published one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_on: Option<DateTime<Utc>>,
    },
}

/// An activity offered to participants by a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Stable activity GUID, used to name the activity's finished event.
    pub guid: String,
    /// Human-readable label; also the tie-breaker when ordering results.
    pub label: String,
    /// Secondary label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_detail: Option<String>,
    /// What the activity resolves to.
    pub reference: ActivityReference,
}

impl Activity {
    /// Creates a task activity.
    #[must_use]
    pub fn task(
        guid: impl Into<String>,
        label: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            guid: guid.into(),
            label: label.into(),
            label_detail: None,
            reference: ActivityReference::Task {
                identifier: identifier.into(),
            },
        }
    }

    /// Creates a survey activity that follows the most recently published version.
    #[must_use]
    pub fn survey(
        guid: impl Into<String>,
        label: impl Into<String>,
        survey_guid: impl Into<String>,
    ) -> Self {
        Self {
            guid: guid.into(),
            label: label.into(),
            label_detail: None,
            reference: ActivityReference::Survey {
                guid: survey_guid.into(),
                created_on: None,
            },
        }
    }

    /// Sets the secondary label.
    #[must_use]
    pub fn with_label_detail(mut self, detail: impl Into<String>) -> Self {
        self.label_detail = Some(detail.into());
        self
    }

    /// Returns the activity type.
    #[must_use]
    pub const fn activity_type(&self) -> ActivityType {
        match self.reference {
            ActivityReference::Task { .. } => ActivityType::Task,
            ActivityReference::Survey { .. } => ActivityType::Survey,
        }
    }

    /// Returns the identifier of the referenced task or survey.
    #[must_use]
    pub fn reference_id(&self) -> &str {
        match &self.reference {
            ActivityReference::Task { identifier } => identifier,
            ActivityReference::Survey { guid, .. } => guid,
        }
    }

    /// Returns the event name published when this activity is finished.
    ///
    /// Format: `activity:{guid}:finished`
    #[must_use]
    pub fn finished_event_key(&self) -> String {
        finished_event_key(&self.guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_event_uses_activity_guid() {
        let activity = Activity::task("act-1", "Tapping", "tapping-v2");
        assert_eq!(activity.finished_event_key(), "activity:act-1:finished");
        assert_eq!(activity.activity_type(), ActivityType::Task);
        assert_eq!(activity.reference_id(), "tapping-v2");
    }

    #[test]
    fn survey_reference_serializes_with_type_tag() {
        let activity = Activity::survey("act-2", "Daily check-in", "survey-9");
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["reference"]["type"], "survey");
        assert_eq!(json["reference"]["guid"], "survey-9");
        assert!(json["reference"].get("createdOn").is_none());
    }
}
