use cadence_core::{ClientInfo, StudyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::ScheduleStrategy;

/// A study-level scheduling policy.
///
/// Each plan owns exactly one strategy that picks the [`crate::model::Schedule`]
/// applying to a given participant. Plans may be restricted to a range of app
/// versions; participants on other versions get nothing from the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlan {
    /// Plan GUID; part of every generated occurrence's identity.
    pub guid: String,
    /// Owning study.
    pub study_id: StudyId,
    /// Human-readable label.
    pub label: String,
    /// Optimistic-locking version maintained by the plan store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Last modification time.
    pub modified_on: DateTime<Utc>,
    /// Lowest app version the plan applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<u32>,
    /// Highest app version the plan applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_app_version: Option<u32>,
    /// How a schedule is chosen for a participant.
    pub strategy: ScheduleStrategy,
}

impl SchedulePlan {
    /// Creates an unversioned plan with no app-version restriction.
    #[must_use]
    pub fn new(
        guid: impl Into<String>,
        study_id: StudyId,
        label: impl Into<String>,
        modified_on: DateTime<Utc>,
        strategy: ScheduleStrategy,
    ) -> Self {
        Self {
            guid: guid.into(),
            study_id,
            label: label.into(),
            version: None,
            modified_on,
            min_app_version: None,
            max_app_version: None,
            strategy,
        }
    }

    /// Restricts the plan to an app-version range.
    #[must_use]
    pub fn with_app_versions(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_app_version = min;
        self.max_app_version = max;
        self
    }

    /// Returns true if the plan applies to the calling client.
    #[must_use]
    pub fn is_targeted(&self, client: &ClientInfo) -> bool {
        client.is_targeted_app_version(self.min_app_version, self.max_app_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Schedule, Trigger};
    use chrono::Duration;

    fn plan() -> SchedulePlan {
        let schedule = Schedule::new(
            "sched-1",
            "Once",
            Trigger::Once {
                delay: Duration::zero(),
            },
            Activity::task("act-1", "Tapping", "tapping"),
        );
        SchedulePlan::new(
            "plan-1",
            StudyId::new("asthma").unwrap(),
            "Plan",
            Utc::now(),
            ScheduleStrategy::Simple { schedule },
        )
    }

    #[test]
    fn app_version_range_filters_clients() {
        let plan = plan().with_app_versions(Some(10), Some(20));

        let old = ClientInfo::parse("Asthma/9 BridgeSDK/4");
        let current = ClientInfo::parse("Asthma/15 BridgeSDK/4");
        let new = ClientInfo::parse("Asthma/21 BridgeSDK/4");

        assert!(!plan.is_targeted(&old));
        assert!(plan.is_targeted(&current));
        assert!(!plan.is_targeted(&new));
        assert!(plan.is_targeted(&ClientInfo::unknown()));
    }
}
