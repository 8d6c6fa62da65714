//! Schedule strategies: how a plan picks one schedule per participant.
//!
//! A strategy never fails at evaluation time. A participant who falls outside
//! every group (an A/B gap, no matching criteria) simply gets no schedule from
//! the plan. Authoring mistakes such as weights above 100 are caught earlier by
//! [`crate::validate`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ab_bucket;
use crate::model::{Schedule, ScheduleContext};

/// How a plan selects a schedule for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScheduleStrategy {
    /// The same schedule for every participant.
    Simple {
        /// The schedule.
        schedule: Schedule,
    },
    /// Participants are split into weighted groups by a stable hash.
    AbTest {
        /// Ordered groups; weights sum to at most 100.
        groups: Vec<AbTestGroup>,
    },
    /// The first group whose criteria match the participant wins.
    Criteria {
        /// Ordered groups.
        groups: Vec<CriteriaGroup>,
    },
}

/// One arm of an A/B test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestGroup {
    /// Share of participants assigned to this arm, in percent.
    pub percentage: u8,
    /// The arm's schedule.
    pub schedule: Schedule,
}

impl AbTestGroup {
    /// Creates an A/B arm.
    #[must_use]
    pub const fn new(percentage: u8, schedule: Schedule) -> Self {
        Self {
            percentage,
            schedule,
        }
    }
}

/// A schedule offered to participants matching some criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaGroup {
    /// Who the schedule applies to.
    pub criteria: Criteria,
    /// The schedule.
    pub schedule: Schedule,
}

/// Participant matching rules. Empty criteria match everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    /// Data groups the participant must all belong to.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub all_of_groups: BTreeSet<String>,
    /// Data groups the participant must not belong to.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub none_of_groups: BTreeSet<String>,
    /// Lowest matching app version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version: Option<u32>,
    /// Highest matching app version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_app_version: Option<u32>,
}

impl Criteria {
    /// Returns true if the participant described by `context` matches.
    #[must_use]
    pub fn matches(&self, context: &ScheduleContext) -> bool {
        self.all_of_groups.is_subset(&context.data_groups)
            && self.none_of_groups.is_disjoint(&context.data_groups)
            && context
                .client_info
                .is_targeted_app_version(self.min_app_version, self.max_app_version)
    }
}

impl ScheduleStrategy {
    /// Selects the schedule that applies to the participant, if any.
    #[must_use]
    pub fn schedule_for(&self, plan_guid: &str, context: &ScheduleContext) -> Option<&Schedule> {
        match self {
            Self::Simple { schedule } => Some(schedule),
            Self::AbTest { groups } => {
                let bucket = ab_bucket(context.health_code.as_str(), plan_guid);
                select_ab_group(groups, bucket).map(|group| &group.schedule)
            }
            Self::Criteria { groups } => groups
                .iter()
                .find(|group| group.criteria.matches(context))
                .map(|group| &group.schedule),
        }
    }

    /// Returns every schedule the strategy can select, in declaration order.
    #[must_use]
    pub fn schedules(&self) -> Vec<&Schedule> {
        match self {
            Self::Simple { schedule } => vec![schedule],
            Self::AbTest { groups } => groups.iter().map(|group| &group.schedule).collect(),
            Self::Criteria { groups } => groups.iter().map(|group| &group.schedule).collect(),
        }
    }
}

/// Picks the A/B arm for `bucket`.
///
/// Walks the arms in order, accumulating weights; the first arm whose
/// cumulative weight exceeds the bucket wins. Returns `None` when the weights
/// sum to no more than the bucket.
#[must_use]
pub fn select_ab_group(groups: &[AbTestGroup], bucket: u8) -> Option<&AbTestGroup> {
    let mut cumulative = 0_u32;
    groups.iter().find(|group| {
        cumulative += u32::from(group.percentage);
        cumulative > u32::from(bucket)
    })
}
