//! Collaborators the scheduling service depends on.
//!
//! The service never talks to a database directly. Participant events,
//! persisted activities, study plans and consent records are reached through
//! the async traits in this module.
//!
//! ## Design Principles
//!
//! - **Upserts**: saving an activity that already exists replaces it, so
//!   concurrent runs that generate the same occurrence converge
//! - **Per-item batch results**: batch writes report which items failed rather
//!   than failing the whole batch; nothing is rolled back
//! - **Testability**: in-memory implementations live in [`memory`]

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cadence_core::{ClientInfo, HealthCode, StudyId};

use crate::error::Result;
pub use crate::model::ActivityWindow;
use crate::model::{SchedulePlan, ScheduledActivity};

/// One item of a batch write that was not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// GUID of the activity that failed.
    pub guid: String,
    /// Why it failed.
    pub cause: String,
}

impl BatchFailure {
    /// Creates a batch failure.
    #[must_use]
    pub fn new(guid: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            cause: cause.into(),
        }
    }
}

/// Named event timestamps per participant.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns every recorded event for the participant.
    async fn get_events(&self, health_code: &HealthCode)
    -> Result<HashMap<String, DateTime<Utc>>>;

    /// Records an event, replacing any earlier timestamp with the same name.
    async fn publish_event(
        &self,
        health_code: &HealthCode,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Persisted scheduled activities.
///
/// Activities are keyed by `(health_code, guid)`.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Returns the participant's activities scheduled inside `window`.
    async fn get_activities(
        &self,
        health_code: &HealthCode,
        window: ActivityWindow,
    ) -> Result<Vec<ScheduledActivity>>;

    /// Returns one activity, or `None` if it is not persisted.
    async fn get_activity(
        &self,
        health_code: &HealthCode,
        guid: &str,
    ) -> Result<Option<ScheduledActivity>>;

    /// Upserts activities, returning the items that could not be written.
    async fn save_activities(&self, activities: &[ScheduledActivity])
    -> Result<Vec<BatchFailure>>;

    /// Deletes activities, returning the items that could not be deleted.
    async fn delete_activities(
        &self,
        activities: &[ScheduledActivity],
    ) -> Result<Vec<BatchFailure>>;

    /// Deletes every activity of a participant. Returns how many were removed.
    async fn delete_activities_for_participant(&self, health_code: &HealthCode) -> Result<usize>;

    /// Deletes every activity generated by a plan, for all participants.
    /// Returns how many were removed.
    async fn delete_activities_for_plan(&self, plan_guid: &str) -> Result<usize>;
}

/// Source of a study's schedule plans.
#[async_trait]
pub trait PlanSource: Send + Sync {
    /// Returns the study's plans that target the calling client's app version.
    async fn get_plans(
        &self,
        study_id: &StudyId,
        client_info: &ClientInfo,
    ) -> Result<Vec<SchedulePlan>>;
}

/// Source of consent records.
#[async_trait]
pub trait ConsentSource: Send + Sync {
    /// Returns when the participant first signed consent to the study, if ever.
    async fn earliest_consent_signed_on(
        &self,
        health_code: &HealthCode,
        study_id: &StudyId,
    ) -> Result<Option<DateTime<Utc>>>;
}
