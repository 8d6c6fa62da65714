//! In-memory collaborator implementations for testing.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process coordination
//! - **No persistence**: All state is lost when the process exits
//!
//! [`InMemoryActivityStore`] can be told to fail writes for chosen GUIDs, which
//! is how partial batch failures are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cadence_core::{ClientInfo, HealthCode, StudyId};

use super::{ActivityStore, ActivityWindow, BatchFailure, ConsentSource, EventStore, PlanSource};
use crate::error::{Error, Result};
use crate::model::{SchedulePlan, ScheduledActivity};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

type ActivityKey = (HealthCode, String);

/// In-memory [`EventStore`].
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<HealthCode, HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryEventStore {
    /// Creates an empty event store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_events(
        &self,
        health_code: &HealthCode,
    ) -> Result<HashMap<String, DateTime<Utc>>> {
        let events = self.events.read().map_err(poison_err)?;
        Ok(events.get(health_code).cloned().unwrap_or_default())
    }

    async fn publish_event(
        &self,
        health_code: &HealthCode,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut events = self.events.write().map_err(poison_err)?;
        events
            .entry(health_code.clone())
            .or_default()
            .insert(name.to_string(), at);
        Ok(())
    }
}

/// In-memory [`ActivityStore`] with write-failure injection.
#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    activities: RwLock<HashMap<ActivityKey, ScheduledActivity>>,
    failing_saves: RwLock<HashSet<String>>,
    failing_deletes: RwLock<HashSet<String>>,
    saved: AtomicUsize,
    deleted: AtomicUsize,
}

impl InMemoryActivityStore {
    /// Creates an empty activity store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future save of `guid` fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_saves_for(&self, guid: impl Into<String>) -> Result<()> {
        self.failing_saves
            .write()
            .map_err(poison_err)?
            .insert(guid.into());
        Ok(())
    }

    /// Makes every future delete of `guid` fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_deletes_for(&self, guid: impl Into<String>) -> Result<()> {
        self.failing_deletes
            .write()
            .map_err(poison_err)?
            .insert(guid.into());
        Ok(())
    }

    /// Returns the total number of items written by successful saves.
    #[must_use]
    pub fn saved_count(&self) -> usize {
        self.saved.load(Ordering::Relaxed)
    }

    /// Returns the total number of items removed by successful batch deletes.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Returns every stored activity of a participant, in scheduled order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn all_for(&self, health_code: &HealthCode) -> Result<Vec<ScheduledActivity>> {
        let mut out: Vec<ScheduledActivity> = {
            let activities = self.activities.read().map_err(poison_err)?;
            activities
                .iter()
                .filter(|((hc, _), _)| hc == health_code)
                .map(|(_, activity)| activity.clone())
                .collect()
        };
        out.sort_by(|a, b| a.scheduled_on.cmp(&b.scheduled_on).then_with(|| a.guid.cmp(&b.guid)));
        Ok(out)
    }

    /// Stores activities directly, bypassing failure injection and counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert(&self, activities: impl IntoIterator<Item = ScheduledActivity>) -> Result<()> {
        let mut stored = self.activities.write().map_err(poison_err)?;
        for activity in activities {
            stored.insert(key(&activity), activity);
        }
        Ok(())
    }
}

fn key(activity: &ScheduledActivity) -> ActivityKey {
    (activity.health_code.clone(), activity.guid.clone())
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn get_activities(
        &self,
        health_code: &HealthCode,
        window: ActivityWindow,
    ) -> Result<Vec<ScheduledActivity>> {
        let activities = self.activities.read().map_err(poison_err)?;
        Ok(activities
            .iter()
            .filter(|((hc, _), activity)| hc == health_code && window.contains(activity.scheduled_on))
            .map(|(_, activity)| activity.clone())
            .collect())
    }

    async fn get_activity(
        &self,
        health_code: &HealthCode,
        guid: &str,
    ) -> Result<Option<ScheduledActivity>> {
        let activities = self.activities.read().map_err(poison_err)?;
        Ok(activities
            .get(&(health_code.clone(), guid.to_string()))
            .cloned())
    }

    async fn save_activities(
        &self,
        activities: &[ScheduledActivity],
    ) -> Result<Vec<BatchFailure>> {
        let failing = self.failing_saves.read().map_err(poison_err)?.clone();
        let mut stored = self.activities.write().map_err(poison_err)?;
        let mut failures = Vec::new();
        for activity in activities {
            if failing.contains(&activity.guid) {
                failures.push(BatchFailure::new(&activity.guid, "injected save failure"));
                continue;
            }
            stored.insert(key(activity), activity.clone());
            self.saved.fetch_add(1, Ordering::Relaxed);
        }
        Ok(failures)
    }

    async fn delete_activities(
        &self,
        activities: &[ScheduledActivity],
    ) -> Result<Vec<BatchFailure>> {
        let failing = self.failing_deletes.read().map_err(poison_err)?.clone();
        let mut stored = self.activities.write().map_err(poison_err)?;
        let mut failures = Vec::new();
        for activity in activities {
            if failing.contains(&activity.guid) {
                failures.push(BatchFailure::new(&activity.guid, "injected delete failure"));
                continue;
            }
            if stored.remove(&key(activity)).is_some() {
                self.deleted.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(failures)
    }

    async fn delete_activities_for_participant(&self, health_code: &HealthCode) -> Result<usize> {
        let mut stored = self.activities.write().map_err(poison_err)?;
        let before = stored.len();
        stored.retain(|(hc, _), _| hc != health_code);
        Ok(before - stored.len())
    }

    async fn delete_activities_for_plan(&self, plan_guid: &str) -> Result<usize> {
        let mut stored = self.activities.write().map_err(poison_err)?;
        let before = stored.len();
        stored.retain(|_, activity| activity.schedule_plan_guid != plan_guid);
        Ok(before - stored.len())
    }
}

/// In-memory [`PlanSource`].
#[derive(Debug, Default)]
pub struct InMemoryPlanSource {
    plans: RwLock<HashMap<StudyId, Vec<SchedulePlan>>>,
}

impl InMemoryPlanSource {
    /// Creates an empty plan source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plan, replacing any plan of the same study with the same GUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn add_plan(&self, plan: SchedulePlan) -> Result<()> {
        let mut plans = self.plans.write().map_err(poison_err)?;
        let study = plans.entry(plan.study_id.clone()).or_default();
        study.retain(|existing| existing.guid != plan.guid);
        study.push(plan);
        Ok(())
    }
}

#[async_trait]
impl PlanSource for InMemoryPlanSource {
    async fn get_plans(
        &self,
        study_id: &StudyId,
        client_info: &ClientInfo,
    ) -> Result<Vec<SchedulePlan>> {
        let plans = self.plans.read().map_err(poison_err)?;
        Ok(plans
            .get(study_id)
            .into_iter()
            .flatten()
            .filter(|plan| plan.is_targeted(client_info))
            .cloned()
            .collect())
    }
}

/// In-memory [`ConsentSource`].
#[derive(Debug, Default)]
pub struct InMemoryConsentSource {
    signed_on: RwLock<HashMap<(HealthCode, StudyId), DateTime<Utc>>>,
}

impl InMemoryConsentSource {
    /// Creates an empty consent source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a consent signature; the earliest signature is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn record_consent(
        &self,
        health_code: &HealthCode,
        study_id: &StudyId,
        signed_on: DateTime<Utc>,
    ) -> Result<()> {
        let mut consents = self.signed_on.write().map_err(poison_err)?;
        consents
            .entry((health_code.clone(), study_id.clone()))
            .and_modify(|earliest| *earliest = (*earliest).min(signed_on))
            .or_insert(signed_on);
        Ok(())
    }
}

#[async_trait]
impl ConsentSource for InMemoryConsentSource {
    async fn earliest_consent_signed_on(
        &self,
        health_code: &HealthCode,
        study_id: &StudyId,
    ) -> Result<Option<DateTime<Utc>>> {
        let consents = self.signed_on.read().map_err(poison_err)?;
        Ok(consents
            .get(&(health_code.clone(), study_id.clone()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Schedule, Trigger};
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;

    fn hc(code: &str) -> HealthCode {
        HealthCode::new(code).unwrap()
    }

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn activity(health_code: &str, plan: &str, day: i64) -> ScheduledActivity {
        let schedule = Schedule::new(
            "sched-1",
            "Daily",
            Trigger::Once {
                delay: Duration::zero(),
            },
            Activity::task("act-1", "Tapping", "tapping"),
        );
        ScheduledActivity::new(plan, &schedule, hc(health_code), Tz::UTC, at(day))
    }

    #[tokio::test]
    async fn activities_are_scoped_by_participant_and_window() -> Result<()> {
        let store = InMemoryActivityStore::new();
        let failures = store
            .save_activities(&[
                activity("hc-1", "plan-1", 0),
                activity("hc-1", "plan-1", 5),
                activity("hc-2", "plan-1", 0),
            ])
            .await?;
        assert!(failures.is_empty());
        assert_eq!(store.saved_count(), 3);

        let window = ActivityWindow {
            starts_on: Some(at(-1)),
            ends_on: at(2),
        };
        let found = store.get_activities(&hc("hc-1"), window).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scheduled_on, at(0));

        // Same GUID, different participant.
        let mine = activity("hc-1", "plan-1", 0);
        assert!(store.get_activity(&hc("hc-2"), &mine.guid).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_are_reported_per_item() -> Result<()> {
        let store = InMemoryActivityStore::new();
        let ok = activity("hc-1", "plan-1", 0);
        let bad = activity("hc-1", "plan-1", 1);
        store.fail_saves_for(bad.guid.clone())?;

        let failures = store.save_activities(&[ok.clone(), bad.clone()]).await?;
        assert_eq!(failures, vec![BatchFailure::new(&bad.guid, "injected save failure")]);
        assert!(store.get_activity(&hc("hc-1"), &ok.guid).await?.is_some());
        assert!(store.get_activity(&hc("hc-1"), &bad.guid).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn bulk_deletes() -> Result<()> {
        let store = InMemoryActivityStore::new();
        store.insert([
            activity("hc-1", "plan-1", 0),
            activity("hc-1", "plan-2", 0),
            activity("hc-2", "plan-1", 0),
        ])?;

        assert_eq!(store.delete_activities_for_plan("plan-1").await?, 2);
        assert_eq!(store.delete_activities_for_participant(&hc("hc-1")).await?, 1);
        assert!(store.all_for(&hc("hc-1"))?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn plans_are_filtered_by_app_version() -> Result<()> {
        let source = InMemoryPlanSource::new();
        let study = StudyId::new("asthma")?;
        let schedule = Schedule::new(
            "sched-1",
            "Once",
            Trigger::Once {
                delay: Duration::zero(),
            },
            Activity::task("act-1", "Tapping", "tapping"),
        );
        source.add_plan(
            SchedulePlan::new(
                "plan-new",
                study.clone(),
                "New app only",
                at(0),
                crate::strategy::ScheduleStrategy::Simple { schedule },
            )
            .with_app_versions(Some(20), None),
        )?;

        let old = ClientInfo::parse("Asthma/10 BridgeSDK/4");
        let new = ClientInfo::parse("Asthma/25 BridgeSDK/4");
        assert!(source.get_plans(&study, &old).await?.is_empty());
        assert_eq!(source.get_plans(&study, &new).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn earliest_consent_wins() -> Result<()> {
        let source = InMemoryConsentSource::new();
        let study = StudyId::new("asthma")?;
        source.record_consent(&hc("hc-1"), &study, at(3))?;
        source.record_consent(&hc("hc-1"), &study, at(1))?;
        source.record_consent(&hc("hc-1"), &study, at(2))?;
        assert_eq!(
            source.earliest_consent_signed_on(&hc("hc-1"), &study).await?,
            Some(at(1))
        );
        assert_eq!(
            source.earliest_consent_signed_on(&hc("hc-2"), &study).await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn events_upsert() -> Result<()> {
        let store = InMemoryEventStore::new();
        store.publish_event(&hc("hc-1"), "enrollment", at(0)).await?;
        store.publish_event(&hc("hc-1"), "enrollment", at(1)).await?;
        let events = store.get_events(&hc("hc-1")).await?;
        assert_eq!(events.get("enrollment"), Some(&at(1)));
        assert!(store.get_events(&hc("hc-2")).await?.is_empty());
        Ok(())
    }
}
