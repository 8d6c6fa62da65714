//! The scheduled activity service.
//!
//! Computes a participant's schedule on request and keeps storage in line with
//! it. The service holds no state of its own between calls: every request
//! reads events, plans and persisted activities through the collaborators in
//! [`crate::store`], reconciles, writes the difference and returns.
//!
//! ## Flow of `get_scheduled_activities`
//!
//! ```text
//! validate context
//!   -> read events (+ consent fallback for enrollment)
//!   -> read plans -> select schedule per plan -> generate occurrences
//!   -> read persisted activities for the window
//!   -> reconcile -> delete orphans -> save new occurrences
//!   -> filter visible, sort, return
//! ```
//!
//! Concurrent requests for the same participant are safe: occurrence GUIDs are
//! deterministic, saves are upserts and persisted records always win, so
//! racing requests converge on the same stored state.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{Instrument, debug, info, info_span, warn};

use cadence_core::HealthCode;
use cadence_core::observability::schedule_span;

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::metrics::{SchedulerMetrics, time_reconcile};
use crate::model::{ActivityEdit, ENROLLMENT_EVENT, ScheduleContext, ScheduledActivity};
use crate::reconcile::reconcile;
use crate::scheduler::Scheduler;
use crate::store::{ActivityStore, BatchFailure, ConsentSource, EventStore, PlanSource};

/// Why a participant edit was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The edit carries no GUID.
    MissingGuid,
    /// The edit sets neither `started_on` nor `finished_on`.
    NoTimestamps,
    /// No persisted activity has the edit's GUID.
    UnknownGuid,
}

impl RejectReason {
    /// Returns the reason as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingGuid => "missing_guid",
            Self::NoTimestamps => "no_timestamps",
            Self::UnknownGuid => "unknown_guid",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingGuid => "edit has no guid",
            Self::NoTimestamps => "edit sets neither startedOn nor finishedOn",
            Self::UnknownGuid => "no scheduled activity with this guid",
        })
    }
}

/// An edit that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEdit {
    /// Position of the edit in the submitted batch.
    pub index: usize,
    /// GUID carried by the edit, if any.
    pub guid: Option<String>,
    /// Why it was rejected.
    pub reason: RejectReason,
}

/// Result of applying a batch of participant edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Activities as persisted after the edits.
    pub updated: Vec<ScheduledActivity>,
    /// Edits that were not applied.
    pub rejected: Vec<RejectedEdit>,
}

/// Computes, persists and updates participants' scheduled activities.
pub struct ScheduledActivityService {
    events: Arc<dyn EventStore>,
    activities: Arc<dyn ActivityStore>,
    plans: Arc<dyn PlanSource>,
    consents: Arc<dyn ConsentSource>,
    scheduler: Scheduler,
    config: SchedulerConfig,
    metrics: SchedulerMetrics,
}

impl fmt::Debug for ScheduledActivityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledActivityService")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScheduledActivityService {
    /// Creates a service over the given collaborators.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        activities: Arc<dyn ActivityStore>,
        plans: Arc<dyn PlanSource>,
        consents: Arc<dyn ConsentSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            events,
            activities,
            plans,
            consents,
            scheduler: Scheduler::from_config(&config),
            config,
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the participant's visible activities for the context's window,
    /// ordered by scheduled time then activity label.
    ///
    /// New occurrences are saved and occurrences that are no longer generated
    /// are deleted, unless the participant has started or finished them.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidContext`] if the window end is not after now or lies
    ///   beyond the configured look-ahead
    /// - [`Error::PlansFailed`] if every plan of the study is misconfigured
    /// - [`Error::BatchFailed`] if some deletes or saves did not go through;
    ///   writes that succeeded are kept
    /// - [`Error::Storage`] if a collaborator fails
    pub async fn get_scheduled_activities(
        &self,
        context: ScheduleContext,
    ) -> Result<Vec<ScheduledActivity>> {
        let span = schedule_span(
            "get_scheduled_activities",
            context.study_id.as_str(),
            context.health_code.as_str(),
        );
        self.compute(context).instrument(span).await
    }

    async fn compute(&self, context: ScheduleContext) -> Result<Vec<ScheduledActivity>> {
        let _timer = time_reconcile();
        let context = self.prepare_context(context).await?;
        let now = context.now;

        let (generated, failed_plans) = self.generate_all(&context).await?;
        self.metrics.record_generated(generated.len());

        let persisted = self
            .activities
            .get_activities(&context.health_code, context.window())
            .await?;
        let mut reconciliation = reconcile(generated, persisted);
        reconciliation.retain_plans(&failed_plans);

        let mut failures: Vec<BatchFailure> = Vec::new();
        let mut operations = Vec::new();
        if !reconciliation.to_delete.is_empty() {
            let failed = self.activities.delete_activities(&reconciliation.to_delete).await?;
            self.metrics
                .record_deleted("orphaned", reconciliation.to_delete.len().saturating_sub(failed.len()));
            if !failed.is_empty() {
                self.metrics.record_batch_failures("delete", failed.len());
                operations.push("delete");
                failures.extend(failed);
            }
        }
        if !reconciliation.to_save.is_empty() {
            let failed = self.activities.save_activities(&reconciliation.to_save).await?;
            self.metrics
                .record_saved(reconciliation.to_save.len().saturating_sub(failed.len()));
            if !failed.is_empty() {
                self.metrics.record_batch_failures("save", failed.len());
                operations.push("save");
                failures.extend(failed);
            }
        }
        if !failures.is_empty() {
            let operation = match operations.as_slice() {
                [single] => *single,
                _ => "delete and save",
            };
            warn!(
                operation,
                failed = failures.len(),
                "scheduled activities were only partially persisted"
            );
            return Err(Error::BatchFailed {
                operation,
                failures,
            });
        }

        info!(
            saved = reconciliation.to_save.len(),
            deleted = reconciliation.to_delete.len(),
            returned = reconciliation.results.len(),
            "reconciled scheduled activities"
        );

        let mut results: Vec<ScheduledActivity> = reconciliation
            .results
            .into_iter()
            .filter(|activity| activity.is_visible(now))
            .collect();
        results.sort_by(|a, b| {
            a.scheduled_on
                .cmp(&b.scheduled_on)
                .then_with(|| a.activity.label.cmp(&b.activity.label))
                .then_with(|| a.guid.cmp(&b.guid))
        });
        Ok(results)
    }

    /// Validates the window and fills in the window start and the event map.
    async fn prepare_context(&self, mut context: ScheduleContext) -> Result<ScheduleContext> {
        if context.ends_on <= context.now {
            return Err(Error::InvalidContext {
                message: format!(
                    "window end {} is not after now {}",
                    context.ends_on, context.now
                ),
            });
        }
        let lookahead = Duration::days(i64::from(self.config.max_lookahead_days));
        let within_lookahead = context
            .now
            .checked_add_signed(lookahead)
            .is_none_or(|max_end| context.ends_on <= max_end);
        if !within_lookahead {
            return Err(Error::InvalidContext {
                message: format!(
                    "window end {} is more than {} days ahead",
                    context.ends_on, self.config.max_lookahead_days
                ),
            });
        }
        if context.starts_on.is_none() {
            let lookback = Duration::days(i64::from(self.config.lookback_days));
            let starts_on = context.now.checked_sub_signed(lookback).ok_or_else(|| {
                Error::InvalidContext {
                    message: format!(
                        "window start {} days before {} is out of range",
                        self.config.lookback_days, context.now
                    ),
                }
            })?;
            context.starts_on = Some(starts_on);
        }

        // Caller-supplied events take precedence over stored ones.
        let mut events = self.events.get_events(&context.health_code).await?;
        events.extend(context.events.drain());
        if !events.contains_key(ENROLLMENT_EVENT) {
            if let Some(signed_on) = self
                .consents
                .earliest_consent_signed_on(&context.health_code, &context.study_id)
                .await?
            {
                debug!(%signed_on, "using earliest consent as enrollment");
                events.insert(ENROLLMENT_EVENT.to_string(), signed_on);
            } else {
                warn!("participant has no enrollment event and no consent record");
            }
        }
        context.events = events;
        Ok(context)
    }

    /// Generates every plan's occurrences, skipping misconfigured plans.
    ///
    /// Returns the occurrences together with the GUIDs of the skipped plans.
    async fn generate_all(
        &self,
        context: &ScheduleContext,
    ) -> Result<(Vec<ScheduledActivity>, HashSet<String>)> {
        let plans = self
            .plans
            .get_plans(&context.study_id, &context.client_info)
            .await?;

        let mut generated = Vec::new();
        let mut failures = Vec::new();
        for plan in &plans {
            let Some(schedule) = plan.strategy.schedule_for(&plan.guid, context) else {
                debug!(plan = %plan.guid, "no schedule selected for participant");
                continue;
            };
            debug!(plan = %plan.guid, schedule = %schedule.guid, "selected schedule");
            match self.scheduler.generate(plan, schedule, context) {
                Ok(occurrences) => generated.extend(occurrences),
                Err(e) => {
                    let kind = if e.is_configuration() { "configuration" } else { "other" };
                    warn!(plan = %plan.guid, error = %e, "skipping schedule plan");
                    self.metrics.record_plan_failure(kind);
                    failures.push((plan.guid.clone(), e.to_string()));
                }
            }
        }

        if !plans.is_empty() && failures.len() == plans.len() {
            return Err(Error::PlansFailed { failures });
        }
        let failed_plans = failures.into_iter().map(|(guid, _)| guid).collect();
        Ok((generated, failed_plans))
    }

    /// Applies participant progress to persisted activities.
    ///
    /// Only timestamps present in an edit are applied. Edits without a GUID,
    /// without any timestamp, or naming an unknown activity are rejected
    /// individually while the rest of the batch proceeds. When an edit sets or
    /// moves an activity's finish time, `activity:{guid}:finished` is
    /// published at that time once the activity has been saved.
    ///
    /// # Errors
    ///
    /// - [`Error::BatchFailed`] if some activities could not be saved; events
    ///   are still published for the ones that were
    /// - [`Error::Storage`] if a collaborator fails
    pub async fn update_scheduled_activities(
        &self,
        health_code: &HealthCode,
        edits: Vec<ActivityEdit>,
    ) -> Result<UpdateOutcome> {
        let span = schedule_span("update_scheduled_activities", "-", health_code.as_str());
        self.apply_edits(health_code, edits).instrument(span).await
    }

    async fn apply_edits(
        &self,
        health_code: &HealthCode,
        edits: Vec<ActivityEdit>,
    ) -> Result<UpdateOutcome> {
        let mut pending: Vec<ScheduledActivity> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut finish_changed: HashSet<String> = HashSet::new();
        let mut rejected = Vec::new();

        for (index, edit) in edits.iter().enumerate() {
            let guid = edit
                .guid
                .as_deref()
                .map(str::trim)
                .filter(|guid| !guid.is_empty());
            let reason = match guid {
                None => Some(RejectReason::MissingGuid),
                Some(_) if !edit.has_timestamps() => Some(RejectReason::NoTimestamps),
                Some(guid) => {
                    let position = match positions.get(guid).copied() {
                        Some(position) => Some(position),
                        None => self
                            .activities
                            .get_activity(health_code, guid)
                            .await?
                            .map(|activity| {
                                pending.push(activity);
                                positions.insert(guid.to_string(), pending.len() - 1);
                                pending.len() - 1
                            }),
                    };
                    match position.and_then(|position| pending.get_mut(position)) {
                        Some(activity) => {
                            if activity.apply_edit(edit) {
                                finish_changed.insert(activity.guid.clone());
                            }
                            None
                        }
                        None => Some(RejectReason::UnknownGuid),
                    }
                }
            };
            if let Some(reason) = reason {
                debug!(index, %reason, "rejected activity edit");
                self.metrics.record_rejected_edit(reason.as_str());
                rejected.push(RejectedEdit {
                    index,
                    guid: edit.guid.clone(),
                    reason,
                });
            }
        }

        let failures = if pending.is_empty() {
            Vec::new()
        } else {
            self.activities.save_activities(&pending).await?
        };
        let failed: HashSet<&str> = failures.iter().map(|f| f.guid.as_str()).collect();
        self.metrics.record_saved(pending.len().saturating_sub(failed.len()));

        for activity in &pending {
            if failed.contains(activity.guid.as_str()) || !finish_changed.contains(&activity.guid) {
                continue;
            }
            if let Some(finished_on) = activity.finished_on {
                self.publish_finished(health_code, activity, finished_on).await?;
            }
        }

        info!(
            updated = pending.len().saturating_sub(failed.len()),
            rejected = rejected.len(),
            "applied activity edits"
        );

        if !failures.is_empty() {
            self.metrics.record_batch_failures("update", failures.len());
            return Err(Error::BatchFailed {
                operation: "update",
                failures,
            });
        }
        Ok(UpdateOutcome {
            updated: pending,
            rejected,
        })
    }

    async fn publish_finished(
        &self,
        health_code: &HealthCode,
        activity: &ScheduledActivity,
        finished_on: DateTime<Utc>,
    ) -> Result<()> {
        let key = activity.activity.finished_event_key();
        debug!(event = %key, "publishing activity finished event");
        self.events
            .publish_event(health_code, &key, finished_on)
            .await
    }

    /// Deletes every scheduled activity of a participant.
    ///
    /// Returns how many activities were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the activity store fails.
    pub async fn delete_activities_for_participant(&self, health_code: &HealthCode) -> Result<usize> {
        let span = schedule_span("delete_activities_for_participant", "-", health_code.as_str());
        async {
            let removed = self
                .activities
                .delete_activities_for_participant(health_code)
                .await?;
            self.metrics.record_deleted("participant", removed);
            info!(removed, "deleted participant's scheduled activities");
            Ok(removed)
        }
        .instrument(span)
        .await
    }

    /// Deletes every scheduled activity generated by a plan.
    ///
    /// Returns how many activities were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the activity store fails.
    pub async fn delete_activities_for_plan(&self, plan_guid: &str) -> Result<usize> {
        let span = info_span!("schedule", op = "delete_activities_for_plan", plan = plan_guid);
        async {
            let removed = self.activities.delete_activities_for_plan(plan_guid).await?;
            self.metrics.record_deleted("plan", removed);
            info!(removed, "deleted plan's scheduled activities");
            Ok(removed)
        }
        .instrument(span)
        .await
    }
}
