//! Occurrence generation.
//!
//! A [`FiringTimes`] iterator yields the instants a trigger fires at, starting
//! from the schedule's anchor. The [`Scheduler`] drains it up to the window
//! end, bounded by a configured maximum, and turns each firing into a
//! [`ScheduledActivity`].
//!
//! Cron triggers are evaluated in the participant's time zone so that
//! "every day at 09:00" means 09:00 wherever the participant lives, across
//! daylight-saving changes.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::model::{Schedule, ScheduleContext, SchedulePlan, ScheduledActivity, Trigger};

/// Lazy, cloneable sequence of the instants a schedule fires at.
///
/// Cloning yields an independent iterator from the same position, so a
/// sequence can be restarted without re-parsing the trigger.
#[derive(Debug, Clone)]
pub struct FiringTimes {
    kind: FiringKind,
    next: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
enum FiringKind {
    Once,
    Interval(Duration),
    Cron { schedule: Box<cron::Schedule>, tz: Tz },
}

impl FiringTimes {
    /// Creates the firing sequence of `schedule` anchored at `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] for an interval under one second or a
    /// negative delay, and [`Error::InvalidCron`] for an unparseable cron
    /// expression.
    pub fn new(schedule: &Schedule, anchor: DateTime<Utc>, tz: Tz) -> Result<Self> {
        match &schedule.trigger {
            Trigger::Once { delay } => {
                check_delay(schedule, *delay)?;
                Ok(Self {
                    kind: FiringKind::Once,
                    next: anchor.checked_add_signed(*delay),
                })
            }
            Trigger::Interval { delay, interval } => {
                check_delay(schedule, *delay)?;
                if *interval < Duration::seconds(1) {
                    return Err(Error::InvalidInterval {
                        schedule_guid: schedule.guid.clone(),
                        message: format!(
                            "interval must be at least one second, got {}s",
                            interval.num_seconds()
                        ),
                    });
                }
                Ok(Self {
                    kind: FiringKind::Interval(*interval),
                    next: anchor.checked_add_signed(*delay),
                })
            }
            Trigger::Cron { expression } => {
                let parsed = cron::Schedule::from_str(expression).map_err(|e| Error::InvalidCron {
                    schedule_guid: schedule.guid.clone(),
                    expression: expression.clone(),
                    message: e.to_string(),
                })?;
                let next = first_cron_at_or_after(&parsed, tz, anchor);
                Ok(Self {
                    kind: FiringKind::Cron {
                        schedule: Box::new(parsed),
                        tz,
                    },
                    next,
                })
            }
        }
    }

    /// Advances past every firing before `from` without yielding them.
    ///
    /// Interval triggers jump ahead arithmetically, so long-running schedules
    /// cost nothing for the history before the window.
    pub fn skip_to(&mut self, from: DateTime<Utc>) {
        let Some(next) = self.next else {
            return;
        };
        if next >= from {
            return;
        }
        self.next = match &self.kind {
            FiringKind::Once => None,
            FiringKind::Interval(interval) => {
                let gap = (from - next).num_milliseconds();
                let step = interval.num_milliseconds();
                let steps = gap.div_euclid(step) + i64::from(gap.rem_euclid(step) != 0);
                steps
                    .checked_mul(step)
                    .and_then(Duration::try_milliseconds)
                    .and_then(|offset| next.checked_add_signed(offset))
            }
            FiringKind::Cron { schedule, tz } => first_cron_at_or_after(schedule, *tz, from),
        };
    }
}

impl Iterator for FiringTimes {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = match &self.kind {
            FiringKind::Once => None,
            FiringKind::Interval(interval) => current.checked_add_signed(*interval),
            FiringKind::Cron { schedule, tz } => schedule
                .after(&current.with_timezone(tz))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        };
        Some(current)
    }
}

fn check_delay(schedule: &Schedule, delay: Duration) -> Result<()> {
    if delay < Duration::zero() {
        return Err(Error::InvalidInterval {
            schedule_guid: schedule.guid.clone(),
            message: format!("delay must not be negative, got {}s", delay.num_seconds()),
        });
    }
    Ok(())
}

/// Cron iteration is exclusive of its start, so begin one second early and
/// drop anything that still precedes `from`.
fn first_cron_at_or_after(
    schedule: &cron::Schedule,
    tz: Tz,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let cursor = from.checked_sub_signed(Duration::seconds(1))?;
    schedule
        .after(&cursor.with_timezone(&tz))
        .map(|t| t.with_timezone(&Utc))
        .find(|t| *t >= from)
}

/// Generates bounded occurrences of a schedule for one participant.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_occurrences: usize,
    default_event: String,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(max_occurrences: usize, default_event: impl Into<String>) -> Self {
        Self {
            max_occurrences,
            default_event: default_event.into(),
        }
    }

    /// Creates a scheduler from configuration.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_occurrences_per_schedule, config.default_event.clone())
    }

    /// Returns the per-schedule occurrence bound.
    #[must_use]
    pub const fn max_occurrences(&self) -> usize {
        self.max_occurrences
    }

    /// Returns the event that anchors schedules without an explicit event.
    #[must_use]
    pub fn default_event(&self) -> &str {
        &self.default_event
    }

    /// Generates the occurrences of `schedule` inside the context's window.
    ///
    /// A schedule whose anchoring event has not happened yet produces nothing.
    /// Occurrences outside the schedule's own `starts_on`/`ends_on` are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the trigger is malformed or if more
    /// than the configured maximum number of occurrences fall in the window.
    pub fn generate(
        &self,
        plan: &SchedulePlan,
        schedule: &Schedule,
        context: &ScheduleContext,
    ) -> Result<Vec<ScheduledActivity>> {
        let Some(anchor) = schedule.anchor(&context.events, &self.default_event) else {
            debug!(
                plan = %plan.guid,
                schedule = %schedule.guid,
                "anchoring event not recorded; no occurrences"
            );
            return Ok(Vec::new());
        };

        let mut firings = FiringTimes::new(schedule, anchor, context.time_zone)?;

        let from = match (context.starts_on, schedule.starts_on) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if let Some(from) = from {
            firings.skip_to(from);
        }
        let until = schedule
            .ends_on
            .map_or(context.ends_on, |ends_on| ends_on.min(context.ends_on));

        let times: Vec<DateTime<Utc>> = firings
            .take_while(|at| *at <= until)
            .take(self.max_occurrences.saturating_add(1))
            .collect();
        if times.len() > self.max_occurrences {
            return Err(Error::OccurrenceLimitExceeded {
                schedule_guid: schedule.guid.clone(),
                limit: self.max_occurrences,
            });
        }

        let occurrences: Vec<ScheduledActivity> = times
            .into_iter()
            .filter(|at| from.is_none_or(|from| *at >= from))
            .map(|at| {
                ScheduledActivity::new(
                    &plan.guid,
                    schedule,
                    context.health_code.clone(),
                    context.time_zone,
                    at,
                )
            })
            .collect();

        debug!(
            plan = %plan.guid,
            schedule = %schedule.guid,
            count = occurrences.len(),
            "generated occurrences"
        );
        Ok(occurrences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, ENROLLMENT_EVENT};
    use crate::status::ScheduledActivityStatus;
    use crate::strategy::ScheduleStrategy;
    use cadence_core::{HealthCode, StudyId};
    use chrono::{TimeZone, Timelike};

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
    }

    fn weekly() -> Schedule {
        Schedule::new(
            "sched-weekly",
            "Weekly survey",
            Trigger::Interval {
                delay: Duration::zero(),
                interval: Duration::days(7),
            },
            Activity::survey("act-weekly", "Weekly survey", "survey-1"),
        )
        .with_expires(Duration::days(3))
    }

    fn plan_for(schedule: Schedule) -> SchedulePlan {
        SchedulePlan::new(
            "plan-1",
            StudyId::new("asthma").unwrap(),
            "Plan",
            day0(),
            ScheduleStrategy::Simple { schedule },
        )
    }

    fn context(ends_on: DateTime<Utc>) -> ScheduleContext {
        ScheduleContext::new(
            HealthCode::new("hc-1").unwrap(),
            StudyId::new("asthma").unwrap(),
            day0(),
            ends_on,
        )
        .with_event(ENROLLMENT_EVENT, day0())
    }

    #[test]
    fn weekly_interval_with_expiry() {
        let schedule = weekly();
        let plan = plan_for(schedule.clone());
        let occurrences = Scheduler::default()
            .generate(&plan, &schedule, &context(day0() + Duration::days(15)))
            .unwrap();

        let days: Vec<i64> = occurrences
            .iter()
            .map(|o| (o.scheduled_on - day0()).num_days())
            .collect();
        assert_eq!(days, vec![0, 7, 14]);

        let day10 = day0() + Duration::days(10);
        let statuses: Vec<_> = occurrences.iter().map(|o| o.status(day10)).collect();
        assert_eq!(
            statuses,
            vec![
                ScheduledActivityStatus::Expired,
                ScheduledActivityStatus::Available,
                ScheduledActivityStatus::Scheduled,
            ]
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let schedule = weekly();
        let plan = plan_for(schedule.clone());
        let ctx = context(day0() + Duration::days(60));
        let scheduler = Scheduler::default();
        let a = scheduler.generate(&plan, &schedule, &ctx).unwrap();
        let b = scheduler.generate(&plan, &schedule, &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_anchor_yields_nothing() {
        let schedule = weekly().with_event_id("activity:other:finished");
        let plan = plan_for(schedule.clone());
        let occurrences = Scheduler::default()
            .generate(&plan, &schedule, &context(day0() + Duration::days(15)))
            .unwrap();
        assert!(occurrences.is_empty());
    }

    #[test]
    fn once_outside_window_yields_nothing() {
        let schedule = Schedule::new(
            "sched-once",
            "Baseline",
            Trigger::Once {
                delay: Duration::days(5),
            },
            Activity::task("act-once", "Baseline", "baseline"),
        );
        let plan = plan_for(schedule.clone());
        let scheduler = Scheduler::default();

        let early = scheduler
            .generate(&plan, &schedule, &context(day0() + Duration::days(4)))
            .unwrap();
        assert!(early.is_empty());

        let later = scheduler
            .generate(&plan, &schedule, &context(day0() + Duration::days(5)))
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].scheduled_on, day0() + Duration::days(5));
    }

    #[test]
    fn occurrence_limit_is_enforced() {
        let schedule = Schedule::new(
            "sched-hourly",
            "Hourly",
            Trigger::Interval {
                delay: Duration::zero(),
                interval: Duration::hours(1),
            },
            Activity::task("act-hourly", "Hourly", "hourly"),
        );
        let plan = plan_for(schedule.clone());
        let scheduler = Scheduler::new(10, ENROLLMENT_EVENT);

        let ok = scheduler
            .generate(&plan, &schedule, &context(day0() + Duration::hours(9)))
            .unwrap();
        assert_eq!(ok.len(), 10);

        let err = scheduler
            .generate(&plan, &schedule, &context(day0() + Duration::hours(10)))
            .unwrap_err();
        assert!(matches!(err, Error::OccurrenceLimitExceeded { limit: 10, .. }));
    }

    #[test]
    fn window_start_skips_history() {
        let schedule = weekly();
        let plan = plan_for(schedule.clone());
        let ctx = context(day0() + Duration::days(30))
            .with_starts_on(Some(day0() + Duration::days(10)));
        let occurrences = Scheduler::default()
            .generate(&plan, &schedule, &ctx)
            .unwrap();
        let days: Vec<i64> = occurrences
            .iter()
            .map(|o| (o.scheduled_on - day0()).num_days())
            .collect();
        assert_eq!(days, vec![14, 21, 28]);
    }

    #[test]
    fn schedule_bounds_clip_occurrences() {
        let schedule = weekly().with_bounds(
            Some(day0() + Duration::days(1)),
            Some(day0() + Duration::days(15)),
        );
        let plan = plan_for(schedule.clone());
        let occurrences = Scheduler::default()
            .generate(&plan, &schedule, &context(day0() + Duration::days(60)))
            .unwrap();
        let days: Vec<i64> = occurrences
            .iter()
            .map(|o| (o.scheduled_on - day0()).num_days())
            .collect();
        assert_eq!(days, vec![7, 14]);
    }

    #[test]
    fn cron_fires_in_participant_time_zone() {
        let schedule = Schedule::new(
            "sched-cron",
            "Morning",
            Trigger::Cron {
                expression: "0 0 9 * * *".into(),
            },
            Activity::task("act-cron", "Morning", "morning"),
        );
        let plan = plan_for(schedule.clone());
        let tz = chrono_tz::America::New_York;
        let ctx = context(day0() + Duration::days(3)).with_time_zone(tz);
        let occurrences = Scheduler::default()
            .generate(&plan, &schedule, &ctx)
            .unwrap();

        assert_eq!(occurrences.len(), 3);
        for occurrence in &occurrences {
            assert!(occurrence.scheduled_on >= day0());
            assert_eq!(occurrence.scheduled_on.with_timezone(&tz).hour(), 9);
        }
    }

    #[test]
    fn cron_fires_at_anchor_when_it_matches() {
        let schedule = Schedule::new(
            "sched-cron",
            "Hourly",
            Trigger::Cron {
                expression: "0 0 * * * *".into(),
            },
            Activity::task("act-cron", "Hourly", "hourly"),
        );
        let firings: Vec<_> = FiringTimes::new(&schedule, day0(), Tz::UTC)
            .unwrap()
            .take(2)
            .collect();
        assert_eq!(firings, vec![day0(), day0() + Duration::hours(1)]);
    }

    #[test]
    fn malformed_triggers_are_rejected() {
        let bad_cron = Schedule::new(
            "sched-bad",
            "Bad",
            Trigger::Cron {
                expression: "every tuesday".into(),
            },
            Activity::task("act", "Bad", "bad"),
        );
        assert!(matches!(
            FiringTimes::new(&bad_cron, day0(), Tz::UTC),
            Err(Error::InvalidCron { .. })
        ));

        let zero_interval = Schedule::new(
            "sched-zero",
            "Zero",
            Trigger::Interval {
                delay: Duration::zero(),
                interval: Duration::zero(),
            },
            Activity::task("act", "Zero", "zero"),
        );
        assert!(matches!(
            FiringTimes::new(&zero_interval, day0(), Tz::UTC),
            Err(Error::InvalidInterval { .. })
        ));
    }

    #[test]
    fn firing_times_restart_from_clone() {
        let firings = FiringTimes::new(&weekly(), day0(), Tz::UTC).unwrap();
        let first: Vec<_> = firings.clone().take(3).collect();
        let again: Vec<_> = firings.take(3).collect();
        assert_eq!(first, again);
    }
}
