//! Plan validation.
//!
//! Run when plans are authored, so that mistakes surface as
//! [`Error::InvalidConfiguration`] listing every problem at once rather than
//! as a failure on some participant's request later.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Duration;

use crate::error::{Error, Result};
use crate::model::{Schedule, SchedulePlan, Trigger};
use crate::strategy::ScheduleStrategy;

/// Validates a plan.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] with one message per problem.
pub fn validate_plan(plan: &SchedulePlan) -> Result<()> {
    let messages = plan_problems(plan);
    if messages.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration {
            plan_guid: plan.guid.clone(),
            messages,
        })
    }
}

/// Returns every problem found in a plan; empty when the plan is valid.
#[must_use]
pub fn plan_problems(plan: &SchedulePlan) -> Vec<String> {
    let mut problems = Vec::new();

    if plan.guid.trim().is_empty() {
        problems.push("plan guid is blank".to_string());
    }
    if plan.label.trim().is_empty() {
        problems.push("plan label is blank".to_string());
    }
    check_version_range(
        "plan",
        plan.min_app_version,
        plan.max_app_version,
        &mut problems,
    );

    match &plan.strategy {
        ScheduleStrategy::Simple { .. } => {}
        ScheduleStrategy::AbTest { groups } => {
            if groups.is_empty() {
                problems.push("A/B test has no groups".to_string());
            }
            for (i, group) in groups.iter().enumerate() {
                if group.percentage == 0 {
                    problems.push(format!("A/B group {i} has a zero weight"));
                }
            }
            let total: u32 = groups.iter().map(|g| u32::from(g.percentage)).sum();
            if total > 100 {
                problems.push(format!("A/B weights sum to {total}, more than 100"));
            }
        }
        ScheduleStrategy::Criteria { groups } => {
            if groups.is_empty() {
                problems.push("criteria strategy has no groups".to_string());
            }
            for (i, group) in groups.iter().enumerate() {
                check_version_range(
                    &format!("criteria group {i}"),
                    group.criteria.min_app_version,
                    group.criteria.max_app_version,
                    &mut problems,
                );
                if let Some(both) = group
                    .criteria
                    .all_of_groups
                    .intersection(&group.criteria.none_of_groups)
                    .next()
                {
                    problems.push(format!(
                        "criteria group {i} both requires and prohibits data group '{both}'"
                    ));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for schedule in plan.strategy.schedules() {
        if !seen.insert(schedule.guid.as_str()) {
            problems.push(format!("duplicate schedule guid '{}'", schedule.guid));
        }
        schedule_problems(schedule, &mut problems);
    }

    problems
}

fn check_version_range(what: &str, min: Option<u32>, max: Option<u32>, out: &mut Vec<String>) {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            out.push(format!(
                "{what} minimum app version {min} is above maximum {max}"
            ));
        }
    }
}

fn schedule_problems(schedule: &Schedule, out: &mut Vec<String>) {
    let name = if schedule.guid.trim().is_empty() {
        out.push("schedule guid is blank".to_string());
        "<blank>"
    } else {
        schedule.guid.as_str()
    };

    if schedule.label.trim().is_empty() {
        out.push(format!("schedule {name} label is blank"));
    }
    if schedule.activity.guid.trim().is_empty() {
        out.push(format!("schedule {name} activity guid is blank"));
    }
    if schedule.activity.label.trim().is_empty() {
        out.push(format!("schedule {name} activity label is blank"));
    }
    if schedule.activity.reference_id().trim().is_empty() {
        out.push(format!("schedule {name} activity has no task or survey reference"));
    }

    match &schedule.trigger {
        Trigger::Once { delay } => check_not_negative(name, "delay", *delay, out),
        Trigger::Interval { delay, interval } => {
            check_not_negative(name, "delay", *delay, out);
            if *interval < Duration::seconds(1) {
                out.push(format!(
                    "schedule {name} interval must be at least one second"
                ));
            }
        }
        Trigger::Cron { expression } => {
            if let Err(e) = cron::Schedule::from_str(expression) {
                out.push(format!(
                    "schedule {name} cron expression '{expression}' is invalid: {e}"
                ));
            }
        }
    }

    if let Some(expires) = schedule.expires {
        check_not_negative(name, "expiration", expires, out);
    }
    if let (Some(starts_on), Some(ends_on)) = (schedule.starts_on, schedule.ends_on) {
        if starts_on > ends_on {
            out.push(format!("schedule {name} starts after it ends"));
        }
    }
    if schedule
        .event_id
        .as_deref()
        .is_some_and(|ids| ids.split(',').all(|id| id.trim().is_empty()))
    {
        out.push(format!("schedule {name} event id names no event"));
    }
}

fn check_not_negative(name: &str, field: &str, value: Duration, out: &mut Vec<String>) {
    if value < Duration::zero() {
        out.push(format!("schedule {name} {field} is negative"));
    }
}
