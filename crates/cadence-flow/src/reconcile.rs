//! Reconciliation of generated occurrences against persisted ones.
//!
//! The merge is total and infallible:
//!
//! | generated | persisted | outcome                                   |
//! |-----------|-----------|-------------------------------------------|
//! | yes       | no        | save, return                              |
//! | yes       | yes       | return the persisted record               |
//! | no        | yes       | delete, unless started or finished: keep  |
//!
//! Persisted records always win over freshly generated ones, which is what
//! makes repeated and concurrent runs converge: once an occurrence has been
//! saved, later runs return it unchanged and never save it again.

use std::collections::{HashMap, HashSet};

use crate::model::ScheduledActivity;

/// The changes needed to bring storage in line with a freshly computed schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Generated occurrences that are not persisted yet.
    pub to_save: Vec<ScheduledActivity>,
    /// Persisted occurrences that are no longer generated and carry no progress.
    pub to_delete: Vec<ScheduledActivity>,
    /// Every occurrence the participant should see, in no particular order.
    pub results: Vec<ScheduledActivity>,
}

impl Reconciliation {
    /// Returns true if storage is already up to date.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_save.is_empty() && self.to_delete.is_empty()
    }

    /// Keeps the orphans of `plan_guids` instead of deleting them.
    ///
    /// Used for plans that could not be evaluated this time: their persisted
    /// occurrences stay as they are until the plan generates again.
    pub fn retain_plans(&mut self, plan_guids: &HashSet<String>) {
        if plan_guids.is_empty() {
            return;
        }
        let (kept, deleted): (Vec<_>, Vec<_>) = std::mem::take(&mut self.to_delete)
            .into_iter()
            .partition(|activity| plan_guids.contains(&activity.schedule_plan_guid));
        self.to_delete = deleted;
        self.results.extend(kept);
    }
}

/// Merges `generated` occurrences with `persisted` ones for the same window.
///
/// Duplicate GUIDs within `generated` collapse to their first occurrence.
#[must_use]
pub fn reconcile(
    generated: Vec<ScheduledActivity>,
    persisted: Vec<ScheduledActivity>,
) -> Reconciliation {
    let mut persisted_by_guid: HashMap<String, ScheduledActivity> = persisted
        .into_iter()
        .map(|activity| (activity.guid.clone(), activity))
        .collect();

    let mut out = Reconciliation::default();
    let mut seen = HashSet::with_capacity(generated.len());

    for activity in generated {
        if !seen.insert(activity.guid.clone()) {
            continue;
        }
        match persisted_by_guid.remove(&activity.guid) {
            Some(existing) => out.results.push(existing),
            None => {
                out.results.push(activity.clone());
                out.to_save.push(activity);
            }
        }
    }

    // Whatever is left was persisted but not generated this time.
    let mut orphans: Vec<ScheduledActivity> = persisted_by_guid.into_values().collect();
    orphans.sort_by(|a, b| a.guid.cmp(&b.guid));
    for orphan in orphans {
        if orphan.has_progress() {
            out.results.push(orphan);
        } else {
            out.to_delete.push(orphan);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Schedule, Trigger};
    use cadence_core::HealthCode;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use chrono_tz::Tz;

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap() + Duration::days(day)
    }

    fn occurrence(day: i64) -> ScheduledActivity {
        let schedule = Schedule::new(
            "sched-1",
            "Daily",
            Trigger::Interval {
                delay: Duration::zero(),
                interval: Duration::days(1),
            },
            Activity::task("act-1", "Tapping", "tapping"),
        );
        ScheduledActivity::new(
            "plan-1",
            &schedule,
            HealthCode::new("hc-1").unwrap(),
            Tz::UTC,
            at(day),
        )
    }

    fn guids(items: &[ScheduledActivity]) -> Vec<String> {
        let mut out: Vec<String> = items.iter().map(|a| a.guid.clone()).collect();
        out.sort();
        out
    }

    #[test]
    fn merges_generated_with_persisted() {
        let g1 = occurrence(1);
        let g2 = occurrence(2);
        let g3 = occurrence(3);

        let mut g1_finished = g1.clone();
        g1_finished.finished_on = Some(at(1) + Duration::hours(1));

        let out = reconcile(
            vec![g1.clone(), g2.clone()],
            vec![g1_finished.clone(), g3.clone()],
        );

        assert_eq!(guids(&out.to_save), vec![g2.guid.clone()]);
        assert_eq!(guids(&out.to_delete), vec![g3.guid.clone()]);
        assert_eq!(
            guids(&out.results),
            guids(&[g1.clone(), g2.clone()])
        );
        // The persisted record wins.
        let returned = out.results.iter().find(|a| a.guid == g1.guid).unwrap();
        assert_eq!(returned.finished_on, g1_finished.finished_on);
    }

    #[test]
    fn orphans_with_progress_are_retained() {
        let g1 = occurrence(1);
        let mut started_orphan = occurrence(3);
        started_orphan.started_on = Some(at(3));

        let out = reconcile(vec![g1.clone()], vec![started_orphan.clone()]);

        assert!(out.to_delete.is_empty());
        assert_eq!(
            guids(&out.results),
            guids(&[g1, started_orphan])
        );
    }

    #[test]
    fn second_run_is_a_noop() {
        let generated = vec![occurrence(1), occurrence(2)];
        let first = reconcile(generated.clone(), Vec::new());
        assert_eq!(first.to_save.len(), 2);

        let second = reconcile(generated, first.to_save);
        assert!(second.is_noop());
        assert_eq!(second.results.len(), 2);
    }

    #[test]
    fn duplicate_generated_guids_collapse() {
        let out = reconcile(vec![occurrence(1), occurrence(1)], Vec::new());
        assert_eq!(out.to_save.len(), 1);
        assert_eq!(out.results.len(), 1);
    }

    #[test]
    fn retained_plans_keep_their_orphans() {
        let orphan = occurrence(3);
        let mut out = reconcile(vec![occurrence(1)], vec![orphan.clone()]);
        assert_eq!(guids(&out.to_delete), vec![orphan.guid.clone()]);

        out.retain_plans(&HashSet::from(["plan-other".to_string()]));
        assert_eq!(out.to_delete.len(), 1);

        out.retain_plans(&HashSet::from(["plan-1".to_string()]));
        assert!(out.to_delete.is_empty());
        assert!(out.results.iter().any(|a| a.guid == orphan.guid));
    }
}
