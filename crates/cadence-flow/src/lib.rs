//! # cadence-flow
//!
//! Schedule computation and reconciliation for study participants.
//!
//! Study designers author [`SchedulePlan`]s. For any participant and time
//! window, this crate deterministically computes which activities are due,
//! merges them with what has already been persisted (including the
//! participant's own start and finish times) and writes exactly the changes
//! needed to keep storage consistent.
//!
//! ## Core Concepts
//!
//! - **Strategy**: how a plan picks one [`Schedule`] per participant
//!   (simple, A/B test, or criteria)
//! - **Scheduler**: turns a schedule and the participant's events into
//!   concrete [`ScheduledActivity`] occurrences with deterministic GUIDs
//! - **Status**: derived from timestamps and "now", never stored
//! - **Reconciliation**: persisted records win; started or finished activities
//!   are never deleted
//! - **Service**: [`ScheduledActivityService`] runs the whole pipeline over
//!   pluggable collaborators
//!
//! ## Example
//!
//! ```rust
//! use cadence_flow::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let enrolled = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
//! let schedule = Schedule::new(
//!     "weekly",
//!     "Weekly survey",
//!     Trigger::Interval { delay: Duration::zero(), interval: Duration::days(7) },
//!     Activity::survey("act-weekly", "Weekly survey", "survey-1"),
//! )
//! .with_expires(Duration::days(3));
//! let plan = SchedulePlan::new(
//!     "plan-1",
//!     StudyId::new("asthma").unwrap(),
//!     "Weekly",
//!     enrolled,
//!     ScheduleStrategy::Simple { schedule: schedule.clone() },
//! );
//! let context = ScheduleContext::new(
//!     HealthCode::new("hc-0001").unwrap(),
//!     StudyId::new("asthma").unwrap(),
//!     enrolled,
//!     enrolled + Duration::days(15),
//! )
//! .with_event(ENROLLMENT_EVENT, enrolled);
//!
//! let occurrences = Scheduler::default().generate(&plan, &schedule, &context).unwrap();
//! assert_eq!(occurrences.len(), 3);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod store;
pub mod strategy;
pub mod validate;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::SchedulerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::model::{
        Activity, ActivityEdit, ActivityReference, ActivityType, ActivityWindow,
        ENROLLMENT_EVENT, Schedule, ScheduleContext, SchedulePlan, ScheduledActivity,
        ScheduledActivityView, Trigger,
    };
    pub use crate::reconcile::{Reconciliation, reconcile};
    pub use crate::scheduler::{FiringTimes, Scheduler};
    pub use crate::service::{RejectReason, RejectedEdit, ScheduledActivityService, UpdateOutcome};
    pub use crate::status::ScheduledActivityStatus;
    pub use crate::store::{ActivityStore, BatchFailure, ConsentSource, EventStore, PlanSource};
    pub use crate::strategy::{AbTestGroup, Criteria, CriteriaGroup, ScheduleStrategy};
    pub use crate::validate::validate_plan;
    pub use cadence_core::{ClientInfo, HealthCode, StudyId};
}

pub use config::SchedulerConfig;
pub use error::{Error, Result};
pub use model::{Schedule, ScheduleContext, SchedulePlan, ScheduledActivity};
pub use service::ScheduledActivityService;
pub use status::ScheduledActivityStatus;
pub use strategy::ScheduleStrategy;
