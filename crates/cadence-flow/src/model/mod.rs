//! Domain model for participant scheduling.
//!
//! - [`Activity`]: what the participant is asked to do (a task or a survey)
//! - [`Schedule`]: a trigger + activity + expiration template
//! - [`SchedulePlan`]: a study-level policy owning one [`crate::strategy::ScheduleStrategy`]
//! - [`ScheduleContext`]: per-request participant and window information
//! - [`ScheduledActivity`]: one concrete, identifiable occurrence

mod activity;
mod context;
mod plan;
mod schedule;
mod scheduled_activity;

pub use activity::{Activity, ActivityReference, ActivityType};
pub use context::{ActivityWindow, ENROLLMENT_EVENT, ScheduleContext};
pub use plan::SchedulePlan;
pub use schedule::{Schedule, Trigger};
pub use scheduled_activity::{ActivityEdit, ScheduledActivity, ScheduledActivityView};

/// Serde helpers for durations stored as whole seconds.
pub(crate) mod serde_secs {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs).ok_or_else(|| D::Error::custom("duration out of range"))
    }

    pub mod option {
        use super::{Deserialize, Deserializer, Duration, Serializer};
        use serde::de::Error as _;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&duration.num_seconds()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<i64>::deserialize(deserializer)?
                .map(|secs| {
                    Duration::try_seconds(secs)
                        .ok_or_else(|| D::Error::custom("duration out of range"))
                })
                .transpose()
        }
    }
}
