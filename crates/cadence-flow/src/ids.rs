//! Deterministic identifier helpers.
//!
//! Occurrence GUIDs and A/B buckets are pure functions of their inputs so that
//! repeated or concurrent evaluations of the same schedule agree without any
//! coordination.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Generates the GUID of one occurrence of a schedule.
///
/// Format: `hex(sha256(plan_guid \0 schedule_guid \0 scheduled_on_millis))[0..32]`
#[must_use]
pub fn occurrence_guid(
    plan_guid: &str,
    schedule_guid: &str,
    scheduled_on: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan_guid.as_bytes());
    hasher.update([0]);
    hasher.update(schedule_guid.as_bytes());
    hasher.update([0]);
    hasher.update(scheduled_on.timestamp_millis().to_be_bytes());
    let hash = hasher.finalize();

    // First 16 bytes = 32 hex chars = 128 bits.
    let (prefix, _) = hash.split_at(16);
    hex::encode(prefix)
}

/// Returns the participant's A/B bucket for a plan, in `0..100`.
///
/// The bucket depends only on the health code and the plan GUID, so a
/// participant keeps their group for as long as the plan exists.
#[must_use]
pub fn ab_bucket(health_code: &str, plan_guid: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(b"ab:");
    hasher.update(health_code.as_bytes());
    hasher.update([0]);
    hasher.update(plan_guid.as_bytes());
    let hash = hasher.finalize();

    let mut prefix = [0_u8; 8];
    let (head, _) = hash.split_at(8);
    prefix.copy_from_slice(head);
    // Always < 100, so the narrowing cannot truncate.
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (u64::from_be_bytes(prefix) % 100) as u8;
    bucket
}

/// Generates the event name published when an activity is finished.
///
/// Format: `activity:{activity_guid}:finished`
#[must_use]
pub fn finished_event_key(activity_guid: &str) -> String {
    format!("activity:{activity_guid}:finished")
}
