//! Scheduler configuration.
//!
//! Defaults suit a mobile client asking for the next few days of activities.
//! Every value can be overridden through `CADENCE_*` environment variables.

use serde::{Deserialize, Serialize};

use cadence_core::ClientInfoCache;

use crate::error::{Error, Result};
use crate::model::ENROLLMENT_EVENT;

const ENV_MAX_OCCURRENCES: &str = "CADENCE_MAX_OCCURRENCES_PER_SCHEDULE";
const ENV_MAX_LOOKAHEAD_DAYS: &str = "CADENCE_MAX_LOOKAHEAD_DAYS";
const ENV_LOOKBACK_DAYS: &str = "CADENCE_LOOKBACK_DAYS";
const ENV_DEFAULT_EVENT: &str = "CADENCE_DEFAULT_EVENT";
const ENV_CLIENT_INFO_CACHE_CAPACITY: &str = "CADENCE_CLIENT_INFO_CACHE_CAPACITY";

const DEFAULT_MAX_OCCURRENCES: usize = 1000;
const DEFAULT_MAX_LOOKAHEAD_DAYS: u32 = 4;
const DEFAULT_LOOKBACK_DAYS: u32 = 14;
/// Upper bound for both look-ahead and look-back, about ten years.
const MAX_WINDOW_DAYS: u32 = 3650;

/// Limits and defaults used when computing schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Most occurrences a single schedule may produce in one window.
    pub max_occurrences_per_schedule: usize,
    /// Furthest a request's window may reach past now, in days.
    pub max_lookahead_days: u32,
    /// How far before now a request's window starts, in days, when the
    /// caller does not set a window start.
    pub lookback_days: u32,
    /// Event that anchors schedules without an explicit event.
    pub default_event: String,
    /// Capacity of the `User-Agent` parse cache.
    pub client_info_cache_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_occurrences_per_schedule: DEFAULT_MAX_OCCURRENCES,
            max_lookahead_days: DEFAULT_MAX_LOOKAHEAD_DAYS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            default_event: ENROLLMENT_EVENT.to_string(),
            client_info_cache_capacity: ClientInfoCache::DEFAULT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value does not parse or fails
    /// [`SchedulerConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value does not parse or fails
    /// [`SchedulerConfig::validate`].
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_occurrences_per_schedule: parse_env(&get_env, ENV_MAX_OCCURRENCES)?
                .unwrap_or(defaults.max_occurrences_per_schedule),
            max_lookahead_days: parse_env(&get_env, ENV_MAX_LOOKAHEAD_DAYS)?
                .unwrap_or(defaults.max_lookahead_days),
            lookback_days: parse_env(&get_env, ENV_LOOKBACK_DAYS)?
                .unwrap_or(defaults.lookback_days),
            default_event: get_env(ENV_DEFAULT_EVENT)
                .map(|raw| raw.trim().to_string())
                .unwrap_or(defaults.default_event),
            client_info_cache_capacity: parse_env(&get_env, ENV_CLIENT_INFO_CACHE_CAPACITY)?
                .unwrap_or(defaults.client_info_cache_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a limit is zero, a window bound
    /// exceeds ten years, or the default event is blank.
    pub fn validate(&self) -> Result<()> {
        if self.max_occurrences_per_schedule == 0 {
            return Err(Error::configuration(
                "max_occurrences_per_schedule must be greater than zero",
            ));
        }
        if self.max_lookahead_days == 0 {
            return Err(Error::configuration(
                "max_lookahead_days must be greater than zero",
            ));
        }
        for (name, days) in [
            ("max_lookahead_days", self.max_lookahead_days),
            ("lookback_days", self.lookback_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(Error::configuration(format!(
                    "{name} must be at most {MAX_WINDOW_DAYS}, got {days}"
                )));
            }
        }
        if self.default_event.is_empty() {
            return Err(Error::configuration("default_event must not be blank"));
        }
        Ok(())
    }

    /// Creates the `User-Agent` parse cache sized by this configuration.
    #[must_use]
    pub fn client_info_cache(&self) -> ClientInfoCache {
        ClientInfoCache::new(self.client_info_cache_capacity)
    }
}

fn parse_env<F, T>(get_env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = get_env(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        Error::configuration(format!(
            "{key} must be a non-negative integer, got '{raw}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SchedulerConfig::from_env_with(env(&[])).unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.max_occurrences_per_schedule, 1000);
        assert_eq!(config.max_lookahead_days, 4);
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.default_event, "enrollment");
        assert_eq!(config.client_info_cache_capacity, 500);
    }

    #[test]
    fn overrides_from_env() {
        let config = SchedulerConfig::from_env_with(env(&[
            ("CADENCE_MAX_OCCURRENCES_PER_SCHEDULE", "50"),
            ("CADENCE_MAX_LOOKAHEAD_DAYS", " 14 "),
            ("CADENCE_LOOKBACK_DAYS", "2"),
            ("CADENCE_DEFAULT_EVENT", "activation"),
        ]))
        .unwrap();
        assert_eq!(config.max_occurrences_per_schedule, 50);
        assert_eq!(config.max_lookahead_days, 14);
        assert_eq!(config.lookback_days, 2);
        assert_eq!(config.default_event, "activation");
    }

    #[test]
    fn rejects_bad_values() {
        let err = SchedulerConfig::from_env_with(env(&[("CADENCE_MAX_LOOKAHEAD_DAYS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CADENCE_MAX_LOOKAHEAD_DAYS"));

        let err =
            SchedulerConfig::from_env_with(env(&[("CADENCE_MAX_OCCURRENCES_PER_SCHEDULE", "0")]))
                .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        let err = SchedulerConfig::from_env_with(env(&[("CADENCE_LOOKBACK_DAYS", "4000000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("lookback_days must be at most"));
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"max_lookahead_days": 7}"#).unwrap();
        assert_eq!(config.max_lookahead_days, 7);
        assert_eq!(config.max_occurrences_per_schedule, 1000);
    }
}
