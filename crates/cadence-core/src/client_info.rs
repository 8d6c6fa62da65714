//! Client identification parsed from the `User-Agent` header.
//!
//! Clients that follow the prescribed format identify their app, OS and SDK:
//!
//! ```text
//! appName/appVersion (osName; osVersion) sdkName/sdkVersion
//! appName/appVersion sdkName/sdkVersion
//! ```
//!
//! For example `Asthma/26 (Unknown iPhone; iPhone OS 9.1) BridgeSDK/4` or
//! `Unknown Client/14 JavaSDK/10`. Anything else (browsers, health checks)
//! is an unknown client with every field empty; no filtering is applied to
//! such clients.
//!
//! Because header values are client-controlled, parsed values are memoised in
//! a [`ClientInfoCache`] with a fixed capacity instead of an unbounded map.
//! The cache is owned by whoever parses headers and injected where needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Parsed representation of a client's `User-Agent` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Application name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Application build number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<u32>,
    /// Operating system or device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    /// Operating system version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// SDK name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_name: Option<String>,
    /// SDK version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<u32>,
}

impl ClientInfo {
    /// Returns the client info used for headers that do not follow the format.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Returns true if no field could be parsed.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }

    /// Parses a `User-Agent` header value without caching.
    ///
    /// Values that match neither the long nor the short format yield
    /// [`ClientInfo::unknown`].
    #[must_use]
    pub fn parse(user_agent: &str) -> Self {
        if user_agent.trim().is_empty() {
            return Self::unknown();
        }
        parse_long(user_agent)
            .or_else(|| parse_short(user_agent))
            .unwrap_or_default()
    }

    /// Returns true if this client's app version falls within the optional range.
    ///
    /// A client without a declared app version matches every range, and an
    /// absent boundary does not constrain the version.
    #[must_use]
    pub fn is_targeted_app_version(&self, min: Option<u32>, max: Option<u32>) -> bool {
        let Some(version) = self.app_version else {
            return true;
        };
        min.is_none_or(|min| version >= min) && max.is_none_or(|max| version <= max)
    }
}

/// `appName/appVersion sdkName/sdkVersion`
const SHORT_FORMAT: &str = r"^([^/]+)/([0-9]+)\s([^/(]*)/([0-9]+)$";

/// `appName/appVersion (osName; osVersion) sdkName/sdkVersion`
const LONG_FORMAT: &str = r"^([^/]+)/([0-9]+)\s\(([^;]+);([^)]*)\)\s([^/]*)/([0-9]+)$";

#[allow(clippy::expect_used)]
static SHORT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SHORT_FORMAT).expect("short user agent pattern compiles"));

#[allow(clippy::expect_used)]
static LONG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LONG_FORMAT).expect("long user agent pattern compiles"));

fn text(caps: &Captures<'_>, group: usize) -> Option<String> {
    caps.get(group).map(|m| m.as_str().trim().to_string())
}

/// Versions too large for `u32` make the whole header unparseable.
fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn parse_long(user_agent: &str) -> Option<ClientInfo> {
    let caps = LONG_PATTERN.captures(user_agent)?;
    Some(ClientInfo {
        app_name: text(&caps, 1),
        app_version: Some(number(&caps, 2)?),
        os_name: text(&caps, 3),
        os_version: text(&caps, 4),
        sdk_name: text(&caps, 5),
        sdk_version: Some(number(&caps, 6)?),
    })
}

fn parse_short(user_agent: &str) -> Option<ClientInfo> {
    let caps = SHORT_PATTERN.captures(user_agent)?;
    Some(ClientInfo {
        app_name: text(&caps, 1),
        app_version: Some(number(&caps, 2)?),
        os_name: None,
        os_version: None,
        sdk_name: text(&caps, 3),
        sdk_version: Some(number(&caps, 4)?),
    })
}

/// Bounded least-recently-used cache of parsed [`ClientInfo`] values.
///
/// Keyed by the raw header value. When full, the entry that was used least
/// recently is evicted. A capacity of zero disables caching.
#[derive(Debug)]
pub struct ClientInfoCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    clock: u64,
}

#[derive(Debug)]
struct CacheEntry {
    info: ClientInfo,
    last_used: u64,
}

impl ClientInfoCache {
    /// Default number of distinct headers retained.
    pub const DEFAULT_CAPACITY: usize = 500;

    /// Creates an empty cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the parsed client info for a header value, parsing on a miss.
    ///
    /// Blank values are never cached.
    #[must_use]
    pub fn get(&self, user_agent: &str) -> ClientInfo {
        if user_agent.trim().is_empty() {
            return ClientInfo::unknown();
        }
        if self.capacity == 0 {
            return ClientInfo::parse(user_agent);
        }

        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        inner.clock += 1;
        let now = inner.clock;

        if let Some(entry) = inner.entries.get_mut(user_agent) {
            let previous = std::mem::replace(&mut entry.last_used, now);
            let info = entry.info.clone();
            inner.recency.remove(&previous);
            inner.recency.insert(now, user_agent.to_string());
            return info;
        }

        while inner.entries.len() >= self.capacity {
            let Some((_, evicted)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&evicted);
        }

        let info = ClientInfo::parse(user_agent);
        inner.entries.insert(
            user_agent.to_string(),
            CacheEntry {
                info: info.clone(),
                last_used: now,
            },
        );
        inner.recency.insert(now, user_agent.to_string());
        info
    }
}

impl Default for ClientInfoCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_format() {
        let info = ClientInfo::parse("Asthma/26 (Unknown iPhone; iPhone OS 9.1) BridgeSDK/4");
        assert_eq!(info.app_name.as_deref(), Some("Asthma"));
        assert_eq!(info.app_version, Some(26));
        assert_eq!(info.os_name.as_deref(), Some("Unknown iPhone"));
        assert_eq!(info.os_version.as_deref(), Some("iPhone OS 9.1"));
        assert_eq!(info.sdk_name.as_deref(), Some("BridgeSDK"));
        assert_eq!(info.sdk_version, Some(4));
    }

    #[test]
    fn parses_short_format() {
        let info = ClientInfo::parse("Unknown Client/14 JavaSDK/10");
        assert_eq!(info.app_name.as_deref(), Some("Unknown Client"));
        assert_eq!(info.app_version, Some(14));
        assert_eq!(info.os_name, None);
        assert_eq!(info.sdk_name.as_deref(), Some("JavaSDK"));
        assert_eq!(info.sdk_version, Some(10));
    }

    #[test]
    fn unformatted_headers_are_unknown() {
        for header in [
            "",
            "Amazon Route 53 Health Check Service; ref:c97cd53f; report http://amzn.to/1vsZADi",
            "Integration Tests (Linux/3.13.0-36-generic) JavaSDK/3",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_5) AppleWebKit/537.36",
            "App/abc SDK/1",
        ] {
            assert!(ClientInfo::parse(header).is_unknown(), "{header}");
        }
    }

    #[test]
    fn oversized_versions_are_unknown() {
        assert!(ClientInfo::parse("Asthma/99999999999 BridgeSDK/4").is_unknown());
        assert!(ClientInfo::parse("Asthma/26 (iPhone; 9.1) BridgeSDK/99999999999").is_unknown());
    }

    #[test]
    fn targeting_without_app_version_matches_everything() {
        let info = ClientInfo::unknown();
        assert!(info.is_targeted_app_version(Some(10), Some(20)));
    }

    #[test]
    fn targeting_respects_inclusive_bounds() {
        let info = ClientInfo::parse("Asthma/26 BridgeSDK/4");
        assert!(info.is_targeted_app_version(None, None));
        assert!(info.is_targeted_app_version(Some(26), Some(26)));
        assert!(!info.is_targeted_app_version(Some(27), None));
        assert!(!info.is_targeted_app_version(None, Some(25)));
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = ClientInfoCache::new(2);
        let a = "A/1 SDK/1";
        let b = "B/2 SDK/1";
        let c = "C/3 SDK/1";

        assert_eq!(cache.get(a).app_version, Some(1));
        assert_eq!(cache.get(b).app_version, Some(2));
        // Touch `a` so that `b` becomes the eviction candidate.
        let _ = cache.get(a);
        let _ = cache.get(c);

        assert_eq!(cache.len(), 2);
        let inner = cache.inner.lock().unwrap();
        assert!(inner.entries.contains_key(a));
        assert!(inner.entries.contains_key(c));
        assert!(!inner.entries.contains_key(b));
    }

    #[test]
    fn cache_does_not_store_blank_headers() {
        let cache = ClientInfoCache::default();
        assert!(cache.get("  ").is_unknown());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ClientInfoCache::new(0);
        assert_eq!(cache.get("A/1 SDK/1").app_version, Some(1));
        assert!(cache.is_empty());
    }
}
