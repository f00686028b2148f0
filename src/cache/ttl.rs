//! Status-driven TTL policy for the fast tier.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::EventStatus;

const LIVE_TTL_MIN_SECS: u64 = 10;
const LIVE_TTL_MAX_SECS: u64 = 30;

/// Upstream freshness hint attached to an origin response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHint {
    /// Absolute expiry, epoch seconds.
    #[serde(default, alias = "expires_at")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl CacheHint {
    /// Parses a `Cache-Control` header value (`max-age=N`).
    pub fn from_cache_control(header: &str) -> Option<Self> {
        let max_age = header
            .split(',')
            .map(str::trim)
            .find_map(|directive| directive.strip_prefix("max-age="))
            .and_then(|v| v.trim().parse::<u64>().ok())?;
        Some(Self {
            expires: None,
            max_age: Some(max_age),
        })
    }

    /// Remaining lifetime at `now`. `max_age` wins over `expires` when both are set.
    pub fn ttl(&self, now: i64) -> Option<Duration> {
        if let Some(age) = self.max_age.filter(|a| *a > 0) {
            return Some(Duration::from_secs(age));
        }
        let remaining = self.expires?.saturating_sub(now);
        (remaining > 0).then(|| Duration::from_secs(remaining as u64))
    }

    pub fn merge(self, fallback: Option<CacheHint>) -> CacheHint {
        let fallback = fallback.unwrap_or_default();
        CacheHint {
            expires: self.expires.or(fallback.expires),
            max_age: self.max_age.or(fallback.max_age),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub live: Duration,
    pub not_started: Duration,
    pub completed: Duration,
    pub unknown: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            live: Duration::from_secs(15),
            not_started: Duration::from_secs(15 * 60),
            completed: Duration::from_secs(24 * 3600),
            unknown: Duration::from_secs(15),
        }
    }
}

impl TtlPolicy {
    /// Default table with the live TTL clamped into 10..=30 seconds.
    pub fn with_live_secs(secs: u64) -> Self {
        let live = Duration::from_secs(secs.clamp(LIVE_TTL_MIN_SECS, LIVE_TTL_MAX_SECS));
        Self {
            live,
            unknown: live,
            ..Self::default()
        }
    }

    pub fn for_status(&self, status: EventStatus) -> Duration {
        match status {
            EventStatus::Live => self.live,
            EventStatus::NotStarted => self.not_started,
            EventStatus::Completed | EventStatus::Abandoned | EventStatus::Cancelled => {
                self.completed
            }
            EventStatus::Unknown => self.unknown,
        }
    }

    /// Origin hints override the status table when they yield a positive TTL.
    /// A hint never outlives the completed tier.
    pub fn resolve(&self, status: EventStatus, hint: Option<&CacheHint>, now: i64) -> Duration {
        hint.and_then(|h| h.ttl(now))
            .map(|ttl| ttl.min(self.completed))
            .unwrap_or_else(|| self.for_status(status))
    }

    /// Lifetime left for a record written at `updated_at`. Terminal records
    /// get the full tier TTL.
    pub fn remaining(&self, status: EventStatus, updated_at: i64, now: i64) -> Duration {
        let full = self.for_status(status);
        if status.is_terminal() {
            return full;
        }
        let age = now.saturating_sub(updated_at).max(0) as u64;
        full.saturating_sub(Duration::from_secs(age))
    }

    /// Whether a durable record written at `updated_at` can still be served.
    pub fn is_fresh(&self, status: EventStatus, updated_at: i64, now: i64) -> bool {
        if status.is_terminal() {
            return true;
        }
        let age = now.saturating_sub(updated_at).max(0) as u64;
        age <= self.for_status(status).as_secs()
    }
}
