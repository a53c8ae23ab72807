//! Time utilities and constants for rate caching.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Service timing constants.
pub mod constants {
    use super::Duration;

    /// Default freshness window for cached rates (5 minutes).
    pub fn default_rate_ttl() -> Duration {
        Duration::seconds(300)
    }

    /// Longest accepted freshness window (365 days).
    pub fn max_rate_ttl() -> Duration {
        Duration::days(365)
    }

    /// Default upstream request timeout (30 seconds).
    pub fn provider_request_timeout() -> Duration {
        Duration::seconds(30)
    }

    /// Default bound on cached entries.
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now()
    }
}

/// An entry expiring at `expires_at` is fresh strictly before that instant.
pub fn is_fresh(expires_at: Timestamp, at: Timestamp) -> bool {
    at < expires_at
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
