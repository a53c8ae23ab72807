//! Cache and service configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;
use ratecache_common::{constants, DurationExt, Timestamp};

use crate::error::{FxError, FxResult};

/// Configuration for a single rate cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCacheConfig {
    /// Freshness window for cached rates.
    pub ttl: Duration,
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Serve a stale entry when the upstream fetch fails.
    pub serve_stale_on_error: bool,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::default_rate_ttl(),
            max_entries: constants::DEFAULT_MAX_ENTRIES,
            serve_stale_on_error: false,
        }
    }
}

impl RateCacheConfig {
    /// Build a validated configuration.
    pub fn new(ttl_seconds: i64, max_entries: usize, serve_stale_on_error: bool) -> FxResult<Self> {
        let ttl = Duration::try_seconds(ttl_seconds).ok_or_else(|| {
            FxError::InvalidConfig(format!("ttl out of range: {ttl_seconds}s"))
        })?;
        let config = Self {
            ttl,
            max_entries,
            serve_stale_on_error,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.ttl <= Duration::zero() {
            return Err(FxError::InvalidConfig(format!(
                "ttl must be positive, got {}s",
                self.ttl.num_seconds()
            )));
        }

        if self.ttl > constants::max_rate_ttl() {
            return Err(FxError::InvalidConfig(format!(
                "ttl must be at most {}s, got {}s",
                constants::max_rate_ttl().num_seconds(),
                self.ttl.num_seconds()
            )));
        }

        if self.max_entries == 0 {
            return Err(FxError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// When an entry fetched at `fetched_at` stops being fresh.
    pub fn expiry(&self, fetched_at: Timestamp) -> FxResult<Timestamp> {
        fetched_at.checked_add_signed(self.ttl).ok_or_else(|| {
            FxError::InvalidConfig(format!(
                "ttl of {}s overflows expiry from {fetched_at}",
                self.ttl.num_seconds()
            ))
        })
    }
}

/// Upstream endpoints and credentials.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Frankfurter base URL.
    pub frankfurter_url: String,
    /// ExchangeRate-API base URL.
    pub exchangerate_api_url: String,
    /// CurrencyAPI base URL.
    pub currency_api_url: String,
    /// CurrencyAPI key; the provider is only registered when set.
    pub currency_api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: StdDuration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            frankfurter_url: "https://api.frankfurter.app".to_string(),
            exchangerate_api_url: "https://api.exchangerate-api.com".to_string(),
            currency_api_url: "https://api.currencyapi.com".to_string(),
            currency_api_key: None,
            request_timeout: constants::provider_request_timeout().as_std(),
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Cache settings shared by every provider's cache.
    pub cache: RateCacheConfig,
    /// Provider endpoints.
    pub providers: ProviderSettings,
    /// Provider used when a request names none, and as the fallback.
    pub default_provider: String,
    /// Log level.
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: RateCacheConfig::default(),
            providers: ProviderSettings::default(),
            default_provider: "frankfurter".to_string(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ttl) = lookup("RATECACHE_TTL_SECONDS")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(Duration::try_seconds)
        {
            config.cache.ttl = ttl;
        }

        if let Some(max) = lookup("RATECACHE_MAX_ENTRIES").and_then(|v| v.parse().ok()) {
            config.cache.max_entries = max;
        }

        if let Some(flag) = lookup("RATECACHE_SERVE_STALE").and_then(|v| parse_flag(&v)) {
            config.cache.serve_stale_on_error = flag;
        }

        if let Some(provider) = lookup("RATECACHE_DEFAULT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Some(secs) = lookup("RATECACHE_PROVIDER_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.providers.request_timeout = StdDuration::from_secs(secs);
        }

        if let Some(url) = lookup("FRANKFURTER_URL") {
            config.providers.frankfurter_url = url;
        }

        if let Some(url) = lookup("EXCHANGERATE_API_URL") {
            config.providers.exchangerate_api_url = url;
        }

        if let Some(url) = lookup("CURRENCY_API_URL") {
            config.providers.currency_api_url = url;
        }

        config.providers.currency_api_key = lookup("CURRENCY_API_KEY").filter(|k| !k.is_empty());

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(flag) = lookup("RATECACHE_LOG_JSON").and_then(|v| parse_flag(&v)) {
            config.log_json = flag;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate().map_err(|e| e.to_string())?;

        if self.default_provider.is_empty() {
            return Err("Default provider cannot be empty".to_string());
        }

        if self.providers.request_timeout.is_zero() {
            return Err("Provider timeout cannot be 0".to_string());
        }

        if self.default_provider == "currency_api" && self.providers.currency_api_key.is_none() {
            return Err("currency_api requires CURRENCY_API_KEY".to_string());
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
