//! Rate cache error types.

use ratecache_common::CurrencyError;
use thiserror::Error;

/// Errors that can occur while resolving exchange rates.
///
/// Cloneable so one upstream failure can be handed to every caller that
/// was waiting on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// Malformed currency codes.
    #[error("Invalid currency pair: {0}")]
    InvalidPair(String),

    /// Provider unreachable, timed out, or returned unusable data.
    #[error("Upstream provider {provider} unavailable: {reason}")]
    UpstreamUnavailable { provider: String, reason: String },

    /// Provider has no historical endpoint.
    #[error("Provider {provider} does not serve historical rates")]
    HistoricalUnsupported { provider: String },

    /// Rejected cache or service configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Date missing, malformed, or in the future.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Negative or unparsable amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Request is structurally empty or inconsistent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No provider registered under this id.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl FxError {
    /// Build an upstream failure for `provider`.
    pub fn upstream(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        FxError::UpstreamUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Only upstream failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FxError::UpstreamUnavailable { .. })
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::InvalidPair(_) => "INVALID_PAIR",
            FxError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            FxError::HistoricalUnsupported { .. } => "HISTORICAL_UNSUPPORTED",
            FxError::InvalidConfig(_) => "INVALID_CONFIG",
            FxError::InvalidDate(_) => "INVALID_DATE",
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::InvalidRequest(_) => "INVALID_REQUEST",
            FxError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
        }
    }

    /// HTTP status an outer web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            FxError::InvalidPair(_)
            | FxError::InvalidDate(_)
            | FxError::InvalidAmount(_)
            | FxError::InvalidRequest(_)
            | FxError::UnknownProvider(_) => 400,
            FxError::UpstreamUnavailable { .. } => 503,
            FxError::HistoricalUnsupported { .. } | FxError::InvalidConfig(_) => 500,
        }
    }
}

impl From<CurrencyError> for FxError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::InvalidCode(_) => FxError::InvalidPair(err.to_string()),
            CurrencyError::InvalidAmount(msg) => FxError::InvalidAmount(msg),
        }
    }
}

/// Result type for rate operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FxError::InvalidPair("X".into()).status_code(), 400);
        assert_eq!(FxError::upstream("frankfurter", "timeout").status_code(), 503);
        assert_eq!(FxError::InvalidConfig("ttl".into()).status_code(), 500);
    }

    #[test]
    fn test_currency_error_becomes_invalid_pair() {
        let err: FxError = CurrencyError::InvalidCode("EURO".into()).into();
        assert_eq!(err.error_code(), "INVALID_PAIR");
        assert!(!err.is_retryable());
    }
}
