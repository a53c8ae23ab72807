//! Shared JSON-over-HTTP plumbing for upstream providers.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{FxError, FxResult};

pub(crate) struct HttpClient {
    client: Client,
    provider: &'static str,
}

impl HttpClient {
    pub(crate) fn new(provider: &'static str, timeout: Duration) -> FxResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ratecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FxError::InvalidConfig(format!("{provider} HTTP client: {e}")))?;

        Ok(Self { client, provider })
    }

    pub(crate) fn provider(&self) -> &'static str {
        self.provider
    }

    pub(crate) fn upstream(&self, reason: impl Into<String>) -> FxError {
        FxError::upstream(self.provider, reason)
    }

    /// GET `url` and decode a JSON body, mapping every failure to
    /// [`FxError::UpstreamUnavailable`].
    pub(crate) async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> FxResult<Value> {
        debug!(provider = self.provider, url, "Requesting upstream rate");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let json = serde_json::from_str::<Value>(&body);

        if !status.is_success() {
            let detail = json
                .ok()
                .as_ref()
                .and_then(error_detail)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(self.upstream(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        json.map_err(|e| self.upstream(format!("malformed payload: {e}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> FxError {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        self.upstream(reason)
    }
}

/// Pull a human-readable message out of an error payload.
pub(crate) fn error_detail(json: &Value) -> Option<String> {
    for key in ["error", "error-type", "message"] {
        match json.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(s)) = obj.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }

    // CurrencyAPI: {"errors": {"field": ["message", ...]}} or {"field": {"message": ...}}
    let first = json.get("errors")?.as_object()?.values().next()?;
    match first {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Read a JSON number or numeric string as a decimal.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            text.parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(&text).ok())
        }
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

/// An upstream rate, sent either as a JSON number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RateValue(pub Decimal);

impl<'de> Deserialize<'de> for RateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decimal_from_json(&value)
            .map(RateValue)
            .ok_or_else(|| de::Error::custom(format!("rate {value} is not a number")))
    }
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
