//! ExchangeRate-API provider (latest rates only).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ratecache_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::http::{error_detail, trim_base, HttpClient, RateValue};
use crate::error::FxResult;
use crate::provider::{ProviderInfo, RateProvider};

pub const ID: &str = "exchangerate_api";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: HashMap<String, RateValue>,
}

/// `GET /v4/latest/{base}`, which returns every quote for the base.
pub struct ExchangeRateApiProvider {
    http: HttpClient,
    base_url: String,
}

impl ExchangeRateApiProvider {
    pub fn new(base_url: &str, timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            http: HttpClient::new(ID, timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

pub(crate) fn parse_rates(json: &Value, quote: &Currency) -> Result<Decimal, String> {
    if json.get("result").and_then(Value::as_str) == Some("error") {
        let detail = error_detail(json).unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("API error: {detail}"));
    }

    let response =
        LatestResponse::deserialize(json).map_err(|e| format!("unexpected response: {e}"))?;

    response
        .rates
        .get(quote.code())
        .map(|rate| rate.0)
        .ok_or_else(|| format!("target currency {quote} not supported"))
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn id(&self) -> &str {
        self.http.provider()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: ID.to_string(),
            name: "ExchangeRate-API".to_string(),
            requires_key: false,
            free_tier: true,
            supports_historical: false,
        }
    }

    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        let url = format!("{}/v4/latest/{}", self.base_url, pair.base);
        let json = self.http.get_json(&url, &[]).await?;

        parse_rates(&json, &pair.quote).map_err(|reason| self.http.upstream(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_latest_payload() {
        let body = json!({
            "base": "USD",
            "date": "2024-05-10",
            "time_last_updated": 1715299201,
            "rates": {"USD": 1, "EUR": 0.928, "JPY": 155.7}
        });

        assert_eq!(parse_rates(&body, &Currency::jpy()).unwrap(), dec!(155.7));
    }

    #[test]
    fn test_parse_error_result() {
        let body = json!({"result": "error", "error-type": "unsupported-code"});

        let err = parse_rates(&body, &Currency::eur()).unwrap_err();
        assert_eq!(err, "API error: unsupported-code");
    }

    #[test]
    fn test_parse_unsupported_quote() {
        let body = json!({"base": "USD", "rates": {"USD": 1}});

        let err = parse_rates(&body, &Currency::eur()).unwrap_err();
        assert_eq!(err, "target currency EUR not supported");

        let err = parse_rates(&json!({"base": "USD"}), &Currency::eur()).unwrap_err();
        assert!(err.contains("rates"));
    }

    #[tokio::test]
    async fn test_historical_is_unsupported() {
        let provider =
            ExchangeRateApiProvider::new("http://localhost:1", Duration::from_secs(1)).unwrap();
        let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = provider.fetch_historical(&pair, date).await.unwrap_err();
        assert_eq!(err.error_code(), "HISTORICAL_UNSUPPORTED");
    }
}
