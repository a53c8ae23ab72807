//! Frankfurter (ECB reference rates) provider.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ratecache_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::http::{error_detail, trim_base, HttpClient, RateValue};
use crate::error::FxResult;
use crate::provider::{ProviderInfo, RateProvider};

pub const ID: &str = "frankfurter";

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: HashMap<String, RateValue>,
}

/// `GET /latest?from=B&to=Q` and `GET /{date}?from=B&to=Q`.
pub struct FrankfurterProvider {
    http: HttpClient,
    base_url: String,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            http: HttpClient::new(ID, timeout)?,
            base_url: trim_base(base_url),
        })
    }

    async fn request(&self, path: &str, pair: &CurrencyPair) -> FxResult<Decimal> {
        let url = format!("{}/{}", self.base_url, path);
        let json = self
            .http
            .get_json(&url, &[("from", pair.base.code()), ("to", pair.quote.code())])
            .await?;

        parse_rates(&json, &pair.quote).map_err(|reason| self.http.upstream(reason))
    }
}

/// Extract `rates[quote]` from a Frankfurter response body.
pub(crate) fn parse_rates(json: &Value, quote: &Currency) -> Result<Decimal, String> {
    if json.get("rates").is_none() {
        if let Some(detail) = error_detail(json) {
            return Err(format!("API error: {detail}"));
        }
    }

    let response = FrankfurterResponse::deserialize(json)
        .map_err(|e| format!("unexpected response: {e}"))?;

    response
        .rates
        .get(quote.code())
        .map(|rate| rate.0)
        .ok_or_else(|| format!("target currency {quote} not in response"))
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn id(&self) -> &str {
        self.http.provider()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: ID.to_string(),
            name: "Frankfurter".to_string(),
            requires_key: false,
            free_tier: true,
            supports_historical: true,
        }
    }

    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        self.request("latest", pair).await
    }

    async fn fetch_historical(&self, pair: &CurrencyPair, date: NaiveDate) -> FxResult<Decimal> {
        self.request(&date.format("%Y-%m-%d").to_string(), pair).await
    }
}
