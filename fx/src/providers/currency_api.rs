//! CurrencyAPI provider (requires an API key).

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

pub const ID: &str = "currency_api";

#[derive(Debug, Deserialize)]
struct CurrencyApiResponse {
    data: HashMap<String, CurrencyValue>,
}

#[derive(Debug, Deserialize)]
struct CurrencyValue {
    value: RateValue,
}

pub struct CurrencyApiProvider {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl CurrencyApiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            http: HttpClient::new(ID, timeout)?,
            base_url: trim_base(base_url),
            api_key: api_key.to_string(),
        })
    }

    async fn request(
        &self,
        path: &str,
        pair: &CurrencyPair,
        date: Option<&str>,
    ) -> FxResult<Decimal> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query = vec![
            ("base_currency", pair.base.code()),
            ("currencies", pair.quote.code()),
            ("apikey", self.api_key.as_str()),
        ];
        if let Some(date) = date {
            query.push(("date", date));
        }

        let json = self.http.get_json(&url, &query).await?;
        parse_data(&json, &pair.quote).map_err(|reason| self.http.upstream(reason))
    }
}

/// Extract `data[quote].value`.
pub(crate) fn parse_data(json: &Value, quote: &Currency) -> Result<Decimal, String> {
    if json.get("errors").is_some() {
        let detail = error_detail(json).unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("API error: {detail}"));
    }

    let response = CurrencyApiResponse::deserialize(json)
        .map_err(|e| format!("unexpected response: {e}"))?;

    response
        .data
        .get(quote.code())
        .map(|entry| entry.value.0)
        .ok_or_else(|| format!("target currency {quote} not supported"))
}

#[async_trait]
impl RateProvider for CurrencyApiProvider {
    fn id(&self) -> &str {
        self.http.provider()
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: ID.to_string(),
            name: "CurrencyAPI".to_string(),
            requires_key: true,
            free_tier: false,
            supports_historical: true,
        }
    }

    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
        self.request("v3/latest", pair, None).await
    }

    async fn fetch_historical(&self, pair: &CurrencyPair, date: NaiveDate) -> FxResult<Decimal> {
        let date = date.format("%Y-%m-%d").to_string();
        self.request("v3/historical", pair, Some(&date)).await
    }
}
