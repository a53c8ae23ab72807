//! Conversion and comparison result types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ratecache_common::{Currency, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::RateEntry;
use crate::error::FxResult;
use crate::provider::ProviderInfo;

/// Represents a completed currency conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    /// Input amount.
    pub input: Money,
    /// Output amount.
    pub output: Money,
    /// Rate used for conversion.
    pub rate: RateEntry,
    /// When the conversion was executed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Convert `input` at `rate`.
    pub fn new(input: Money, rate: RateEntry, executed_at: DateTime<Utc>) -> FxResult<Self> {
        let output = input.convert(rate.rate, rate.pair.quote.clone())?;
        Ok(Self {
            id: Uuid::now_v7(),
            input,
            output,
            rate,
            executed_at,
        })
    }
}

/// Convert amounts from one base into several quote currencies.
///
/// Each map in `conversions` is a set of `{quote: amount}` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConversionRequest {
    pub base: Currency,
    pub conversions: Vec<BTreeMap<Currency, Decimal>>,
}

impl BulkConversionRequest {
    pub fn new(base: Currency) -> Self {
        Self {
            base,
            conversions: Vec::new(),
        }
    }

    /// Add a single `{quote: amount}` request.
    pub fn with(mut self, quote: Currency, amount: Decimal) -> Self {
        self.conversions.push(BTreeMap::from([(quote, amount)]));
        self
    }

    /// Distinct quote currencies across all requests, sorted.
    pub fn quotes(&self) -> Vec<Currency> {
        let mut quotes: Vec<Currency> = self
            .conversions
            .iter()
            .flat_map(|c| c.keys().cloned())
            .collect();
        quotes.sort();
        quotes.dedup();
        quotes
    }
}

/// A quote currency that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedQuote {
    pub currency: String,
    pub error: String,
}

/// Result of a bulk conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConversion {
    pub base: Currency,
    /// Keyed `"<QUOTE>_<amount>"`, valued with the converted amount.
    pub conversions: BTreeMap<String, Decimal>,
    /// Quotes skipped because no rate was available.
    pub failed: Vec<FailedQuote>,
    pub timestamp: DateTime<Utc>,
}

impl BulkConversion {
    pub(crate) fn result_key(quote: &Currency, amount: Decimal) -> String {
        format!("{}_{}", quote, amount.normalize())
    }
}

/// Outcome for one currency in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedRate {
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparedRate {
    pub(crate) fn ok(currency: impl Into<String>, rate: Decimal) -> Self {
        Self {
            currency: currency.into(),
            rate: Some(rate),
            error: None,
        }
    }

    pub(crate) fn failed(currency: impl Into<String>, error: impl ToString) -> Self {
        Self {
            currency: currency.into(),
            rate: None,
            error: Some(error.to_string()),
        }
    }
}

/// Rates for one base against several quotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateComparison {
    pub base: Currency,
    /// One entry per requested quote, in request order.
    pub rates: Vec<ComparedRate>,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl RateComparison {
    /// Requested currencies, in order.
    pub fn compared_currencies(&self) -> Vec<&str> {
        self.rates.iter().map(|r| r.currency.as_str()).collect()
    }

    /// Lookup the rate resolved for `currency`, if any.
    pub fn rate_for(&self, currency: &str) -> Option<Decimal> {
        self.rates
            .iter()
            .find(|r| r.currency == currency)
            .and_then(|r| r.rate)
    }
}

/// A well-known currency and its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub name: &'static str,
}

/// The supported currency table.
#[derive(Debug, Clone, Serialize)]
pub struct CurrencyListing {
    pub currencies: Vec<CurrencyInfo>,
    pub count: usize,
}

/// Registered providers and the default one.
#[derive(Debug, Clone, Serialize)]
pub struct ProvidersOverview {
    pub providers: Vec<ProviderInfo>,
    pub default_provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use ratecache_common::CurrencyPair;

    fn entry(rate: Decimal) -> RateEntry {
        let now = Utc::now();
        RateEntry {
            pair: CurrencyPair::new(Currency::usd(), Currency::eur()),
            as_of: None,
            rate,
            fetched_at: now,
            expires_at: now + Duration::seconds(60),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_conversion_output() {
        let input = Money::new(dec!(1000), Currency::usd());
        let conversion = Conversion::new(input, entry(dec!(0.92)), Utc::now()).unwrap();

        assert_eq!(conversion.output, Money::new(dec!(920), Currency::eur()));
        assert_eq!(conversion.rate.pair.to_string(), "USD/EUR");
    }

    #[test]
    fn test_zero_amount_conversion() {
        let input = Money::new(Decimal::ZERO, Currency::usd());
        let conversion = Conversion::new(input, entry(dec!(0.92)), Utc::now()).unwrap();

        assert!(conversion.output.value.is_zero());
    }

    #[test]
    fn test_overflowing_conversion_is_invalid_amount() {
        let input = Money::new(Decimal::MAX, Currency::usd());

        assert!(matches!(
            Conversion::new(input, entry(dec!(2)), Utc::now()),
            Err(crate::error::FxError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_bulk_request_quotes_are_unique() {
        let request = BulkConversionRequest::new(Currency::usd())
            .with(Currency::eur(), dec!(10))
            .with(Currency::gbp(), dec!(5))
            .with(Currency::eur(), dec!(20));

        assert_eq!(request.quotes(), vec![Currency::eur(), Currency::gbp()]);
    }

    #[test]
    fn test_bulk_request_deserializes_currency_keys() {
        let request: BulkConversionRequest = serde_json::from_str(
            r#"{"base": "usd", "conversions": [{"EUR": "100"}, {"jpy": "5", "GBP": "1.5"}]}"#,
        )
        .unwrap();

        assert_eq!(request.base, Currency::usd());
        assert_eq!(request.quotes().len(), 3);
    }

    #[test]
    fn test_result_key_normalizes_amount() {
        assert_eq!(BulkConversion::result_key(&Currency::eur(), dec!(100.00)), "EUR_100");
        assert_eq!(BulkConversion::result_key(&Currency::eur(), dec!(2.50)), "EUR_2.5");
    }
}
