//! Monetary types for exchange rate lookups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CurrencyError;

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn parse(value: &str, currency: Currency) -> Result<Self, CurrencyError> {
        let value = value
            .trim()
            .parse::<Decimal>()
            .map_err(|e| CurrencyError::InvalidAmount(format!("{value:?}: {e}")))?;
        Ok(Self { value, currency })
    }

    /// Re-denominate this amount into `currency` at `rate`.
    ///
    /// Fails instead of overflowing when the product exceeds `Decimal`.
    pub fn convert(&self, rate: Decimal, currency: Currency) -> Result<Money, CurrencyError> {
        let value = self.value.checked_mul(rate).ok_or_else(|| {
            CurrencyError::InvalidAmount(format!(
                "{} at rate {rate} overflows {currency}",
                self
            ))
        })?;
        Ok(Money { value, currency })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// ISO 4217 style currency code: three ASCII letters, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and normalize a currency code.
    ///
    /// Surrounding whitespace is ignored and lowercase input is accepted;
    /// anything other than exactly three ASCII letters is rejected.
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidCode(code.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }

    pub fn jpy() -> Self {
        Self("JPY".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

/// A currency pair identifying an exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the one being priced).
    pub base: Currency,
    /// Quote currency (pricing currency).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Parse both legs of a pair from raw codes.
    pub fn parse(base: &str, quote: &str) -> Result<Self, CurrencyError> {
        Ok(Self {
            base: Currency::parse(base)?,
            quote: Currency::parse(quote)?,
        })
    }

    /// Whether base and quote are the same currency.
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = CurrencyError;

    /// Parses `"USD/EUR"` or `"USDEUR"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((base, quote)) => Self::parse(base, quote),
            None if s.len() == 6 && s.is_ascii() => Self::parse(&s[..3], &s[3..]),
            None => Err(CurrencyError::InvalidCode(s.to_string())),
        }
    }
}
