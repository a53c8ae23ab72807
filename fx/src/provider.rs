//! Rate provider traits and test doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use ratecache_common::CurrencyPair;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{FxError, FxResult};

/// Static description of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    /// Registry id, e.g. `frankfurter`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether requests need an API key.
    pub requires_key: bool,
    /// Whether a free tier exists.
    pub free_tier: bool,
    /// Whether `fetch_historical` is implemented.
    pub supports_historical: bool,
}

/// Trait for upstream exchange rate sources.
///
/// Implementations own their transport concerns: timeouts, auth and any
/// retry policy. Every failure to produce a usable rate should surface as
/// [`FxError::UpstreamUnavailable`].
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider id.
    fn id(&self) -> &str;

    /// Describe the provider.
    fn info(&self) -> ProviderInfo;

    /// Get the latest rate for a currency pair.
    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Decimal>;

    /// Get the rate that applied on `date`.
    async fn fetch_historical(&self, pair: &CurrencyPair, date: NaiveDate) -> FxResult<Decimal> {
        let _ = (pair, date);
        Err(FxError::HistoricalUnsupported {
            provider: self.id().to_string(),
        })
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateProvider;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Scriptable in-memory provider that counts its calls.
    pub struct MockRateProvider {
        id: String,
        rates: DashMap<String, Decimal>,
        failing: AtomicBool,
        historical: bool,
        calls: AtomicUsize,
        delay: Option<Duration>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockRateProvider {
        /// Create a new mock provider.
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                rates: DashMap::new(),
                failing: AtomicBool::new(false),
                historical: true,
                calls: AtomicUsize::new(0),
                delay: None,
                gate: None,
            }
        }

        /// Sleep for `delay` inside every fetch.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Block every fetch until a permit is available on `gate`.
        pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        /// Report no historical support.
        pub fn without_historical(mut self) -> Self {
            self.historical = false;
            self
        }

        /// Set the latest rate for a currency pair.
        pub fn set_rate(&self, pair: &CurrencyPair, rate: Decimal) {
            self.rates.insert(pair.to_string(), rate);
        }

        /// Set the rate for a pair on a specific date.
        pub fn set_historical_rate(&self, pair: &CurrencyPair, date: NaiveDate, rate: Decimal) {
            self.rates.insert(format!("{pair}@{date}"), rate);
        }

        /// Make every subsequent fetch fail.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Number of fetch calls made so far.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn lookup(&self, key: String) -> FxResult<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| FxError::upstream(&self.id, "gate closed"))?;
                permit.forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.failing.load(Ordering::SeqCst) {
                return Err(FxError::upstream(&self.id, "scripted failure"));
            }

            self.rates
                .get(&key)
                .map(|r| *r)
                .ok_or_else(|| FxError::upstream(&self.id, format!("no rate for {key}")))
        }
    }

    #[async_trait]
    impl RateProvider for MockRateProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                id: self.id.clone(),
                name: format!("Mock {}", self.id),
                requires_key: false,
                free_tier: true,
                supports_historical: self.historical,
            }
        }

        async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Decimal> {
            self.lookup(pair.to_string()).await
        }

        async fn fetch_historical(&self, pair: &CurrencyPair, date: NaiveDate) -> FxResult<Decimal> {
            if !self.historical {
                return Err(FxError::HistoricalUnsupported {
                    provider: self.id.clone(),
                });
            }
            self.lookup(format!("{pair}@{date}")).await
        }
    }
}
