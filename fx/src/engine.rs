//! Exchange rate service: provider selection and compositions over the caches.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use ratecache_common::{
    Clock, Currency, CurrencyPair, Money, SystemClock, Timestamp, COMMON_CURRENCIES,
};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::cache::RateEntry;
use crate::config::{RateCacheConfig, ServiceConfig};
use crate::conversion::{
    BulkConversion, BulkConversionRequest, ComparedRate, Conversion, CurrencyInfo,
    CurrencyListing, FailedQuote, ProvidersOverview, RateComparison,
};
use crate::error::{FxError, FxResult};
use crate::metrics::CacheStats;
use crate::providers::build_providers;
use crate::registry::ProviderRegistry;

/// Source id reported for same-currency pairs, which never reach a provider.
pub const IDENTITY_SOURCE: &str = "identity";

/// The exchange rate service.
///
/// Built once at startup and shared by reference with request handlers.
pub struct RateService {
    registry: ProviderRegistry,
    clock: Arc<dyn Clock>,
}

impl RateService {
    /// Create a service over an already populated registry.
    pub fn new(registry: ProviderRegistry) -> FxResult<Self> {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    /// Create a service that reads time from `clock`.
    pub fn with_clock(registry: ProviderRegistry, clock: Arc<dyn Clock>) -> FxResult<Self> {
        registry.validate()?;
        Ok(Self { registry, clock })
    }

    /// Build the HTTP providers described by `config`.
    pub fn from_config(config: &ServiceConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::InvalidConfig)?;

        let mut registry = ProviderRegistry::new(config.default_provider.clone());
        for provider in build_providers(&config.providers)? {
            registry.register(provider, config.cache.clone());
        }

        let service = Self::new(registry)?;
        info!(
            default_provider = service.registry.default_id(),
            providers = service.registry.providers().len(),
            ttl_seconds = config.cache.ttl.num_seconds(),
            max_entries = config.cache.max_entries,
            serve_stale_on_error = config.cache.serve_stale_on_error,
            "Rate service initialized"
        );
        Ok(service)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Latest rate for `pair`.
    ///
    /// A failing non-default provider is retried once through the default.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn latest(&self, pair: &CurrencyPair, provider: Option<&str>) -> FxResult<RateEntry> {
        let now = self.now();
        let cache = self.registry.cache(provider)?;

        if pair.is_identity() {
            return identity_entry(pair, None, now, &cache.config());
        }

        match cache.get(pair, now).await {
            Err(err) if err.is_retryable() && !self.registry.is_default(cache.provider().id()) =>
            {
                warn!(
                    provider = cache.provider().id(),
                    fallback = self.registry.default_id(),
                    error = %err,
                    "Provider failed, falling back to default"
                );
                self.registry.cache(None)?.get(pair, now).await
            }
            other => other,
        }
    }

    /// Rate for `pair` on `date`.
    ///
    /// Providers without historical data answer with their latest rate.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn historical(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
        provider: Option<&str>,
    ) -> FxResult<RateEntry> {
        let now = self.now();
        if date > now.date_naive() {
            return Err(FxError::InvalidDate(format!("{date} is in the future")));
        }

        let cache = self.registry.cache(provider)?;
        if pair.is_identity() {
            return identity_entry(pair, Some(date), now, &cache.config());
        }

        if !cache.provider().info().supports_historical {
            info!(
                provider = cache.provider().id(),
                "No historical rates, using latest"
            );
            return self.latest(pair, provider).await;
        }

        match cache.get_historical(pair, date, now).await {
            Err(FxError::HistoricalUnsupported { .. }) => self.latest(pair, provider).await,
            other => other,
        }
    }

    /// Convert `amount` of `pair.base` into `pair.quote`.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn convert(
        &self,
        pair: &CurrencyPair,
        amount: Decimal,
        provider: Option<&str>,
    ) -> FxResult<Conversion> {
        ensure_non_negative(amount)?;

        let rate = self.latest(pair, provider).await?;
        let conversion =
            Conversion::new(Money::new(amount, pair.base.clone()), rate, self.now())?;

        info!(
            conversion_id = %conversion.id,
            output = %conversion.output,
            "Conversion completed"
        );
        Ok(conversion)
    }

    /// Resolve every distinct quote once, concurrently, and convert each
    /// requested amount. Quotes without a rate are reported and skipped.
    #[instrument(skip(self, request), fields(base = %request.base, requests = request.conversions.len()))]
    pub async fn bulk_convert(
        &self,
        request: &BulkConversionRequest,
        provider: Option<&str>,
    ) -> FxResult<BulkConversion> {
        if request.conversions.iter().all(|c| c.is_empty()) {
            return Err(FxError::InvalidRequest("No conversions provided".to_string()));
        }
        for amount in request.conversions.iter().flat_map(|c| c.values()) {
            ensure_non_negative(*amount)?;
        }
        // Resolve the provider up front so an unknown id fails the request.
        self.registry.cache(provider)?;

        let quotes = request.quotes();
        let lookups = quotes.iter().map(|quote| {
            let pair = CurrencyPair::new(request.base.clone(), quote.clone());
            async move { self.latest(&pair, provider).await }
        });
        let resolved = join_all(lookups).await;

        let mut rates: BTreeMap<&Currency, Decimal> = BTreeMap::new();
        let mut failed = Vec::new();
        for (quote, result) in quotes.iter().zip(resolved) {
            match result {
                Ok(entry) => {
                    rates.insert(quote, entry.rate);
                }
                Err(err) => {
                    warn!(quote = %quote, error = %err, "Skipping failed conversion");
                    failed.push(FailedQuote {
                        currency: quote.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let mut conversions = BTreeMap::new();
        for leg in &request.conversions {
            for (quote, amount) in leg {
                if let Some(rate) = rates.get(quote) {
                    let output = Money::new(*amount, request.base.clone())
                        .convert(*rate, quote.clone())?;
                    conversions.insert(BulkConversion::result_key(quote, *amount), output.value);
                }
            }
        }

        Ok(BulkConversion {
            base: request.base.clone(),
            conversions,
            failed,
            timestamp: self.now(),
        })
    }

    /// Compare `base` against a comma-separated list of quote codes.
    ///
    /// Codes are trimmed, uppercased and deduplicated in order. Invalid
    /// codes and failed lookups are reported per currency.
    #[instrument(skip(self))]
    pub async fn compare(
        &self,
        base: &Currency,
        quotes: &str,
        provider: Option<&str>,
    ) -> FxResult<RateComparison> {
        let requested = split_quotes(quotes);
        if requested.is_empty() {
            return Err(FxError::InvalidRequest(
                "No target currencies provided".to_string(),
            ));
        }
        let provider_id = self.registry.cache(provider)?.provider().id().to_string();

        let lookups = requested.iter().map(|code| async move {
            let quote = Currency::parse(code).map_err(FxError::from)?;
            let pair = CurrencyPair::new(base.clone(), quote);
            self.latest(&pair, provider).await
        });
        let resolved = join_all(lookups).await;

        let rates = requested
            .iter()
            .zip(resolved)
            .map(|(code, result)| match result {
                Ok(entry) => ComparedRate::ok(code.as_str(), entry.rate),
                Err(err) => ComparedRate::failed(code.as_str(), err),
            })
            .collect();

        Ok(RateComparison {
            base: base.clone(),
            rates,
            provider: provider_id,
            timestamp: self.now(),
        })
    }

    /// The table of well-known currencies.
    pub fn currencies(&self) -> CurrencyListing {
        let currencies: Vec<CurrencyInfo> = COMMON_CURRENCIES
            .iter()
            .map(|&(code, name)| CurrencyInfo { code, name })
            .collect();
        CurrencyListing {
            count: currencies.len(),
            currencies,
        }
    }

    /// Registered providers and the default id.
    pub fn providers(&self) -> ProvidersOverview {
        ProvidersOverview {
            providers: self.registry.providers(),
            default_provider: self.registry.default_id().to_string(),
        }
    }

    /// Drop the cached latest rate for `pair`.
    pub fn invalidate(&self, pair: &CurrencyPair, provider: Option<&str>) -> FxResult<()> {
        self.registry.cache(provider)?.invalidate(pair);
        Ok(())
    }

    /// Reconfigure every provider cache.
    pub fn configure(
        &self,
        ttl_seconds: i64,
        max_entries: usize,
        serve_stale_on_error: bool,
    ) -> FxResult<()> {
        self.registry
            .configure_all(ttl_seconds, max_entries, serve_stale_on_error)
    }

    /// Cache statistics per provider id.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        let now = self.now();
        self.registry
            .caches()
            .map(|c| (c.provider().id().to_string(), c.stats(now)))
            .collect()
    }

}

fn identity_entry(
    pair: &CurrencyPair,
    as_of: Option<NaiveDate>,
    now: Timestamp,
    config: &RateCacheConfig,
) -> FxResult<RateEntry> {
    Ok(RateEntry {
        pair: pair.clone(),
        as_of,
        rate: Decimal::ONE,
        fetched_at: now,
        expires_at: config.expiry(now)?,
        source: IDENTITY_SOURCE.to_string(),
    })
}

fn ensure_non_negative(amount: Decimal) -> FxResult<()> {
    if amount < Decimal::ZERO {
        return Err(FxError::InvalidAmount(format!(
            "amount must not be negative, got {amount}"
        )));
    }
    Ok(())
}

fn split_quotes(quotes: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    quotes
        .split(',')
        .map(|q| q.trim().to_ascii_uppercase())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .collect()
}
