//! Exchange rate cache with TTL, capacity bound and single-flight fetches.
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! A miss inserts a pending marker for its key before releasing the lock,
//! fetches from the provider outside the lock, then re-acquires it to store
//! the result and wake every caller that queued behind the marker.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use ratecache_common::{is_fresh, CurrencyPair, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::RateCacheConfig;
use crate::error::{FxError, FxResult};
use crate::metrics::{CacheMetrics, CacheStats};
use crate::provider::RateProvider;

/// A rate obtained from an upstream provider.
///
/// Never mutated once built; a refresh replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub pair: CurrencyPair,
    /// `None` for the latest rate, the quoted day for a historical one.
    pub as_of: Option<NaiveDate>,
    pub rate: Decimal,
    pub fetched_at: Timestamp,
    pub expires_at: Timestamp,
    /// Id of the provider that produced the rate.
    pub source: String,
}

impl RateEntry {
    /// Fresh strictly before `expires_at`.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        is_fresh(self.expires_at, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    pair: CurrencyPair,
    as_of: Option<NaiveDate>,
}

impl RateKey {
    fn latest(pair: &CurrencyPair) -> Self {
        Self {
            pair: pair.clone(),
            as_of: None,
        }
    }

    fn historical(pair: &CurrencyPair, date: NaiveDate) -> Self {
        Self {
            pair: pair.clone(),
            as_of: Some(date),
        }
    }
}

type FetchOutcome = FxResult<RateEntry>;

/// Eviction order: oldest `fetched_at` first, then insertion sequence.
type EvictionKey = (Timestamp, u64);

struct Slot {
    entry: RateEntry,
    order: EvictionKey,
}

struct CacheState {
    config: RateCacheConfig,
    entries: HashMap<RateKey, Slot>,
    by_age: BTreeMap<EvictionKey, RateKey>,
    pending: HashMap<RateKey, watch::Receiver<Option<FetchOutcome>>>,
    next_seq: u64,
}

impl CacheState {
    fn new(config: RateCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_age: BTreeMap::new(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Insert or replace, then evict down to capacity. Returns evicted keys.
    fn store(&mut self, key: RateKey, entry: RateEntry) -> Vec<RateKey> {
        let order = (entry.fetched_at, self.next_seq);
        self.next_seq += 1;

        if let Some(old) = self.entries.insert(key.clone(), Slot { entry, order }) {
            self.by_age.remove(&old.order);
        }
        self.by_age.insert(order, key);

        self.enforce_capacity()
    }

    fn remove(&mut self, key: &RateKey) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.by_age.remove(&slot.order);
                true
            }
            None => false,
        }
    }

    fn enforce_capacity(&mut self) -> Vec<RateKey> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.config.max_entries {
            let Some((_, key)) = self.by_age.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted.push(key);
        }
        evicted
    }
}

enum Role {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Waiter(watch::Receiver<Option<FetchOutcome>>),
}

/// Clears the pending marker if the fetching task is dropped mid-flight,
/// so queued callers wake up and retry instead of hanging.
struct PendingGuard<'a> {
    state: &'a Mutex<CacheState>,
    key: Option<RateKey>,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.key = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.state.lock().pending.remove(&key);
        }
    }
}

/// Thread-safe rate cache in front of one provider.
pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    state: Mutex<CacheState>,
    metrics: CacheMetrics,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self::with_config(provider, RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(provider: Arc<dyn RateProvider>, config: RateCacheConfig) -> Self {
        Self {
            provider,
            state: Mutex::new(CacheState::new(config)),
            metrics: CacheMetrics::new(),
        }
    }

    /// The provider behind this cache.
    pub fn provider(&self) -> &Arc<dyn RateProvider> {
        &self.provider
    }

    /// Current configuration.
    pub fn config(&self) -> RateCacheConfig {
        self.state.lock().config.clone()
    }

    /// Replace the configuration.
    ///
    /// Invalid values are rejected and the previous configuration stays in
    /// effect. A smaller `max_entries` evicts immediately. Existing entries
    /// keep the expiry they were stored with.
    pub fn configure(
        &self,
        ttl_seconds: i64,
        max_entries: usize,
        serve_stale_on_error: bool,
    ) -> FxResult<()> {
        let config = RateCacheConfig::new(ttl_seconds, max_entries, serve_stale_on_error)?;

        let evicted = {
            let mut state = self.state.lock();
            state.config = config;
            state.enforce_capacity()
        };
        self.metrics.record_evictions(evicted.len());

        info!(
            provider = self.provider.id(),
            ttl_seconds,
            max_entries,
            serve_stale_on_error,
            evicted = evicted.len(),
            "Rate cache reconfigured"
        );
        Ok(())
    }

    /// Get the latest rate for `pair`, fetching it if missing or stale.
    pub async fn get(&self, pair: &CurrencyPair, now: Timestamp) -> FxResult<RateEntry> {
        self.lookup(RateKey::latest(pair), now).await
    }

    /// Get the rate for `pair` on `date`, fetching it if missing or stale.
    pub async fn get_historical(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
        now: Timestamp,
    ) -> FxResult<RateEntry> {
        self.lookup(RateKey::historical(pair, date), now).await
    }

    /// Remove the latest-rate entry for `pair`. No-op when absent.
    pub fn invalidate(&self, pair: &CurrencyPair) {
        if self.state.lock().remove(&RateKey::latest(pair)) {
            debug!(pair = %pair, "Cache entry invalidated");
        }
    }

    /// Remove the historical entry for `pair` on `date`. No-op when absent.
    pub fn invalidate_historical(&self, pair: &CurrencyPair, date: NaiveDate) {
        if self.state.lock().remove(&RateKey::historical(pair, date)) {
            debug!(pair = %pair, %date, "Historical cache entry invalidated");
        }
    }

    /// Clear all cached rates. In-flight fetches still publish their result.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.by_age.clear();
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peek at the stored latest-rate entry without fetching, fresh or not.
    pub fn peek(&self, pair: &CurrencyPair) -> Option<RateEntry> {
        self.state
            .lock()
            .entries
            .get(&RateKey::latest(pair))
            .map(|slot| slot.entry.clone())
    }

    /// Get cache statistics as of `now`.
    pub fn stats(&self, now: Timestamp) -> CacheStats {
        let state = self.state.lock();
        let total = state.entries.len();
        let fresh = state
            .entries
            .values()
            .filter(|slot| slot.entry.is_fresh(now))
            .count();

        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            stale_entries: total - fresh,
            in_flight: state.pending.len(),
            ..Default::default()
        }
        .with_counters(&self.metrics)
    }

    async fn lookup(&self, key: RateKey, now: Timestamp) -> FxResult<RateEntry> {
        loop {
            let role = {
                let mut state = self.state.lock();

                if let Some(slot) = state.entries.get(&key) {
                    if slot.entry.is_fresh(now) {
                        self.metrics.record_hit();
                        debug!(pair = %key.pair, as_of = ?key.as_of, "Cache hit");
                        return Ok(slot.entry.clone());
                    }
                }

                match state.pending.get(&key) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        state.pending.insert(key.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => return self.fetch_and_publish(key, now, tx).await,
                Role::Waiter(mut rx) => {
                    self.metrics.record_coalesced();
                    debug!(pair = %key.pair, as_of = ?key.as_of, "Joining in-flight fetch");

                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(published) => published.clone(),
                        Err(_) => None,
                    };
                    match outcome {
                        Some(outcome) => return outcome,
                        // Leader went away without publishing; look again.
                        None => continue,
                    }
                }
            }
        }
    }

    async fn fetch_and_publish(
        &self,
        key: RateKey,
        now: Timestamp,
        tx: watch::Sender<Option<FetchOutcome>>,
    ) -> FxResult<RateEntry> {
        let mut guard = PendingGuard {
            state: &self.state,
            key: Some(key.clone()),
        };

        self.metrics.record_miss();
        debug!(pair = %key.pair, as_of = ?key.as_of, provider = self.provider.id(), "Cache miss, fetching");

        let fetched = match key.as_of {
            None => self.provider.fetch(&key.pair).await,
            Some(date) => self.provider.fetch_historical(&key.pair, date).await,
        };
        let fetched = fetched.and_then(|rate| self.validate_rate(&key.pair, rate));

        let (outcome, evicted) = {
            let mut state = self.state.lock();
            guard.disarm();
            state.pending.remove(&key);

            match fetched {
                Ok(rate) => match state.config.expiry(now) {
                    Ok(expires_at) => {
                        let entry = RateEntry {
                            pair: key.pair.clone(),
                            as_of: key.as_of,
                            rate,
                            fetched_at: now,
                            expires_at,
                            source: self.provider.id().to_string(),
                        };
                        let evicted = state.store(key.clone(), entry.clone());
                        (Ok(entry), evicted)
                    }
                    Err(err) => {
                        warn!(pair = %key.pair, error = %err, "Rate not cached");
                        (Err(err), Vec::new())
                    }
                },
                Err(err) => {
                    self.metrics.record_upstream_failure();
                    let stale = if state.config.serve_stale_on_error {
                        state.entries.get(&key).map(|slot| slot.entry.clone())
                    } else {
                        None
                    };

                    match stale {
                        Some(entry) => {
                            self.metrics.record_stale_served();
                            warn!(
                                pair = %key.pair,
                                error = %err,
                                expired_at = %entry.expires_at,
                                "Upstream failed, serving stale rate"
                            );
                            (Ok(entry), Vec::new())
                        }
                        None => {
                            warn!(pair = %key.pair, error = %err, "Upstream fetch failed");
                            (Err(err), Vec::new())
                        }
                    }
                }
            }
        };

        if !evicted.is_empty() {
            self.metrics.record_evictions(evicted.len());
            for victim in &evicted {
                debug!(pair = %victim.pair, as_of = ?victim.as_of, "Evicted least recently fetched rate");
            }
        }

        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    fn validate_rate(&self, pair: &CurrencyPair, rate: Decimal) -> FxResult<Decimal> {
        if rate <= Decimal::ZERO {
            return Err(FxError::upstream(
                self.provider.id(),
                format!("non-positive rate {rate} for {pair}"),
            ));
        }
        Ok(rate)
    }
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockRateProvider;
    use chrono::{Duration, TimeZone, Utc};
    use futures::future::join_all;
    use ratecache_common::Currency;
    use rust_decimal_macros::dec;
    use tokio::sync::Semaphore;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn pair(base: &str, quote: &str) -> CurrencyPair {
        CurrencyPair::parse(base, quote).unwrap()
    }

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::eur())
    }

    fn setup(
        ttl: i64,
        max_entries: usize,
        serve_stale: bool,
    ) -> (Arc<MockRateProvider>, RateCache) {
        let provider = Arc::new(MockRateProvider::new("mock"));
        let cache = RateCache::with_config(
            provider.clone(),
            RateCacheConfig::new(ttl, max_entries, serve_stale).unwrap(),
        );
        (provider, cache)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&usd_eur(), dec!(0.90));

        let entry = cache.get(&usd_eur(), t(0)).await.unwrap();

        assert_eq!(entry.rate, dec!(0.90));
        assert_eq!(entry.fetched_at, t(0));
        assert_eq!(entry.expires_at, t(60));
        assert_eq!(entry.source, "mock");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_provider() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&usd_eur(), dec!(0.90));

        cache.get(&usd_eur(), t(0)).await.unwrap();
        let hit = cache.get(&usd_eur(), t(59)).await.unwrap();

        assert_eq!(hit.rate, dec!(0.90));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(cache.stats(t(59)).hits, 1);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_stale() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&usd_eur(), dec!(0.90));

        cache.get(&usd_eur(), t(0)).await.unwrap();
        provider.set_rate(&usd_eur(), dec!(0.95));

        let refreshed = cache.get(&usd_eur(), t(60)).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(refreshed.rate, dec!(0.95));
        assert_eq!(refreshed.fetched_at, t(60));
        assert_eq!(refreshed.expires_at, t(120));
    }

    #[tokio::test]
    async fn test_scenario_without_stale_fallback() {
        let (provider, cache) = setup(60, 2, false);
        provider.set_rate(&usd_eur(), dec!(0.90));

        let first = cache.get(&usd_eur(), t(0)).await.unwrap();
        assert_eq!(first.expires_at, t(60));

        let hit = cache.get(&usd_eur(), t(30)).await.unwrap();
        assert_eq!(hit.rate, dec!(0.90));
        assert_eq!(provider.call_count(), 1);

        provider.set_failing(true);
        let err = cache.get(&usd_eur(), t(61)).await.unwrap_err();

        assert!(matches!(err, FxError::UpstreamUnavailable { .. }));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scenario_with_stale_fallback() {
        let (provider, cache) = setup(60, 2, true);
        provider.set_rate(&usd_eur(), dec!(0.90));

        cache.get(&usd_eur(), t(0)).await.unwrap();
        cache.get(&usd_eur(), t(30)).await.unwrap();

        provider.set_failing(true);
        let stale = cache.get(&usd_eur(), t(61)).await.unwrap();

        assert_eq!(stale.rate, dec!(0.90));
        assert_eq!(stale.expires_at, t(60));
        assert!(!stale.is_fresh(t(61)));
        assert_eq!(cache.stats(t(61)).stale_served, 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_without_entry_still_fails() {
        let (provider, cache) = setup(60, 2, true);
        provider.set_failing(true);

        let err = cache.get(&usd_eur(), t(0)).await.unwrap_err();
        assert!(matches!(err, FxError::UpstreamUnavailable { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_upstream_failure() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&usd_eur(), dec!(0));

        let err = cache.get(&usd_eur(), t(0)).await.unwrap_err();

        assert!(matches!(err, FxError::UpstreamUnavailable { .. }));
        assert!(cache.is_empty());

        provider.set_rate(&usd_eur(), dec!(-1.5));
        assert!(cache.get(&usd_eur(), t(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent_and_forces_one_fetch() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&usd_eur(), dec!(0.90));

        cache.get(&usd_eur(), t(0)).await.unwrap();
        cache.invalidate(&usd_eur());
        cache.invalidate(&usd_eur());
        cache.invalidate(&pair("GBP", "JPY"));
        assert!(cache.is_empty());

        cache.get(&usd_eur(), t(1)).await.unwrap();
        cache.get(&usd_eur(), t(2)).await.unwrap();

        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_eviction_removes_least_recently_fetched() {
        let (provider, cache) = setup(600, 2, false);
        let a = pair("USD", "EUR");
        let b = pair("USD", "GBP");
        let c = pair("USD", "JPY");
        for p in [&a, &b, &c] {
            provider.set_rate(p, dec!(1.1));
        }

        cache.get(&a, t(0)).await.unwrap();
        cache.get(&b, t(1)).await.unwrap();
        // Hits do not refresh fetch order.
        cache.get(&a, t(2)).await.unwrap();
        cache.get(&c, t(3)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&a).is_none());
        assert!(cache.peek(&b).is_some());
        assert!(cache.peek(&c).is_some());
        assert_eq!(cache.stats(t(3)).evictions, 1);
    }

    #[tokio::test]
    async fn test_eviction_ties_broken_by_insertion_order() {
        let (provider, cache) = setup(600, 2, false);
        let a = pair("USD", "EUR");
        let b = pair("USD", "GBP");
        let c = pair("USD", "JPY");
        for p in [&a, &b, &c] {
            provider.set_rate(p, dec!(1.1));
        }

        cache.get(&b, t(0)).await.unwrap();
        cache.get(&a, t(0)).await.unwrap();
        cache.get(&c, t(0)).await.unwrap();

        assert!(cache.peek(&b).is_none());
        assert!(cache.peek(&a).is_some());
        assert!(cache.peek(&c).is_some());
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_and_keeps_previous() {
        let (_, cache) = setup(60, 5, false);

        assert!(matches!(
            cache.configure(0, 5, true),
            Err(FxError::InvalidConfig(_))
        ));
        assert!(cache.configure(60, 0, true).is_err());

        let config = cache.config();
        assert_eq!(config.ttl, Duration::seconds(60));
        assert_eq!(config.max_entries, 5);
        assert!(!config.serve_stale_on_error);
    }

    #[tokio::test]
    async fn test_configure_rejects_ttl_beyond_maximum() {
        let (provider, cache) = setup(60, 5, false);
        provider.set_rate(&usd_eur(), dec!(0.9));

        assert!(matches!(
            cache.configure(i64::MAX / 1000, 5, false),
            Err(FxError::InvalidConfig(_))
        ));

        let entry = cache.get(&usd_eur(), t(0)).await.unwrap();
        assert_eq!(entry.expires_at, t(60));
    }

    #[tokio::test]
    async fn test_expiry_overflow_is_not_cached() {
        let (provider, cache) = setup(60, 5, false);
        provider.set_rate(&usd_eur(), dec!(0.9));
        let late = chrono::DateTime::<Utc>::MAX_UTC - Duration::seconds(30);

        let err = cache.get(&usd_eur(), late).await.unwrap_err();

        assert!(matches!(err, FxError::InvalidConfig(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.stats(late).in_flight, 0);
    }

    #[tokio::test]
    async fn test_configure_shrink_evicts_oldest() {
        let (provider, cache) = setup(600, 5, false);
        let pairs: Vec<CurrencyPair> = ["EUR", "GBP", "JPY", "CHF"]
            .iter()
            .map(|q| pair("USD", q))
            .collect();
        for (i, p) in pairs.iter().enumerate() {
            provider.set_rate(p, dec!(2));
            cache.get(p, t(i as i64)).await.unwrap();
        }

        cache.configure(600, 2, false).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&pairs[0]).is_none());
        assert!(cache.peek(&pairs[1]).is_none());
        assert!(cache.peek(&pairs[3]).is_some());
    }

    #[tokio::test]
    async fn test_new_ttl_applies_to_next_fetch() {
        let (provider, cache) = setup(60, 5, false);
        provider.set_rate(&usd_eur(), dec!(0.9));

        cache.get(&usd_eur(), t(0)).await.unwrap();
        cache.configure(10, 5, false).unwrap();

        // Stored entry keeps its original expiry.
        assert_eq!(cache.get(&usd_eur(), t(30)).await.unwrap().expires_at, t(60));

        let refreshed = cache.get(&usd_eur(), t(60)).await.unwrap();
        assert_eq!(refreshed.expires_at, t(70));
    }

    #[tokio::test]
    async fn test_historical_entries_are_separate() {
        let (provider, cache) = setup(60, 10, false);
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        provider.set_rate(&usd_eur(), dec!(0.90));
        provider.set_historical_rate(&usd_eur(), date, dec!(0.92));

        let latest = cache.get(&usd_eur(), t(0)).await.unwrap();
        let historical = cache.get_historical(&usd_eur(), date, t(0)).await.unwrap();

        assert_eq!(latest.rate, dec!(0.90));
        assert_eq!(historical.rate, dec!(0.92));
        assert_eq!(historical.as_of, Some(date));
        assert_eq!(cache.len(), 2);

        cache.invalidate(&usd_eur());
        assert_eq!(cache.len(), 1);
        cache.invalidate_historical(&usd_eur(), date);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let provider = Arc::new(
            MockRateProvider::new("mock").with_delay(std::time::Duration::from_millis(20)),
        );
        provider.set_rate(&usd_eur(), dec!(0.90));
        let cache = RateCache::new(provider.clone());

        let pair = usd_eur();
        let results = join_all((0..16).map(|_| cache.get(&pair, t(0)))).await;

        assert_eq!(provider.call_count(), 1);
        for result in results {
            assert_eq!(result.unwrap().rate, dec!(0.90));
        }
        let stats = cache.stats(t(0));
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 15);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let provider = Arc::new(
            MockRateProvider::new("mock").with_delay(std::time::Duration::from_millis(20)),
        );
        provider.set_failing(true);
        let cache = RateCache::new(provider.clone());

        let pair = usd_eur();
        let results = join_all((0..8).map(|_| cache.get(&pair, t(0)))).await;

        assert_eq!(provider.call_count(), 1);
        let first = results[0].clone().unwrap_err();
        for result in results {
            assert_eq!(result.unwrap_err(), first);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_across_threads() {
        const CALLERS: usize = 12;
        let gate = Arc::new(Semaphore::new(0));
        let provider = Arc::new(MockRateProvider::new("mock").with_gate(gate.clone()));
        provider.set_rate(&usd_eur(), dec!(1.08));
        let cache = Arc::new(RateCache::new(provider.clone()));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&usd_eur(), t(0)).await })
            })
            .collect();

        while cache.stats(t(0)).coalesced < (CALLERS - 1) as u64 {
            tokio::task::yield_now().await;
        }
        gate.add_permits(1);

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().rate, dec!(1.08));
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let gate = Arc::new(Semaphore::new(0));
        let provider = Arc::new(MockRateProvider::new("mock").with_gate(gate.clone()));
        provider.set_rate(&usd_eur(), dec!(0.90));
        let cache = Arc::new(RateCache::new(provider.clone()));

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&usd_eur(), t(0)).await })
        };
        while cache.stats(t(0)).in_flight == 0 {
            tokio::task::yield_now().await;
        }
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&usd_eur(), t(0)).await })
        };
        while cache.stats(t(0)).coalesced == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        let _ = leader.await;
        gate.add_permits(1);

        let entry = waiter.await.unwrap().unwrap();
        assert_eq!(entry.rate, dec!(0.90));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(cache.stats(t(0)).in_flight, 0);
    }

    #[tokio::test]
    async fn test_distinct_pairs_fetch_independently() {
        let (provider, cache) = setup(60, 10, false);
        provider.set_rate(&pair("USD", "EUR"), dec!(0.9));
        provider.set_rate(&pair("USD", "GBP"), dec!(0.8));

        let a = pair("USD", "EUR");
        let b = pair("USD", "GBP");
        let (ra, rb) = tokio::join!(cache.get(&a, t(0)), cache.get(&b, t(0)));

        assert_eq!(ra.unwrap().rate, dec!(0.9));
        assert_eq!(rb.unwrap().rate, dec!(0.8));
        assert_eq!(provider.call_count(), 2);
    }
}
