//! RateCache FX
//!
//! Exchange rate lookups fronted by a time-bounded, single-flight cache.
//!
//! # Features
//!
//! - Per-provider rate caching with configurable TTL and capacity
//! - Concurrent misses for one pair coalesce into a single upstream fetch
//! - Optional stale fallback when the upstream fails
//! - Frankfurter, ExchangeRate-API and CurrencyAPI providers
//! - Conversion, bulk conversion and multi-currency comparison
//!
//! # Example
//!
//! ```rust,ignore
//! use ratecache_fx::{RateService, ServiceConfig};
//! use ratecache_common::{CurrencyPair, Currency};
//!
//! let service = RateService::from_config(&ServiceConfig::from_env())?;
//! let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
//!
//! // Get current rate from the default provider
//! let rate = service.latest(&pair, None).await?;
//!
//! // Convert amount
//! let conversion = service.convert(&pair, dec!(1000), None).await?;
//! ```

pub mod cache;
#[cfg(any(test, feature = "test-utils"))]
pub mod clock;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod registry;

pub use cache::{RateCache, RateEntry, SharedRateCache};
pub use config::{ProviderSettings, RateCacheConfig, ServiceConfig};
pub use conversion::{
    BulkConversion, BulkConversionRequest, ComparedRate, Conversion, CurrencyInfo,
    CurrencyListing, FailedQuote, ProvidersOverview, RateComparison,
};
pub use engine::RateService;
pub use error::{FxError, FxResult};
pub use metrics::CacheStats;
pub use provider::{ProviderInfo, RateProvider};
pub use registry::ProviderRegistry;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
