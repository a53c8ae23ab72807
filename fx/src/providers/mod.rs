//! Upstream HTTP rate providers.

pub mod currency_api;
pub mod exchangerate_api;
pub mod frankfurter;
mod http;

use std::sync::Arc;

use tracing::info;

use crate::config::ProviderSettings;
use crate::error::FxResult;
use crate::provider::RateProvider;

pub use currency_api::CurrencyApiProvider;
pub use exchangerate_api::ExchangeRateApiProvider;
pub use frankfurter::FrankfurterProvider;

/// Build every provider the settings allow, in listing order.
///
/// CurrencyAPI is only included when an API key is configured.
pub fn build_providers(settings: &ProviderSettings) -> FxResult<Vec<Arc<dyn RateProvider>>> {
    let mut providers: Vec<Arc<dyn RateProvider>> = vec![
        Arc::new(ExchangeRateApiProvider::new(
            &settings.exchangerate_api_url,
            settings.request_timeout,
        )?),
        Arc::new(FrankfurterProvider::new(
            &settings.frankfurter_url,
            settings.request_timeout,
        )?),
    ];

    match &settings.currency_api_key {
        Some(key) => providers.push(Arc::new(CurrencyApiProvider::new(
            &settings.currency_api_url,
            key,
            settings.request_timeout,
        )?)),
        None => info!("CURRENCY_API_KEY not set, currency_api provider disabled"),
    }

    Ok(providers)
}
