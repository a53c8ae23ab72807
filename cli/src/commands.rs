//! Subcommand execution against a [`RateService`].

use ratecache_fx::{
    BulkConversion, BulkConversionRequest, Conversion, CurrencyListing, FxResult,
    ProvidersOverview, RateComparison, RateEntry, RateService,
};
use serde::Serialize;
use tracing::debug;

use crate::args::{self, Command};

/// Anything a subcommand prints.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Rate(RateEntry),
    Conversion(Conversion),
    Bulk(BulkConversion),
    Comparison(RateComparison),
    Currencies(CurrencyListing),
    Providers(ProvidersOverview),
}

/// Error body printed when a command fails.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

impl From<&ratecache_fx::FxError> for ErrorBody {
    fn from(err: &ratecache_fx::FxError) -> Self {
        Self {
            error: err.error_code(),
            message: err.to_string(),
            status: err.status_code(),
        }
    }
}

pub async fn run(
    service: &RateService,
    command: &Command,
    provider: Option<&str>,
) -> FxResult<Output> {
    debug!(?command, ?provider, "Running command");

    let output = match command {
        Command::Latest { base, quote } => {
            Output::Rate(service.latest(&args::pair(base, quote)?, provider).await?)
        }
        Command::Historical { base, quote, date } => {
            let pair = args::pair(base, quote)?;
            let date = args::date(date)?;
            Output::Rate(service.historical(&pair, date, provider).await?)
        }
        Command::Convert {
            base,
            quote,
            amount,
        } => {
            let pair = args::pair(base, quote)?;
            let input = args::money(amount, &pair.base)?;
            Output::Conversion(service.convert(&pair, input.value, provider).await?)
        }
        Command::Bulk { base, to } => {
            let base = args::currency(base)?;
            let mut request = BulkConversionRequest::new(base.clone());
            for leg in to {
                let (quote, amount) = args::bulk_leg(leg, &base)?;
                request = request.with(quote, amount.value);
            }
            Output::Bulk(service.bulk_convert(&request, provider).await?)
        }
        Command::Compare { base, quotes } => {
            let base = args::currency(base)?;
            Output::Comparison(service.compare(&base, quotes, provider).await?)
        }
        Command::Currencies => Output::Currencies(service.currencies()),
        Command::Providers => Output::Providers(service.providers()),
    };

    for (id, stats) in service.stats() {
        debug!(
            provider = %id,
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            "Cache stats"
        );
    }
    Ok(output)
}
