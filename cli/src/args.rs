//! Command line arguments.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ratecache_common::{parse_date, Currency, CurrencyPair, Money};
use ratecache_fx::{FxError, FxResult, RateCacheConfig, ServiceConfig};

/// RateCache CLI
#[derive(Parser, Debug)]
#[command(name = "ratecache")]
#[command(about = "Cached exchange rate lookups")]
pub struct Args {
    /// Provider to query instead of the default
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Cache TTL in seconds
    #[arg(long, global = true)]
    pub ttl: Option<i64>,

    /// Maximum number of cached rates per provider
    #[arg(long, global = true)]
    pub max_entries: Option<usize>,

    /// Serve an expired rate when the upstream fails
    #[arg(long, global = true)]
    pub serve_stale: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Latest rate for a currency pair
    Latest { base: String, quote: String },

    /// Rate for a currency pair on a past date (YYYY-MM-DD)
    Historical {
        base: String,
        quote: String,
        date: String,
    },

    /// Convert an amount from BASE to QUOTE
    Convert {
        base: String,
        quote: String,
        amount: String,
    },

    /// Convert several amounts out of one base currency
    Bulk {
        base: String,

        /// Target and amount, e.g. `--to EUR=100`; repeatable
        #[arg(long = "to", value_name = "QUOTE=AMOUNT", required = true)]
        to: Vec<String>,
    },

    /// Compare one base against a comma-separated list of currencies
    Compare { base: String, quotes: String },

    /// List well-known currencies
    Currencies,

    /// List registered providers
    Providers,
}

impl Args {
    /// Apply command line overrides on top of the environment configuration.
    pub fn apply(&self, config: &mut ServiceConfig) -> FxResult<()> {
        let cache = &config.cache;
        config.cache = RateCacheConfig::new(
            self.ttl.unwrap_or_else(|| cache.ttl.num_seconds()),
            self.max_entries.unwrap_or(cache.max_entries),
            self.serve_stale || cache.serve_stale_on_error,
        )?;
        if self.json_logs {
            config.log_json = true;
        }
        Ok(())
    }
}

pub fn pair(base: &str, quote: &str) -> FxResult<CurrencyPair> {
    Ok(CurrencyPair::parse(base, quote)?)
}

pub fn currency(code: &str) -> FxResult<Currency> {
    Ok(Currency::parse(code)?)
}

pub fn money(raw: &str, currency: &Currency) -> FxResult<Money> {
    Ok(Money::parse(raw, currency.clone())?)
}

pub fn date(raw: &str) -> FxResult<NaiveDate> {
    parse_date(raw).ok_or_else(|| FxError::InvalidDate(format!("expected YYYY-MM-DD, got {raw}")))
}

/// Parse one `QUOTE=AMOUNT` bulk leg; the amount is in `base`.
pub fn bulk_leg(raw: &str, base: &Currency) -> FxResult<(Currency, Money)> {
    let (quote, value) = raw
        .split_once('=')
        .ok_or_else(|| FxError::InvalidRequest(format!("expected QUOTE=AMOUNT, got {raw}")))?;
    Ok((currency(quote)?, money(value, base)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_subcommand_with_global_options() {
        let args = Args::try_parse_from([
            "ratecache",
            "convert",
            "usd",
            "eur",
            "100",
            "--provider",
            "frankfurter",
            "--ttl",
            "60",
        ])
        .unwrap();

        assert_eq!(args.provider.as_deref(), Some("frankfurter"));
        assert_eq!(args.ttl, Some(60));
        assert!(matches!(args.command, Command::Convert { .. }));
    }

    #[test]
    fn test_bulk_requires_targets() {
        assert!(Args::try_parse_from(["ratecache", "bulk", "USD"]).is_err());

        let args =
            Args::try_parse_from(["ratecache", "bulk", "USD", "--to", "EUR=1", "--to", "GBP=2"])
                .unwrap();
        match args.command {
            Command::Bulk { to, .. } => assert_eq!(to.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let args = Args::try_parse_from([
            "ratecache",
            "currencies",
            "--ttl",
            "30",
            "--serve-stale",
            "--json-logs",
        ])
        .unwrap();
        let mut config = ServiceConfig::default();

        args.apply(&mut config).unwrap();

        assert_eq!(config.cache.ttl.num_seconds(), 30);
        assert_eq!(config.cache.max_entries, 10_000);
        assert!(config.cache.serve_stale_on_error);
        assert!(config.log_json);
    }

    #[test]
    fn test_apply_rejects_zero_ttl() {
        let args = Args::try_parse_from(["ratecache", "providers", "--ttl", "0"]).unwrap();
        let mut config = ServiceConfig::default();

        assert!(matches!(
            args.apply(&mut config),
            Err(FxError::InvalidConfig(_))
        ));
        assert_eq!(config.cache, RateCacheConfig::default());
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(pair("usd", "eur").unwrap().to_string(), "USD/EUR");
        assert!(matches!(pair("US", "EUR"), Err(FxError::InvalidPair(_))));
        assert_eq!(money(" 12.50 ", &Currency::usd()).unwrap().value, dec!(12.50));
        assert!(matches!(
            money("ten", &Currency::usd()),
            Err(FxError::InvalidAmount(_))
        ));
        assert!(matches!(date("2024-13-01"), Err(FxError::InvalidDate(_))));
    }

    #[test]
    fn test_bulk_leg() {
        let usd = Currency::usd();
        assert_eq!(
            bulk_leg("eur=100", &usd).unwrap(),
            (Currency::eur(), Money::new(dec!(100), usd.clone()))
        );
        assert!(matches!(bulk_leg("EUR", &usd), Err(FxError::InvalidRequest(_))));
        assert!(matches!(bulk_leg("EUR=x", &usd), Err(FxError::InvalidAmount(_))));
    }
}
