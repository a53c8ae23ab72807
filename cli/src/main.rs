//! RateCache CLI
//!
//! Looks up, converts and compares exchange rates through the caching
//! rate service and prints the result as JSON.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod args;
mod commands;

use args::Args;
use commands::ErrorBody;
use ratecache_fx::{RateService, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ServiceConfig::from_env();
    args.apply(&mut config)?;

    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let service = RateService::from_config(&config)?;
    info!(command = ?args.command, "Starting RateCache");

    match commands::run(&service, &args.command, args.provider.as_deref()).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            error!(error = %err, code = err.error_code(), "Command failed");
            println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
            Err(err.into())
        }
    }
}

fn init_tracing(config: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    // Logs go to stderr so stdout stays parseable JSON.
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
