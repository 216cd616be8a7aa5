use anyhow::{Context, Result};
use clap::Parser;
use log::{info, trace};
use quote_exporter::config::LogLevel;
use quote_exporter::prelude::*;
use quote_exporter::server;
use quote_exporter::util::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to every quote request
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "quote-exporter", version, about = "Finance quote Prometheus exporter")]
struct Args {
    /// Location of the config file (yaml, json or toml)
    #[arg(short = 'f', long)]
    config: PathBuf,

    /// Print status to the log
    #[arg(short, long)]
    verbose: bool,

    /// Listening port (ip:port or just port), overrides the config
    #[arg(short, long)]
    port: Option<String>,

    /// Dump API data and the resolved config
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(logging::effective_level(LogLevel::default(), args.verbose, args.debug));
    info!("Starting up quote-exporter {}", quote_exporter::VERSION);

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    logging::set_level(logging::effective_level(config.log_level, args.verbose, args.debug));

    let addr = config.listen_addr(args.port.as_deref())?;
    if args.debug {
        trace!(
            "Running with config:\n{}",
            serde_json::to_string_pretty(&config).unwrap_or_default()
        );
    }

    let fetcher = YahooFetcher::new(FETCH_TIMEOUT).context("Failed to build quote fetcher")?;
    let mut ctx = ExporterContext::new(&config, Arc::new(fetcher))?;

    if config.update_cache_on_startup {
        info!("Warming label cache for {} tickers", ctx.tickers().len());
        ctx.warm_cache().await;
    }

    let server = server::serve(addr, ctx.metrics())
        .await
        .context("Failed to start metrics server")?;

    info!("Ready to Run...");
    let scheduler = Scheduler::new(Duration::from_secs(config.min_interval));
    tokio::select! {
        _ = scheduler.run(ctx) => Ok(()),
        err = server::wait(server) => Err(err.into()),
    }
}
