use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ExporterConfig, MetricKind};
use crate::error::{ExporterError, Result};
use crate::fetcher::QuoteFetcher;
use crate::labels::{LabelCache, LabelResolver};
use crate::metrics::MetricRegistry;
use crate::source::{Source, SourceRegistry};

/// Outcome counts of one source update
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    /// Tickers fetched and dispatched
    pub updated: usize,
    /// Tickers whose fetch failed
    pub failed: usize,
    /// Tickers whose fetch returned nothing
    pub skipped: usize,
}

enum TickerOutcome {
    Updated,
    Failed,
    Skipped,
}

/// Process-wide exporter state: sources, label cache, metrics and the fetch
/// capability. Built once at startup and owned by the polling loop.
pub struct ExporterContext {
    sources: SourceRegistry,
    tickers: Vec<String>,
    resolver: LabelResolver,
    metrics: Arc<MetricRegistry>,
    fetcher: Arc<dyn QuoteFetcher>,
}

impl ExporterContext {
    pub fn new(config: &ExporterConfig, fetcher: Arc<dyn QuoteFetcher>) -> Result<Self> {
        let sources = SourceRegistry::from_config(config)?;
        let labels = sources.labels().clone();
        let cache = LabelCache::new(&config.tickers, &labels);
        let metrics = Arc::new(MetricRegistry::new(&config.metric_prefix, &sources)?);

        info!(
            "Prepared {} sources, {} tickers and {} labels using fetcher {}",
            sources.len(),
            config.tickers.len(),
            labels.len(),
            fetcher.name()
        );

        Ok(Self {
            sources,
            tickers: config.tickers.clone(),
            resolver: LabelResolver::new(labels, cache),
            metrics,
            fetcher,
        })
    }

    /// Configured sources
    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Tickers polled from every source
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Label resolver and its per-ticker cache
    pub fn resolver(&self) -> &LabelResolver {
        &self.resolver
    }

    /// Shared handle for the exposition server
    pub fn metrics(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Fetch every ticker from every source once, filling the label cache
    /// without touching any metric
    pub async fn warm_cache(&mut self) {
        for ticker in &self.tickers {
            for source in self.sources.sources() {
                debug!("Prep cache for {} -> {}", source.name, ticker);
                match self.fetcher.fetch(source, ticker).await {
                    Ok(Some(quote)) => {
                        self.resolver.resolve(source, ticker, &quote);
                    }
                    Ok(None) => debug!("No quote for {} from {}", ticker, source.name),
                    Err(e) => warn!("Unable to fetch {} from {}: {}", ticker, source.name, e),
                }
            }
        }
    }

    /// Run the fetch, resolve and dispatch pipeline for every ticker of the
    /// named source. Failures are isolated per ticker.
    pub async fn update_source(&mut self, name: &str) -> Result<UpdateReport> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| ExporterError::Other(format!("Unknown source '{}'", name)))?;

        let mut report = UpdateReport::default();
        for ticker in &self.tickers {
            let outcome = update_ticker(
                &mut self.resolver,
                &self.metrics,
                self.fetcher.as_ref(),
                source,
                ticker,
            )
            .await;

            match outcome {
                TickerOutcome::Updated => report.updated += 1,
                TickerOutcome::Failed => report.failed += 1,
                TickerOutcome::Skipped => report.skipped += 1,
            }
        }

        Ok(report)
    }
}

async fn update_ticker(
    resolver: &mut LabelResolver,
    metrics: &MetricRegistry,
    fetcher: &dyn QuoteFetcher,
    source: &Source,
    ticker: &str,
) -> TickerOutcome {
    debug!("Updating ticker {} from {}", ticker, source.name);

    let started = Instant::now();
    let quote = match fetcher.fetch(source, ticker).await {
        Ok(Some(quote)) => quote,
        Ok(None) => {
            warn!("Empty quote for {} from {}", ticker, source.name);
            return TickerOutcome::Skipped;
        }
        Err(e) => {
            warn!("Unable to fetch {} from {}", ticker, source.name);
            debug!("Fetch error for {} from {}: {}", ticker, source.name, e);
            return TickerOutcome::Failed;
        }
    };
    let duration = started.elapsed();
    trace!("Quote for {} from {}: {}", ticker, source.name, quote);

    let labels = resolver.resolve(source, ticker, &quote);
    trace!("Preparing to load metrics with labels: {:?}", labels);

    if let Err(e) = metrics.record_update(&labels, duration) {
        error!("Failed to record update of {} from {}: {}", ticker, source.name, e);
    }

    for definition in &source.metrics {
        if quote.field(&definition.source_field).is_none() {
            debug!(
                "Field {} missing for {} from {}, skipping {}",
                definition.source_field, ticker, source.name, definition.name
            );
            continue;
        }

        // counters advance by one whatever the field holds
        let value = match definition.kind {
            MetricKind::Counter => 1.0,
            _ => match quote.number(&definition.source_field) {
                Some(value) => value,
                None => {
                    warn!(
                        "Field {} of {} from {} is not numeric, skipping {}",
                        definition.source_field, ticker, source.name, definition.name
                    );
                    continue;
                }
            },
        };

        if let Err(e) = metrics.apply(&definition.name, &labels, value) {
            error!("Failed to update {} for {}: {}", definition.name, ticker, e);
        }
    }

    debug!(
        " - Updated {} from {} in {:.3}s",
        ticker,
        source.name,
        duration.as_secs_f64()
    );
    TickerOutcome::Updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_value, series_exists, StaticFetcher};
    use config::FileFormat;
    use serde_json::json;

    const CONFIG: &str = r#"
metric_prefix: finance
tickers: [AAPL]
sources:
  - name: yahoo
    plugin: stocks
    interval: 60
    metrics:
      price: {type: Gauge, help: Current price, item: regularMarketPrice}
"#;

    const LABELS: [(&str, &str); 3] = [("source", "yahoo"), ("plugin", "stocks"), ("ticker", "AAPL")];

    fn context(config: &str, fetcher: StaticFetcher) -> ExporterContext {
        let config = ExporterConfig::parse(config, FileFormat::Yaml).unwrap();
        ExporterContext::new(&config, Arc::new(fetcher)).unwrap()
    }

    #[tokio::test]
    async fn test_update_records_configured_and_builtin_metrics() {
        let fetcher = StaticFetcher::new().with_quote("AAPL", json!({"regularMarketPrice": 150.0}));
        let mut ctx = context(CONFIG, fetcher);

        let report = ctx.update_source("yahoo").await.unwrap();
        assert_eq!(report.updated, 1);

        let families = ctx.metrics().gather();
        assert_eq!(sample_value(&families, "finance_price", &LABELS), Some(150.0));
        assert_eq!(sample_value(&families, "finance_updates", &LABELS), Some(1.0));
        let quote_time = sample_value(&families, "finance_quote_time", &LABELS).unwrap();
        assert!(quote_time >= 0.0);
        assert_eq!(
            sample_value(&families, "finance_quote_histogram", &[("source", "yahoo"), ("plugin", "stocks")]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_fetch_error_records_nothing() {
        let fetcher = StaticFetcher::new().with_error("AAPL");
        let mut ctx = context(CONFIG, fetcher);

        let report = ctx.update_source("yahoo").await.unwrap();
        assert_eq!(report.failed, 1);

        let families = ctx.metrics().gather();
        assert!(!series_exists(&families, "finance_price", &[("ticker", "AAPL")]));
        assert!(!series_exists(&families, "finance_updates", &[("ticker", "AAPL")]));
        assert!(!series_exists(&families, "finance_quote_time", &[("ticker", "AAPL")]));
    }

    #[tokio::test]
    async fn test_empty_quote_is_skipped() {
        let fetcher = StaticFetcher::new().with_empty("AAPL");
        let mut ctx = context(CONFIG, fetcher);

        let report = ctx.update_source("yahoo").await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(!series_exists(&ctx.metrics().gather(), "finance_updates", &[("ticker", "AAPL")]));
    }

    #[tokio::test]
    async fn test_missing_field_only_skips_that_metric() {
        let fetcher = StaticFetcher::new().with_quote("AAPL", json!({"currency": "USD"}));
        let mut ctx = context(CONFIG, fetcher);

        ctx.update_source("yahoo").await.unwrap();

        let families = ctx.metrics().gather();
        assert!(!series_exists(&families, "finance_price", &[("ticker", "AAPL")]));
        assert_eq!(sample_value(&families, "finance_updates", &LABELS), Some(1.0));
        assert!(sample_value(&families, "finance_quote_time", &LABELS).is_some());
    }

    #[tokio::test]
    async fn test_counter_on_text_field_still_increments() {
        let config = r#"
tickers: [AAPL]
sources:
  - name: yahoo
    plugin: stocks
    interval: 60
    metrics:
      trades: {type: Counter, help: Trades, item: exchange}
      price: {type: Gauge, help: Price, item: exchange}
"#;
        let fetcher = StaticFetcher::new().with_quote("AAPL", json!({"exchange": "NMS"}));
        let mut ctx = context(config, fetcher);

        ctx.update_source("yahoo").await.unwrap();
        ctx.update_source("yahoo").await.unwrap();

        let families = ctx.metrics().gather();
        assert_eq!(sample_value(&families, "finance_trades", &LABELS), Some(2.0));
        // a gauge needs a number
        assert!(!series_exists(&families, "finance_price", &[("ticker", "AAPL")]));
    }

    #[tokio::test]
    async fn test_failing_ticker_does_not_stop_siblings() {
        let config = CONFIG.replace("tickers: [AAPL]", "tickers: [AAPL, MSFT, TSLA]");
        let fetcher = StaticFetcher::new()
            .with_quote("AAPL", json!({"regularMarketPrice": 150.0}))
            .with_error("MSFT")
            .with_quote("TSLA", json!({"regularMarketPrice": 250.0}));
        let mut ctx = context(&config, fetcher);

        let report = ctx.update_source("yahoo").await.unwrap();
        assert_eq!(report, UpdateReport { updated: 2, failed: 1, skipped: 0 });

        let families = ctx.metrics().gather();
        assert_eq!(sample_value(&families, "finance_price", &[("ticker", "TSLA")]), Some(250.0));
        assert!(!series_exists(&families, "finance_price", &[("ticker", "MSFT")]));
    }

    #[tokio::test]
    async fn test_only_own_metrics_are_updated() {
        let config = r#"
tickers: [AAPL]
sources:
  - name: yahoo
    plugin: stocks
    interval: 60
    metrics:
      price: {type: Gauge, help: Price, item: regularMarketPrice}
  - name: backup
    plugin: stocks
    interval: 60
    metrics:
      open: {type: Gauge, help: Open, item: regularMarketOpen}
"#;
        let fetcher = StaticFetcher::new().with_quote(
            "AAPL",
            json!({"regularMarketPrice": 150.0, "regularMarketOpen": 149.0}),
        );
        let mut ctx = context(config, fetcher);

        ctx.update_source("yahoo").await.unwrap();
        let families = ctx.metrics().gather();
        assert!(series_exists(&families, "finance_price", &[("ticker", "AAPL")]));
        assert!(!series_exists(&families, "finance_open", &[("ticker", "AAPL")]));
    }

    #[tokio::test]
    async fn test_warm_cache_fills_labels_without_metrics() {
        let config = r#"
tickers: [AAPL]
sources:
  - name: yahoo
    plugin: stocks
    interval: 60
    labels:
      sector: sector
    metrics:
      price: {type: Gauge, help: Price, item: regularMarketPrice}
"#;
        let fetcher = StaticFetcher::new()
            .with_quote("AAPL", json!({"sector": "Technology", "regularMarketPrice": 1.0}));
        let mut ctx = context(config, fetcher);

        ctx.warm_cache().await;

        let cached = ctx.resolver().cache().get("AAPL").unwrap();
        assert_eq!(cached["sector"].as_deref(), Some("Technology"));
        assert!(!series_exists(&ctx.metrics().gather(), "finance_updates", &[("ticker", "AAPL")]));
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let mut ctx = context(CONFIG, StaticFetcher::new());
        assert!(ctx.update_source("missing").await.is_err());
    }
}
