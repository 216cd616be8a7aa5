//! Test doubles and metric inspection helpers
use prometheus::proto::{Metric, MetricFamily, MetricType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::FetchError;
use crate::fetcher::QuoteFetcher;
use crate::quote::Quote;
use crate::source::Source;

#[derive(Debug, Clone)]
enum Scripted {
    Quote(Quote),
    Empty,
    Fail,
}

/// Fetcher answering from a fixed script per ticker. Unscripted tickers fail.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    script: HashMap<String, Scripted>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, ticker: &str, fields: Value) -> Self {
        let quote = Quote::from_value(fields).expect("quote fields must be an object");
        self.script.insert(ticker.to_string(), Scripted::Quote(quote));
        self
    }

    pub fn with_empty(mut self, ticker: &str) -> Self {
        self.script.insert(ticker.to_string(), Scripted::Empty);
        self
    }

    pub fn with_error(mut self, ticker: &str) -> Self {
        self.script.insert(ticker.to_string(), Scripted::Fail);
        self
    }

    /// (source, ticker) pairs fetched so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QuoteFetcher for StaticFetcher {
    async fn fetch(&self, source: &Source, ticker: &str) -> Result<Option<Quote>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.name.clone(), ticker.to_string()));

        match self.script.get(ticker) {
            Some(Scripted::Quote(quote)) => Ok(Some(quote.clone())),
            Some(Scripted::Empty) => Ok(None),
            Some(Scripted::Fail) | None => {
                Err(FetchError::Request(format!("scripted failure for {}", ticker)))
            }
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

fn matching<'a>(
    families: &'a [MetricFamily],
    name: &str,
    labels: &[(&str, &str)],
) -> Option<(&'a MetricFamily, &'a Metric)> {
    let family = families.iter().find(|f| f.get_name() == name)?;
    let metric = family.get_metric().iter().find(|metric| {
        labels.iter().all(|(label, value)| {
            metric
                .get_label()
                .iter()
                .any(|pair| pair.get_name() == *label && pair.get_value() == *value)
        })
    })?;
    Some((family, metric))
}

/// Whether any series of `name` carries all of `labels`
pub fn series_exists(families: &[MetricFamily], name: &str, labels: &[(&str, &str)]) -> bool {
    matching(families, name, labels).is_some()
}

/// Value of the first series of `name` carrying all of `labels`. Histograms
/// and summaries report their observation count.
pub fn sample_value(families: &[MetricFamily], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let (family, metric) = matching(families, name, labels)?;
    match family.get_field_type() {
        MetricType::COUNTER => Some(metric.get_counter().get_value()),
        MetricType::GAUGE => Some(metric.get_gauge().get_value()),
        MetricType::HISTOGRAM => Some(metric.get_histogram().get_sample_count() as f64),
        MetricType::SUMMARY => Some(metric.get_summary().get_sample_count() as f64),
        MetricType::UNTYPED => Some(metric.get_untyped().get_value()),
    }
}
