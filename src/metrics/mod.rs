//! Typed metric instances and value dispatch
mod summary;

pub use summary::{SummarySample, SummaryVec};

use log::debug;
use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::MetricKind;
use crate::error::{ExporterError, Result};
use crate::labels::{LabelMap, LabelSet};
use crate::source::SourceRegistry;

/// Names taken by the metrics every exporter carries
pub const BUILTIN_METRICS: [&str; 3] = ["updates", "quote_time", "quote_histogram"];

/// A configured metric, one variant per supported type
#[derive(Clone)]
pub enum TypedMetric {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl TypedMetric {
    fn new(kind: MetricKind, name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        let metric = match kind {
            MetricKind::Counter => TypedMetric::Counter(CounterVec::new(Opts::new(name, help), labels)?),
            MetricKind::Gauge => TypedMetric::Gauge(GaugeVec::new(Opts::new(name, help), labels)?),
            MetricKind::Histogram => {
                TypedMetric::Histogram(HistogramVec::new(HistogramOpts::new(name, help), labels)?)
            }
            MetricKind::Summary => TypedMetric::Summary(SummaryVec::new(name, help, labels)?),
        };
        Ok(metric)
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        match self {
            TypedMetric::Counter(m) => registry.register(Box::new(m.clone()))?,
            TypedMetric::Gauge(m) => registry.register(Box::new(m.clone()))?,
            TypedMetric::Histogram(m) => registry.register(Box::new(m.clone()))?,
            TypedMetric::Summary(m) => registry.register(Box::new(m.clone()))?,
        }
        Ok(())
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            TypedMetric::Counter(_) => MetricKind::Counter,
            TypedMetric::Gauge(_) => MetricKind::Gauge,
            TypedMetric::Histogram(_) => MetricKind::Histogram,
            TypedMetric::Summary(_) => MetricKind::Summary,
        }
    }

    /// Apply a fetched value. Counters always advance by exactly one; the
    /// value only matters for the other kinds.
    pub fn apply(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<()> {
        match self {
            TypedMetric::Counter(m) => m.get_metric_with(labels)?.inc(),
            TypedMetric::Gauge(m) => m.get_metric_with(labels)?.set(value),
            TypedMetric::Histogram(m) => m.get_metric_with(labels)?.observe(value),
            TypedMetric::Summary(m) => m.observe(labels, value)?,
        }
        Ok(())
    }
}

/// Every metric the exporter serves, registered in its own prometheus registry
pub struct MetricRegistry {
    registry: Registry,
    labels: LabelSet,
    histogram_labels: LabelSet,
    updates: CounterVec,
    quote_time: GaugeVec,
    quote_histogram: HistogramVec,
    configured: HashMap<String, TypedMetric>,
}

impl MetricRegistry {
    /// Build the built-in metrics and one metric per definition of `sources`
    pub fn new(prefix: &str, sources: &SourceRegistry) -> Result<Self> {
        let registry = Registry::new();
        let labels = sources.labels().clone();
        let histogram_labels = LabelSet::histogram_labels();
        let label_names = labels.as_strs();

        debug!("Preparing default metrics with labels: {:?}", label_names);

        let updates = CounterVec::new(
            Opts::new(format!("{}_updates", prefix), "Number of ticker updates"),
            &label_names,
        )?;
        registry.register(Box::new(updates.clone()))?;

        let quote_time = GaugeVec::new(
            Opts::new(format!("{}_quote_time", prefix), "Time spent retrieving quote"),
            &label_names,
        )?;
        registry.register(Box::new(quote_time.clone()))?;

        debug!(
            "Launching histogram with labels {:?}",
            histogram_labels.names()
        );
        let quote_histogram = HistogramVec::new(
            HistogramOpts::new(
                format!("{}_quote_histogram", prefix),
                "Histogram of quote retrieval times",
            )
            .buckets((1..=20).map(f64::from).collect()),
            &histogram_labels.as_strs(),
        )?;
        registry.register(Box::new(quote_histogram.clone()))?;

        let mut configured = HashMap::new();
        for definition in sources.metric_definitions() {
            if configured.contains_key(&definition.name) {
                return Err(ExporterError::Config(format!(
                    "Metric '{}' defined more than once",
                    definition.name
                )));
            }
            debug!(
                "Preparing metric {}({:?}) from {}",
                definition.name, definition.kind, definition.source
            );
            let metric = TypedMetric::new(
                definition.kind,
                &format!("{}_{}", prefix, definition.name),
                &definition.help,
                &label_names,
            )?;
            metric.register(&registry)?;
            configured.insert(definition.name.clone(), metric);
        }

        Ok(Self {
            registry,
            labels,
            histogram_labels,
            updates,
            quote_time,
            quote_histogram,
            configured,
        })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn metric(&self, name: &str) -> Option<&TypedMetric> {
        self.configured.get(name)
    }

    /// Dispatch a value to the configured metric `name`
    pub fn apply(&self, name: &str, labels: &LabelMap, value: f64) -> Result<()> {
        let metric = self
            .configured
            .get(name)
            .ok_or_else(|| ExporterError::Metric(format!("Unknown metric '{}'", name)))?;
        metric.apply(&label_values(&self.labels, labels)?, value)
    }

    /// Book-keeping after every successful fetch: count the update, record
    /// the fetch duration and observe it in the per-source histogram.
    pub fn record_update(&self, labels: &LabelMap, duration: Duration) -> Result<()> {
        let seconds = duration.as_secs_f64();
        let full = label_values(&self.labels, labels)?;
        self.updates.get_metric_with(&full)?.inc();
        self.quote_time.get_metric_with(&full)?.set(seconds);

        let reduced = label_values(&self.histogram_labels, labels)?;
        self.quote_histogram.get_metric_with(&reduced)?.observe(seconds);
        Ok(())
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encode every metric in the text exposition format
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Project a label map onto the names of `set`; unset values become "".
fn label_values<'a>(set: &'a LabelSet, labels: &'a LabelMap) -> Result<HashMap<&'a str, &'a str>> {
    set.names()
        .iter()
        .map(|name| match labels.get(name) {
            Some(value) => Ok((name.as_str(), value.as_deref().unwrap_or(""))),
            None => Err(ExporterError::Metric(format!("Missing label '{}'", name))),
        })
        .collect()
}
