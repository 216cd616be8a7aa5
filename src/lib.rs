//! Prometheus exporter mapping polled quote fields onto labelled metrics

pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod labels;
pub mod metrics;
pub mod quote;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod util;

#[cfg(test)]
mod testing;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ExporterConfig, MetricKind, load_config};
    pub use crate::context::{ExporterContext, UpdateReport};
    pub use crate::error::{ExporterError, FetchError, Result};
    pub use crate::fetcher::{QuoteFetcher, YahooFetcher};
    pub use crate::labels::{LabelCache, LabelMap, LabelResolver, LabelSet};
    pub use crate::metrics::{MetricRegistry, TypedMetric};
    pub use crate::quote::Quote;
    pub use crate::scheduler::{Scheduler, market_open};
    pub use crate::source::{MetricDefinition, Source, SourceRegistry};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
