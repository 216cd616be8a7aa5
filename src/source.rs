use log::debug;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{ExporterConfig, MetricKind};
use crate::error::Result;
use crate::labels::LabelSet;

/// A metric fed from one quote field of one source
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    /// Name without the global prefix
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
    /// Quote field the value is read from
    pub source_field: String,
    /// Owning source name
    pub source: String,
}

/// A parsed quote source. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub plugin: String,
    /// Minimum time between two polls
    pub interval: Duration,
    /// Label name -> quote field
    pub label_mapping: BTreeMap<String, String>,
    pub metrics: Vec<MetricDefinition>,
}

/// All configured sources plus the label set derived from them
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    labels: LabelSet,
}

impl SourceRegistry {
    /// Build the registry from a configuration, validating it first
    pub fn from_config(config: &ExporterConfig) -> Result<Self> {
        config.validate()?;

        let sources: Vec<Source> = config
            .sources
            .iter()
            .map(|def| {
                let metrics = def
                    .metrics
                    .iter()
                    .map(|(name, metric)| MetricDefinition {
                        name: name.clone(),
                        kind: metric.kind,
                        help: if metric.help.trim().is_empty() {
                            format!("{} reported by {}", metric.item, def.name)
                        } else {
                            metric.help.clone()
                        },
                        source_field: metric.item.clone(),
                        source: def.name.clone(),
                    })
                    .collect();

                Source {
                    name: def.name.clone(),
                    plugin: def.plugin.clone(),
                    interval: Duration::from_secs(def.interval),
                    label_mapping: def.labels.clone(),
                    metrics,
                }
            })
            .collect();

        let labels = LabelSet::from_sources(&sources);
        debug!("Computed label set: {:?}", labels.names());

        Ok(Self { sources, labels })
    }

    /// Sources in config order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Look up a source by name
    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|source| source.name == name)
    }

    /// Union of the identity labels and every source's label mapping keys
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Every metric definition across all sources
    pub fn metric_definitions(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.sources.iter().flat_map(|source| source.metrics.iter())
    }

    /// Get the number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if no source is configured
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
