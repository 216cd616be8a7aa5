use config::{self, File, FileFormat};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::error::{ExporterError, Result};
use crate::labels::IDENTITY_LABELS;
use crate::metrics::BUILTIN_METRICS;

/// Exporter configuration, as read from the configuration document
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExporterConfig {
    /// Port the exposition server listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix joined onto every exported metric name
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    /// Fetch every ticker once before serving, to warm the label cache
    #[serde(default)]
    pub update_cache_on_startup: bool,
    /// Scheduler scan period in seconds
    #[serde(default = "default_min_interval")]
    pub min_interval: u64,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Ticker symbols polled from every source
    #[serde(default)]
    pub tickers: Vec<String>,
    /// Quote source definitions
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
}

/// A quote source as declared in the configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceDefinition {
    /// Unique source name, exported as the `source` label
    pub name: String,
    /// Free-form tag, exported as the `plugin` label
    pub plugin: String,
    /// Minimum seconds between two polls of this source
    pub interval: u64,
    /// Label name -> quote field
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Metric name -> definition
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricDefinitionConfig>,
}

/// A metric as declared under a source
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricDefinitionConfig {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default)]
    pub help: String,
    /// Quote field the value is read from
    pub item: String,
}

/// The four supported metric types
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

/// Logging level
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

fn default_port() -> u16 {
    8000
}

fn default_metric_prefix() -> String {
    "finance".to_string()
}

fn default_min_interval() -> u64 {
    15
}

impl ExporterConfig {
    /// Parse a configuration document held in memory
    pub fn parse(contents: &str, format: FileFormat) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?;

        let parsed: ExporterConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject configurations the exporter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ExporterError::Config(
                "Refusing to initialize with no defined sources".to_string(),
            ));
        }
        if self.tickers.is_empty() {
            return Err(ExporterError::Config("No tickers configured".to_string()));
        }
        if self.min_interval == 0 {
            return Err(ExporterError::Config("min_interval must be at least 1 second".to_string()));
        }
        if !is_valid_metric_name(&self.metric_prefix) {
            return Err(ExporterError::Config(format!(
                "Invalid metric_prefix '{}'",
                self.metric_prefix
            )));
        }

        let mut tickers = HashSet::new();
        for ticker in &self.tickers {
            if ticker.trim().is_empty() {
                return Err(ExporterError::Config("Empty ticker symbol".to_string()));
            }
            if !tickers.insert(ticker.as_str()) {
                return Err(ExporterError::Config(format!("Ticker '{}' listed twice", ticker)));
            }
        }

        let mut source_names = HashSet::new();
        // metric name -> owning source
        let mut metric_owners: HashMap<&str, &str> = HashMap::new();

        for source in &self.sources {
            if source.name.is_empty() {
                return Err(ExporterError::Config("Source with empty name".to_string()));
            }
            if !source_names.insert(source.name.as_str()) {
                return Err(ExporterError::Config(format!(
                    "Source '{}' defined twice",
                    source.name
                )));
            }
            if source.interval == 0 {
                return Err(ExporterError::Config(format!(
                    "Source '{}': interval must be at least 1 second",
                    source.name
                )));
            }

            for label in source.labels.keys() {
                if IDENTITY_LABELS.contains(&label.as_str()) {
                    return Err(ExporterError::Config(format!(
                        "Source '{}': label '{}' is reserved",
                        source.name, label
                    )));
                }
                if !is_valid_label_name(label) {
                    return Err(ExporterError::Config(format!(
                        "Source '{}': invalid label name '{}'",
                        source.name, label
                    )));
                }
            }

            for name in source.metrics.keys() {
                if BUILTIN_METRICS.contains(&name.as_str()) {
                    return Err(ExporterError::Config(format!(
                        "Source '{}': metric name '{}' is reserved",
                        source.name, name
                    )));
                }
                if !is_valid_metric_name(&format!("{}_{}", self.metric_prefix, name)) {
                    return Err(ExporterError::Config(format!(
                        "Source '{}': invalid metric name '{}'",
                        source.name, name
                    )));
                }
                if let Some(first) = metric_owners.insert(name.as_str(), source.name.as_str()) {
                    return Err(ExporterError::MetricNameCollision {
                        name: name.clone(),
                        first: first.to_string(),
                        second: source.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Address for the exposition server. A command-line value wins over the
    /// configured port and may be a bare port or `ip:port`.
    pub fn listen_addr(&self, cli_override: Option<&str>) -> Result<SocketAddr> {
        let unspecified = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        match cli_override {
            None => Ok(SocketAddr::new(unspecified, self.port)),
            Some(value) => {
                let value = value.trim();
                if let Ok(port) = value.parse::<u16>() {
                    return Ok(SocketAddr::new(unspecified, port));
                }
                value.parse::<SocketAddr>().map_err(|_| {
                    ExporterError::Config(format!("Invalid listen address '{}'", value))
                })
            }
        }
    }
}

/// Load and validate the exporter configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ExporterConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(ExporterError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(ExporterError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            )));
        }
    };

    let format = match extension.as_str() {
        "toml" => FileFormat::Toml,
        "json" => FileFormat::Json,
        "yaml" | "yml" => FileFormat::Yaml,
        format => {
            error!("Unsupported configuration format: {}", format);
            return Err(ExporterError::Config(format!("Unsupported config format: {}", format)));
        }
    };

    let config = config::Config::builder()
        .add_source(File::from(path).format(format))
        .build()?;

    let parsed: ExporterConfig = config
        .try_deserialize()
        .map_err(|e| ExporterError::Config(format!("Invalid config {}: {}", path.display(), e)))?;

    parsed.validate()?;
    Ok(parsed)
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
