// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout the exporter library
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Custom Error type for the exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Metric '{name}' is defined by both source '{first}' and source '{second}'")]
    MetricNameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("Metric error: {0}")]
    Metric(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<prometheus::Error> for ExporterError {
    fn from(err: prometheus::Error) -> Self {
        ExporterError::Metric(err.to_string())
    }
}

impl From<config::ConfigError> for ExporterError {
    fn from(err: config::ConfigError) -> Self {
        ExporterError::Config(err.to_string())
    }
}

/// Failure of a single quote retrieval. Recoverable: the ticker is skipped
/// for the current cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} for {ticker}")]
    Status { ticker: String, status: u16 },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}
