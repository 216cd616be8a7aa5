//! Label set computation, per-ticker label cache and label resolution
use log::trace;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::quote::Quote;
use crate::source::Source;

/// Labels every series carries, filled from the source and ticker themselves
pub const IDENTITY_LABELS: [&str; 3] = ["plugin", "source", "ticker"];

pub const TICKER_LABEL: &str = "ticker";

/// Label name -> value. `None` means no value has been observed yet.
pub type LabelMap = BTreeMap<String, Option<String>>;

/// The fixed, ordered label names shared by all per-ticker series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Identity labels first, then every mapped label name once, sorted
    pub fn new<I, S>(mapped: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = IDENTITY_LABELS.iter().map(|l| l.to_string()).collect();
        let extra: BTreeSet<String> = mapped
            .into_iter()
            .map(Into::into)
            .filter(|name| !IDENTITY_LABELS.contains(&name.as_str()))
            .collect();
        names.extend(extra);
        Self { names }
    }

    /// Union of the identity labels and every source's label mapping
    pub fn from_sources(sources: &[Source]) -> Self {
        Self::new(
            sources
                .iter()
                .flat_map(|source| source.label_mapping.keys().cloned()),
        )
    }

    /// Labels for the quote duration histogram: identity labels without `ticker`
    pub fn histogram_labels() -> Self {
        Self {
            names: IDENTITY_LABELS
                .iter()
                .filter(|l| **l != TICKER_LABEL)
                .map(|l| l.to_string())
                .collect(),
        }
    }

    /// Label names in registration order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Label names borrowed as `&str`, as prometheus vec constructors expect
    pub fn as_strs(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Whether `name` is part of this set
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Get the number of label names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the set holds no label names
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// A label map holding every name of this set with no value
    pub fn empty_map(&self) -> LabelMap {
        self.names.iter().map(|name| (name.clone(), None)).collect()
    }
}

/// Last known value of every label, per ticker. Entries are only ever
/// overwritten with concrete values, never cleared.
#[derive(Debug, Clone, Default)]
pub struct LabelCache {
    entries: HashMap<String, LabelMap>,
}

impl LabelCache {
    /// Pre-populate every ticker with all labels unset
    pub fn new(tickers: &[String], labels: &LabelSet) -> Self {
        let entries = tickers
            .iter()
            .map(|ticker| (ticker.clone(), labels.empty_map()))
            .collect();
        Self { entries }
    }

    /// Cached labels of `ticker`, if it was ever seen
    pub fn get(&self, ticker: &str) -> Option<&LabelMap> {
        self.entries.get(ticker)
    }

    /// Get the number of cached tickers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no ticker is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&mut self, ticker: &str, labels: &LabelSet) -> &mut LabelMap {
        self.entries
            .entry(ticker.to_string())
            .or_insert_with(|| labels.empty_map())
    }
}

/// Turns a fresh quote into a complete label map for one ticker/source pair,
/// falling back on the cache for fields the quote lacks.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    labels: LabelSet,
    cache: LabelCache,
}

impl LabelResolver {
    pub fn new(labels: LabelSet, cache: LabelCache) -> Self {
        Self { labels, cache }
    }

    /// Label set every resolved map is keyed by
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Last known label values per ticker
    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }

    /// Resolve the labels for `ticker` from `source`, updating the cache.
    /// The result holds exactly the names of the label set.
    pub fn resolve(&mut self, source: &Source, ticker: &str, quote: &Quote) -> LabelMap {
        let mut fresh: BTreeMap<String, String> = BTreeMap::new();
        fresh.insert("source".to_string(), source.name.clone());
        fresh.insert("plugin".to_string(), source.plugin.clone());
        fresh.insert(TICKER_LABEL.to_string(), ticker.to_string());

        for (label, field) in &source.label_mapping {
            if let Some(value) = quote.label_value(field) {
                fresh.insert(label.clone(), value);
            }
        }

        let cached = self.cache.entry(ticker, &self.labels);
        for (label, value) in &fresh {
            cached.insert(label.clone(), Some(value.clone()));
        }

        let resolved: LabelMap = self
            .labels
            .names()
            .iter()
            .map(|name| {
                let value = match fresh.get(name) {
                    Some(value) => Some(value.clone()),
                    None => cached.get(name).cloned().flatten(),
                };
                (name.clone(), value)
            })
            .collect();

        trace!("Resolved labels for {} from {}: {:?}", ticker, source.name, resolved);
        resolved
    }
}
