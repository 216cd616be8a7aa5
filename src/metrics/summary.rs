//! Labelled summary metric. The prometheus crate ships no summary vector,
//! so this collector keeps a count and a sum per label set and exposes them
//! as a quantile-free summary.
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ExporterError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummarySample {
    pub count: u64,
    pub sum: f64,
}

#[derive(Debug)]
struct SummaryCore {
    desc: Desc,
    label_names: Vec<String>,
    samples: Mutex<HashMap<Vec<String>, SummarySample>>,
}

/// A summary partitioned by label values
#[derive(Debug, Clone)]
pub struct SummaryVec {
    core: Arc<SummaryCore>,
}

impl SummaryVec {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> Result<Self> {
        let label_names: Vec<String> = label_names.iter().map(|l| l.to_string()).collect();
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            label_names.clone(),
            HashMap::new(),
        )?;

        Ok(Self {
            core: Arc::new(SummaryCore {
                desc,
                label_names,
                samples: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Record one observation for the given label values
    pub fn observe(&self, labels: &HashMap<&str, &str>, value: f64) -> Result<()> {
        let key = self.key(labels)?;
        let mut samples = self
            .core
            .samples
            .lock()
            .map_err(|_| ExporterError::Metric("Lock poisoned".to_string()))?;

        let sample = samples.entry(key).or_default();
        sample.count += 1;
        sample.sum += value;
        Ok(())
    }

    /// Current count and sum for the given label values, if observed
    pub fn sample(&self, labels: &HashMap<&str, &str>) -> Result<Option<SummarySample>> {
        let key = self.key(labels)?;
        let samples = self
            .core
            .samples
            .lock()
            .map_err(|_| ExporterError::Metric("Lock poisoned".to_string()))?;
        Ok(samples.get(&key).copied())
    }

    fn key(&self, labels: &HashMap<&str, &str>) -> Result<Vec<String>> {
        if labels.len() != self.core.label_names.len() {
            return Err(ExporterError::Metric(format!(
                "{}: expected {} labels, got {}",
                self.core.desc.fq_name,
                self.core.label_names.len(),
                labels.len()
            )));
        }

        self.core
            .label_names
            .iter()
            .map(|name| {
                labels.get(name.as_str()).map(|v| v.to_string()).ok_or_else(|| {
                    ExporterError::Metric(format!(
                        "{}: missing label '{}'",
                        self.core.desc.fq_name, name
                    ))
                })
            })
            .collect()
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let samples = match self.core.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut family = MetricFamily::default();
        family.set_name(self.core.desc.fq_name.clone());
        family.set_help(self.core.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        for (values, sample) in samples.iter() {
            let mut pairs: Vec<LabelPair> = self
                .core
                .label_names
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut summary = proto::Summary::default();
            summary.set_sample_count(sample.count);
            summary.set_sample_sum(sample.sum);

            let mut metric = proto::Metric::default();
            metric.set_label(pairs.into());
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}
