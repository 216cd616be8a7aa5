use chrono::{DateTime, Datelike, Local, Timelike};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::time::Duration;

use crate::context::ExporterContext;
use crate::source::{Source, SourceRegistry};

/// Simplified trading window: Monday to Friday, local hour strictly between
/// 6 and 18. No holidays, no exchange time zones.
pub fn market_open<T: Datelike + Timelike>(now: &T) -> bool {
    now.weekday().num_days_from_monday() < 5 && now.hour() > 6 && now.hour() < 18
}

/// Single polling loop deciding which sources are due on each scan
pub struct Scheduler {
    min_interval: Duration,
    last_run: HashMap<String, DateTime<Local>>,
}

impl Scheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: HashMap::new(),
        }
    }

    /// When the source's pipeline was last invoked, if ever
    pub fn last_run(&self, source: &str) -> Option<DateTime<Local>> {
        self.last_run.get(source).copied()
    }

    /// Due iff the market is open and more than `interval` has passed since
    /// the last run. A source that never ran is due as soon as the market opens.
    pub fn is_due(&self, source: &Source, now: DateTime<Local>) -> bool {
        if !market_open(&now) {
            return false;
        }
        match self.last_run.get(&source.name) {
            None => true,
            Some(last) => now
                .signed_duration_since(*last)
                .to_std()
                .map(|elapsed| elapsed > source.interval)
                .unwrap_or(false),
        }
    }

    /// One scan over all sources. Returns the names of the sources updated.
    pub async fn tick(&mut self, ctx: &mut ExporterContext, now: DateTime<Local>) -> Vec<String> {
        if !market_open(&now) {
            trace!("Market closed at {}, nothing to do", now.format("%a %H:%M"));
            return Vec::new();
        }

        let due = self.due_sources(ctx.sources(), now);
        for name in &due {
            debug!("Updating Source {}", name);
            match ctx.update_source(name).await {
                Ok(report) => debug!(
                    "Source {} done: {} updated, {} failed, {} skipped",
                    name, report.updated, report.failed, report.skipped
                ),
                Err(e) => warn!("Update of source {} failed: {}", name, e),
            }
            self.last_run.insert(name.clone(), now);
        }
        due
    }

    fn due_sources(&self, sources: &SourceRegistry, now: DateTime<Local>) -> Vec<String> {
        sources
            .sources()
            .iter()
            .filter(|source| self.is_due(source, now))
            .map(|source| source.name.clone())
            .collect()
    }

    /// Scan every `min_interval` until the process is terminated
    pub async fn run(mut self, mut ctx: ExporterContext) {
        info!(
            "Polling {} sources, scanning every {}s",
            ctx.sources().len(),
            self.min_interval.as_secs()
        );
        loop {
            self.tick(&mut ctx, Local::now()).await;
            tokio::time::sleep(self.min_interval).await;
        }
    }
}
