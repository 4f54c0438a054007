//! Feed ingestion and cache housekeeping tasks.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use zdte_core::{Clock, InstrumentRecord, MarketFeed};

use crate::cache::{SnapshotCache, UpsertOutcome};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// In-memory feed that replays pre-loaded records in order.
///
/// With a clock attached, each record is restamped to the clock's current
/// time as it is handed out, which turns a recorded chain into "live" data.
#[derive(Debug, Default)]
pub struct ReplayFeed {
    records: VecDeque<InstrumentRecord>,
    restamp: Option<Arc<dyn Clock>>,
}

impl ReplayFeed {
    pub fn new(records: impl IntoIterator<Item = InstrumentRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
            restamp: None,
        }
    }

    /// Parses one JSON-encoded record per non-empty line.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first line that fails to decode or
    /// violates the record invariants.
    pub fn from_json_lines(input: &str) -> Result<Self> {
        let mut records = VecDeque::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: InstrumentRecord = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid instrument record", idx + 1))?;
            record
                .validate()
                .with_context(|| format!("line {}: rejected instrument record", idx + 1))?;
            records.push_back(record);
        }
        Ok(Self {
            records,
            restamp: None,
        })
    }

    /// Reads a JSON-lines chain file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chain file {}", path.display()))?;
        Self::from_json_lines(&contents)
    }

    #[must_use]
    pub fn restamped_to(mut self, clock: Arc<dyn Clock>) -> Self {
        self.restamp = Some(clock);
        self
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    /// Drains every remaining record at once, restamped if configured.
    pub fn drain_all(&mut self) -> Vec<InstrumentRecord> {
        let restamp = self.restamp.clone();
        self.records
            .drain(..)
            .map(|record| match &restamp {
                Some(clock) => record.restamped(clock.now()),
                None => record,
            })
            .collect()
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn next_update(&mut self) -> Result<Option<InstrumentRecord>> {
        let Some(record) = self.records.pop_front() else {
            return Ok(None);
        };
        Ok(Some(match &self.restamp {
            Some(clock) => record.restamped(clock.now()),
            None => record,
        }))
    }
}

/// Counters reported when an ingest task ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub stored: u64,
    pub dropped: u64,
    pub feed_errors: u64,
}

/// Pulls records from `feed` into `cache` until the feed ends or shutdown is
/// signalled. Feed errors are logged and retried with exponential backoff.
///
/// # Errors
///
/// Currently always returns `Ok`; the signature leaves room for fatal feed
/// conditions.
pub async fn run_ingest<F>(
    mut feed: F,
    cache: Arc<SnapshotCache>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<IngestStats>
where
    F: MarketFeed,
{
    info!("Market feed ingestion started");
    let mut stats = IngestStats::default();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let update = tokio::select! {
            update = feed.next_update() => update,
            _ = shutdown.changed() => break,
        };

        match update {
            Ok(Some(record)) => {
                backoff = INITIAL_BACKOFF;
                let symbol = record.symbol.clone();
                let outcome = cache.upsert(record);
                if outcome.is_stored() {
                    stats.stored += 1;
                } else {
                    stats.dropped += 1;
                    if outcome == UpsertOutcome::DroppedInvalid {
                        warn!(symbol = %symbol, "Feed delivered an invalid record");
                    }
                }
            }
            Ok(None) => {
                info!("Market feed exhausted");
                break;
            }
            Err(e) => {
                stats.feed_errors += 1;
                warn!(error = %e, backoff_secs = backoff.as_secs(), "Market feed error, backing off");
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => break,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    info!(
        stored = stats.stored,
        dropped = stats.dropped,
        feed_errors = stats.feed_errors,
        "Market feed ingestion stopped"
    );
    Ok(stats)
}

/// Periodically evicts records past the staleness bound or the session cutoff.
pub async fn run_sweeper(cache: Arc<SnapshotCache>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_secs = every.as_secs(), "Cache sweeper started");
    let mut interval = tokio::time::interval(every);
    // first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = cache.sweep_stale();
                debug!(removed, remaining = cache.len(), "Cache sweep complete");
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    error!("Shutdown channel closed, stopping cache sweeper");
                }
                break;
            }
        }
    }

    info!("Cache sweeper stopped");
}
