//! Snapshot cache: freshest record per symbol, never served past its bounds.
//!
//! Records are stored as `Arc<InstrumentRecord>` and replaced wholesale, so a
//! reader holding a record can never observe a half-written update. Every read
//! re-checks liveness against the clock:
//! - age must not exceed the staleness bound
//! - no session cutoff may lie between the observation and now
//!
//! The periodic sweep only reclaims memory; correctness never depends on it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use zdte_core::{CacheConfig, Clock, InstrumentRecord, OptionRight};

use crate::convention::{ContractSpec, OccConvention, SymbolConvention};
use crate::session::SessionCalendar;

/// What `upsert` did with a record. Never an error: the feed keeps flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Older than the stored observation for the same symbol.
    DroppedOutOfOrder,
    /// Observed at or after its session's cutoff.
    DroppedAfterClose,
    /// Violates the record invariants.
    DroppedInvalid,
}

impl UpsertOutcome {
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// Tally for a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub dropped: usize,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub live: usize,
    pub calls: usize,
    pub puts: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub oldest_observed: Option<DateTime<Utc>>,
    pub newest_observed: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
    records: HashMap<String, Arc<InstrumentRecord>>,
    last_update: Option<DateTime<Utc>>,
}

pub struct SnapshotCache {
    state: RwLock<CacheState>,
    clock: Arc<dyn Clock>,
    calendar: SessionCalendar,
    convention: Arc<dyn SymbolConvention>,
    max_staleness: Duration,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SnapshotCache")
            .field("records", &state.records.len())
            .field("last_update", &state.last_update)
            .field("max_staleness", &self.max_staleness)
            .field("calendar", &self.calendar)
            .finish()
    }
}

impl SnapshotCache {
    /// Creates a cache using OCC symbology.
    ///
    /// # Errors
    ///
    /// Returns an error if the cutoff time or time zone in `config` is invalid.
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::with_parts(
            SessionCalendar::from_config(config)?,
            config.max_staleness(),
            clock,
            Arc::new(OccConvention),
        ))
    }

    #[must_use]
    pub fn with_parts(
        calendar: SessionCalendar,
        max_staleness: Duration,
        clock: Arc<dyn Clock>,
        convention: Arc<dyn SymbolConvention>,
    ) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            clock,
            calendar,
            convention,
            max_staleness,
        }
    }

    /// Swaps the symbol convention (call/put and strike decoding).
    #[must_use]
    pub fn with_convention(mut self, convention: Arc<dyn SymbolConvention>) -> Self {
        self.convention = convention;
        self
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decodes a symbol with the cache's convention.
    pub fn contract_spec(&self, symbol: &str) -> Option<ContractSpec> {
        self.convention.parse(symbol)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Stores `record` unless an equal-or-newer observation already exists.
    pub fn upsert(&self, record: InstrumentRecord) -> UpsertOutcome {
        if let Err(e) = record.validate() {
            warn!(error = %e, "Dropping invalid instrument record");
            return UpsertOutcome::DroppedInvalid;
        }
        if self.calendar.is_after_close(record.observed_at) {
            debug!(symbol = %record.symbol, observed_at = %record.observed_at, "Dropping post-close record");
            return UpsertOutcome::DroppedAfterClose;
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        let outcome = match state.records.get(&record.symbol) {
            Some(existing) if existing.observed_at > record.observed_at => {
                debug!(
                    symbol = %record.symbol,
                    stored = %existing.observed_at,
                    incoming = %record.observed_at,
                    "Dropping out-of-order record"
                );
                return UpsertOutcome::DroppedOutOfOrder;
            }
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };

        state.records.insert(record.symbol.clone(), Arc::new(record));
        state.last_update = Some(now);
        outcome
    }

    /// Applies a chain refresh record by record.
    pub fn upsert_batch(&self, records: impl IntoIterator<Item = InstrumentRecord>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in records {
            match self.upsert(record) {
                UpsertOutcome::Inserted => summary.inserted += 1,
                UpsertOutcome::Replaced => summary.replaced += 1,
                _ => summary.dropped += 1,
            }
        }
        debug!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            dropped = summary.dropped,
            "Applied chain batch"
        );
        summary
    }

    /// Removes records observed before `cutoff`, plus everything a session
    /// cutoff has already killed. Returns how many were removed.
    pub fn sweep_expired(&self, cutoff: DateTime<Utc>) -> usize {
        let now = self.clock.now();
        let mut state = self.state.write();
        let before = state.records.len();
        state.records.retain(|_, record| {
            record.observed_at >= cutoff && !self.calendar.crossed_close(record.observed_at, now)
        });
        let removed = before - state.records.len();
        if removed > 0 {
            info!(removed, remaining = state.records.len(), "Swept expired option records");
        }
        removed
    }

    /// Sweep with the configured staleness bound as the cutoff.
    pub fn sweep_stale(&self) -> usize {
        self.sweep_expired(self.clock.now() - self.max_staleness)
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        let count = state.records.len();
        state.records.clear();
        info!(count, "Cleared option snapshot cache");
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Live record for `symbol` under the configured staleness bound.
    pub fn get(&self, symbol: &str) -> Option<Arc<InstrumentRecord>> {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .records
            .get(symbol)
            .filter(|record| self.is_live_at(record, now, self.max_staleness))
            .cloned()
    }

    /// Live record of the given right whose delta is closest to `target_delta`.
    ///
    /// Ties go to the higher volume, then the lexicographically smaller symbol,
    /// so the answer is deterministic for a given snapshot.
    pub fn nearest_by_delta(
        &self,
        target_delta: Decimal,
        right: OptionRight,
        max_staleness: Duration,
    ) -> Option<Arc<InstrumentRecord>> {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|record| self.convention.right(&record.symbol) == Some(right))
            .filter(|record| self.is_live_at(record, now, max_staleness))
            .min_by(|a, b| {
                let da = (a.delta() - target_delta).abs();
                let db = (b.delta() - target_delta).abs();
                da.cmp(&db)
                    .then_with(|| b.volume.cmp(&a.volume))
                    .then_with(|| a.symbol.cmp(&b.symbol))
            })
            .cloned()
    }

    /// Live contract in the same series as `like`, at `strike`.
    pub fn find_by_strike(&self, like: &ContractSpec, strike: Decimal) -> Option<Arc<InstrumentRecord>> {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|record| {
                self.convention
                    .parse(&record.symbol)
                    .is_some_and(|spec| spec.same_series(like) && spec.strike == strike)
            })
            .filter(|record| self.is_live_at(record, now, self.max_staleness))
            .min_by(|a, b| b.volume.cmp(&a.volume).then_with(|| a.symbol.cmp(&b.symbol)))
            .cloned()
    }

    /// Live contracts of one right with `min <= strike <= max`, sorted by strike.
    pub fn by_strike_range(
        &self,
        min_strike: Decimal,
        max_strike: Decimal,
        right: OptionRight,
    ) -> Vec<(ContractSpec, Arc<InstrumentRecord>)> {
        let mut matches: Vec<_> = self
            .live_with_specs(Some(right))
            .into_iter()
            .filter(|(spec, _)| spec.strike >= min_strike && spec.strike <= max_strike)
            .collect();
        matches.sort_by(|(a, ra), (b, rb)| a.strike.cmp(&b.strike).then_with(|| ra.symbol.cmp(&rb.symbol)));
        matches
    }

    /// Every live record, optionally filtered by right, sorted by symbol.
    pub fn live_records(&self, right: Option<OptionRight>) -> Vec<Arc<InstrumentRecord>> {
        let mut records: Vec<_> = self
            .live_with_specs(right)
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }

    /// Live records paired with their decoded terms; undecodable symbols are skipped.
    pub fn live_with_specs(&self, right: Option<OptionRight>) -> Vec<(ContractSpec, Arc<InstrumentRecord>)> {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|record| self.is_live_at(record, now, self.max_staleness))
            .filter_map(|record| {
                let spec = self.convention.parse(&record.symbol)?;
                right
                    .map_or(true, |r| spec.right == r)
                    .then(|| (spec, Arc::clone(record)))
            })
            .collect()
    }

    /// Number of live records of the given right.
    pub fn live_count(&self, right: OptionRight) -> usize {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|record| self.convention.right(&record.symbol) == Some(right))
            .filter(|record| self.is_live_at(record, now, self.max_staleness))
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let state = self.state.read();
        let mut stats = CacheStats {
            total: state.records.len(),
            live: 0,
            calls: 0,
            puts: 0,
            last_update: state.last_update,
            oldest_observed: None,
            newest_observed: None,
        };

        for record in state.records.values() {
            if self.is_live_at(record, now, self.max_staleness) {
                stats.live += 1;
            }
            match self.convention.right(&record.symbol) {
                Some(OptionRight::Call) => stats.calls += 1,
                Some(OptionRight::Put) => stats.puts += 1,
                None => {}
            }
            let at = record.observed_at;
            stats.oldest_observed = Some(stats.oldest_observed.map_or(at, |o| o.min(at)));
            stats.newest_observed = Some(stats.newest_observed.map_or(at, |n| n.max(at)));
        }

        stats
    }

    /// Stored records, live or not.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    fn is_live_at(&self, record: &InstrumentRecord, now: DateTime<Utc>, max_staleness: Duration) -> bool {
        now - record.observed_at <= max_staleness && !self.calendar.crossed_close(record.observed_at, now)
    }
}
