//! Market snapshot side of the 0DTE core: symbol conventions, the exchange
//! session calendar, the snapshot cache and the tasks that feed and sweep it.

pub mod cache;
pub mod convention;
pub mod feed;
pub mod session;

pub use cache::{BatchSummary, CacheStats, SnapshotCache, UpsertOutcome};
pub use convention::{occ_symbol, ContractSpec, OccConvention, SymbolConvention};
pub use feed::{run_ingest, run_sweeper, IngestStats, ReplayFeed};
pub use session::SessionCalendar;
