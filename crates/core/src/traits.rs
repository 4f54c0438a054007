use crate::account::AccountRiskState;
use crate::instrument::InstrumentRecord;
use anyhow::Result;
use async_trait::async_trait;

/// Source of option snapshots (quotes + greeks).
///
/// `Ok(None)` means the feed is exhausted; errors are transient and the
/// caller may keep polling.
#[async_trait]
pub trait MarketFeed: Send {
    async fn next_update(&mut self) -> Result<Option<InstrumentRecord>>;
}

/// Broker-side account state, read at every mint and confirm.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn current_risk_state(&self) -> Result<AccountRiskState>;

    /// Engages or releases the kill switch; must be visible to the next
    /// `current_risk_state` call.
    async fn set_kill_switch(&self, enabled: bool) -> Result<()>;
}
