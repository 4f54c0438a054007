use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time account risk picture supplied by the broker side.
///
/// Read-only to the gate: nothing in this workspace mutates a snapshot
/// it was handed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountRiskState {
    pub daily_realized_pnl: Decimal,
    pub daily_unrealized_pnl: Decimal,
    /// Net portfolio delta, in per-contract delta units.
    pub portfolio_delta: Decimal,
    pub kill_switch_engaged: bool,
    /// Not every account source can report it; `None` skips the check.
    #[serde(default)]
    pub buying_power: Option<Decimal>,
}

impl AccountRiskState {
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        self.daily_realized_pnl + self.daily_unrealized_pnl
    }
}
