//! In-memory account used for paper sessions and tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{info, warn};

use zdte_core::{AccountRiskState, AccountSource};

use crate::execution::ExecutionReport;

#[derive(Debug)]
pub struct PaperAccount {
    state: RwLock<AccountRiskState>,
}

impl PaperAccount {
    pub fn new(starting_buying_power: Decimal) -> Self {
        Self {
            state: RwLock::new(AccountRiskState {
                buying_power: Some(starting_buying_power),
                ..AccountRiskState::default()
            }),
        }
    }

    pub fn snapshot(&self) -> AccountRiskState {
        self.state.read().clone()
    }

    pub fn set_daily_pnl(&self, realized: Decimal, unrealized: Decimal) {
        let mut state = self.state.write();
        state.daily_realized_pnl = realized;
        state.daily_unrealized_pnl = unrealized;
    }

    pub fn set_portfolio_delta(&self, delta: Decimal) {
        self.state.write().portfolio_delta = delta;
    }

    pub fn set_buying_power(&self, buying_power: Option<Decimal>) {
        self.state.write().buying_power = buying_power;
    }

    /// Books a paper fill: premium and commission move buying power,
    /// commission is realised immediately and the position's delta is added.
    pub fn record_execution(&self, report: &ExecutionReport) {
        let mut state = self.state.write();
        if let Some(bp) = state.buying_power.as_mut() {
            *bp -= report.net_premium + report.commission;
        }
        state.daily_realized_pnl -= report.commission;
        state.portfolio_delta += report.net_delta;
        info!(
            order_id = %report.order_id,
            buying_power = ?state.buying_power,
            portfolio_delta = %state.portfolio_delta,
            "Paper account updated"
        );
    }
}

#[async_trait]
impl AccountSource for PaperAccount {
    async fn current_risk_state(&self) -> Result<AccountRiskState> {
        Ok(self.snapshot())
    }

    async fn set_kill_switch(&self, enabled: bool) -> Result<()> {
        self.state.write().kill_switch_engaged = enabled;
        if enabled {
            warn!("Kill switch engaged, all new intents will be rejected");
        } else {
            info!("Kill switch released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn kill_switch_is_visible_on_next_read() {
        let account = PaperAccount::new(dec!(1000));
        assert!(!account.current_risk_state().await.unwrap().kill_switch_engaged);
        account.set_kill_switch(true).await.unwrap();
        assert!(account.current_risk_state().await.unwrap().kill_switch_engaged);
    }

    #[test]
    fn execution_moves_buying_power_and_delta() {
        let account = PaperAccount::new(dec!(1000));
        account.record_execution(&ExecutionReport {
            order_id: "PAPER-1".to_string(),
            fills: Vec::new(),
            net_premium: dec!(105),
            commission: dec!(0.65),
            net_delta: dec!(0.31),
            executed_at: Utc::now(),
        });
        let state = account.snapshot();
        assert_eq!(state.buying_power, Some(dec!(894.35)));
        assert_eq!(state.daily_realized_pnl, dec!(-0.65));
        assert_eq!(state.portfolio_delta, dec!(0.31));
    }
}
