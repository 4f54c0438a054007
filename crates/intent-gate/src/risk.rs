//! Risk evaluator: account state + proposal -> pass/violations.
//!
//! Pure and deterministic: the caller passes `now`, nothing is read from the
//! environment and nothing is mutated. Every rule is evaluated; the kill
//! switch, when engaged, is always the first violation reported.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use zdte_core::{AccountRiskState, RiskConfig};

use crate::error::Violation;
use crate::types::{RiskSummary, TradeProposal};

/// Debit above which a warning is attached.
const HIGH_COST_WARNING: Decimal = dec!(1000);

/// How close the account is to each limit, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskUtilization {
    pub loss_pct: Decimal,
    pub delta_pct: Decimal,
}

#[derive(Debug, Clone)]
pub struct RiskEvaluator {
    config: RiskConfig,
    max_staleness: Duration,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig, max_staleness: Duration) -> Self {
        Self {
            config,
            max_staleness,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Oldest pricing snapshot a proposal may be checked against.
    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    pub fn evaluate(&self, proposal: &TradeProposal, state: &AccountRiskState, now: DateTime<Utc>) -> RiskSummary {
        let mut violations = Vec::new();

        // 1. Kill switch
        if state.kill_switch_engaged {
            violations.push(Violation::TradingHalted);
        }

        // 2. Daily loss cap, treating the debit as an immediate loss
        let projected_pnl = state.daily_pnl() - proposal.estimated_cost;
        if projected_pnl <= -self.config.max_daily_loss {
            violations.push(Violation::DailyLossCap {
                projected_pnl,
                max_daily_loss: self.config.max_daily_loss,
            });
        }

        // 3. Portfolio delta cap
        let projected_delta = state.portfolio_delta + proposal.net_delta;
        if projected_delta.abs() > self.config.delta_cap {
            violations.push(Violation::DeltaCap {
                projected_delta,
                delta_cap: self.config.delta_cap,
            });
        }

        // 4. Staleness of the pricing snapshot
        let age = now - proposal.computed_from_snapshot_at;
        if age > self.max_staleness {
            violations.push(Violation::StaleSnapshot {
                computed_at: proposal.computed_from_snapshot_at,
                age_secs: age.num_seconds(),
                max_secs: self.max_staleness.num_seconds(),
            });
        }

        // 5. Buying power, when the account reports it
        if self.config.enforce_buying_power {
            if let Some(available) = state.buying_power {
                if proposal.estimated_cost > available {
                    violations.push(Violation::InsufficientBuyingPower {
                        required: proposal.estimated_cost,
                        available,
                    });
                }
            }
        }

        RiskSummary::from_parts(violations, Self::warnings(proposal))
    }

    fn warnings(proposal: &TradeProposal) -> Vec<String> {
        let mut warnings = Vec::new();
        if proposal.estimated_cost > HIGH_COST_WARNING {
            warnings.push(format!(
                "High cost trade: ${}",
                proposal.estimated_cost.round_dp(2)
            ));
        }
        if proposal.legs.len() > 2 {
            warnings.push(format!(
                "Complex strategy with {} legs, check fills on every leg",
                proposal.legs.len()
            ));
        }
        warnings
    }

    pub fn utilization(&self, state: &AccountRiskState) -> RiskUtilization {
        let loss = (-state.daily_pnl()).max(Decimal::ZERO);
        RiskUtilization {
            loss_pct: percent_of(loss, self.config.max_daily_loss),
            delta_pct: percent_of(state.portfolio_delta.abs(), self.config.delta_cap),
        }
    }
}

fn percent_of(value: Decimal, limit: Decimal) -> Decimal {
    if limit.is_zero() {
        return Decimal::ZERO;
    }
    (value / limit * Decimal::ONE_HUNDRED).round_dp(2)
}
