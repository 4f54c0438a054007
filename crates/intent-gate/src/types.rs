//! Types shared by the builder, the risk evaluator and the intent gate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use zdte_core::OptionRight;

use crate::error::Violation;

/// Order side for one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One buy/sell instruction within a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub symbol: String,
    pub side: Side,
    pub ratio_qty: u32,
}

impl Leg {
    pub fn buy(symbol: impl Into<String>, ratio_qty: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Buy,
            ratio_qty,
        }
    }

    pub fn sell(symbol: impl Into<String>, ratio_qty: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Sell,
            ratio_qty,
        }
    }

    /// Signed quantity (negative for sells).
    pub fn signed_qty(&self) -> Decimal {
        self.side.sign() * Decimal::from(self.ratio_qty)
    }
}

/// Upside of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "lowercase")]
pub enum ProfitCap {
    Bounded(Decimal),
    Unbounded,
}

impl std::fmt::Display for ProfitCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounded(amount) => write!(f, "${}", amount.round_dp(2)),
            Self::Unbounded => write!(f, "unlimited"),
        }
    }
}

/// Outcome of one risk evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub passed: bool,
    /// Every violated rule, kill switch first.
    pub violations: Vec<Violation>,
    /// Non-blocking notes for the operator.
    pub warnings: Vec<String>,
}

impl RiskSummary {
    pub fn from_parts(violations: Vec<Violation>, warnings: Vec<String>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
            warnings,
        }
    }

    /// Violation descriptions in report order.
    pub fn violation_messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// One priced strategy instance (the preview).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub proposal_id: Uuid,
    pub strategy_name: String,
    pub legs: Vec<Leg>,
    /// Net debit in dollars; credits are negative.
    pub estimated_cost: Decimal,
    pub max_loss: Decimal,
    pub max_profit: ProfitCap,
    /// Signed per-contract delta of the whole position.
    pub net_delta: Decimal,
    /// Oldest observation among the records used to price the legs.
    pub computed_from_snapshot_at: DateTime<Utc>,
    pub risk_summary: RiskSummary,
}

/// Token lifecycle. `Pending` is the only non-terminal state apart from
/// the momentary `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    Pending,
    Confirmed,
    Expired,
    Rejected,
    Consumed,
}

impl TokenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Rejected | Self::Consumed)
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
            Self::Consumed => "consumed",
        };
        f.write_str(s)
    }
}

/// Confirm/execute bridge owned by the intent gate.
#[derive(Debug, Clone, Serialize)]
pub struct IntentToken {
    pub token_id: String,
    pub proposal: TradeProposal,
    pub minted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: TokenState,
}

/// Strategy request understood by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Buy one call nearest the target delta.
    LongCall { target_delta: Decimal },
    /// Buy one put nearest the (negated) target delta.
    LongPut { target_delta: Decimal },
    /// Short call + short put near `short_delta`, wings `width` points out.
    IronCondor { short_delta: Decimal, width: Decimal },
    /// Far out-of-the-money option sized to the lotto risk budget.
    Lotto { right: OptionRight, target_delta: Decimal },
    /// Long call + long put at one strike; at-the-money when not given.
    Straddle { strike: Option<Decimal> },
}

impl StrategySpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LongCall { .. } => "long_call",
            Self::LongPut { .. } => "long_put",
            Self::IronCondor { .. } => "iron_condor",
            Self::Lotto { .. } => "lotto",
            Self::Straddle { .. } => "straddle",
        }
    }
}

/// Read-only straddle scan row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StraddleCandidate {
    pub strike: Decimal,
    pub call_symbol: String,
    pub put_symbol: String,
    /// Debit for one straddle, in dollars.
    pub cost: Decimal,
    pub lower_breakeven: Decimal,
    pub upper_breakeven: Decimal,
    /// Straddle premium as a percent of spot.
    pub implied_move_pct: Decimal,
    pub combined_volume: u64,
    pub average_iv: Decimal,
}
