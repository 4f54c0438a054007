//! Error taxonomy for previews, mints and confirms.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One violated risk rule.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    /// Kill switch engaged. Dominates every other violation.
    #[error("trading halted")]
    TradingHalted,

    /// Executing would take the day's P&L to or past the loss floor.
    #[error("daily loss cap: projected P&L {projected_pnl} breaches -{max_daily_loss}")]
    DailyLossCap {
        projected_pnl: Decimal,
        max_daily_loss: Decimal,
    },

    /// Resulting portfolio delta exceeds the cap in absolute value.
    #[error("portfolio delta cap: |{projected_delta}| exceeds {delta_cap}")]
    DeltaCap {
        projected_delta: Decimal,
        delta_cap: Decimal,
    },

    /// Proposal priced from data older than the staleness bound.
    #[error("stale snapshot: priced from data observed at {computed_at}, {age_secs}s old (max {max_secs}s)")]
    StaleSnapshot {
        computed_at: DateTime<Utc>,
        age_secs: i64,
        max_secs: i64,
    },

    /// Debit exceeds the buying power the account reports.
    #[error("insufficient buying power: need {required}, have {available}")]
    InsufficientBuyingPower {
        required: Decimal,
        available: Decimal,
    },

    /// Leg has no live quote any more (expired, evicted or stale).
    #[error("leg {symbol} unavailable")]
    LegUnavailable { symbol: String },
}

/// Errors from the intent gate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    /// Token unknown, or already in a terminal state.
    #[error("intent not found")]
    NotFound,

    /// Confirmation arrived after the token's deadline.
    #[error("intent expired")]
    Expired,

    /// One or more risk rules failed.
    #[error("risk rejected: {}", join_violations(.violations))]
    Rejected { violations: Vec<Violation> },

    /// The proposal already went through a confirmed token; build a new one.
    #[error("proposal {proposal_id} already confirmed")]
    AlreadyConfirmed { proposal_id: Uuid },

    /// Account state could not be read; the token is left untouched.
    #[error("account state unavailable: {0}")]
    Account(String),
}

impl GateError {
    /// True for rejections caused by risk rules.
    pub fn is_risk_violation(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// True when the kill switch caused the rejection.
    pub fn is_kill_switch(&self) -> bool {
        matches!(self, Self::Rejected { violations } if violations.first() == Some(&Violation::TradingHalted))
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Rejected { violations } => violations,
            _ => &[],
        }
    }
}

/// Why a strategy could not be built from the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Quotes exist but are too thin to price honestly.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// No contract close enough to what was asked for.
    #[error("no matching contract: {0}")]
    NoMatchingContract(String),

    /// No live data for the side of the chain the strategy needs.
    #[error("stale market: {0}")]
    StaleMarket(String),

    /// Parameters out of range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Account state needed for the risk preview could not be read.
    #[error("account state unavailable: {0}")]
    AccountUnavailable(String),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kill_switch_text_is_exact() {
        assert_eq!(Violation::TradingHalted.to_string(), "trading halted");
    }

    #[test]
    fn rejected_lists_every_violation() {
        let err = GateError::Rejected {
            violations: vec![
                Violation::TradingHalted,
                Violation::DeltaCap {
                    projected_delta: dec!(6.2),
                    delta_cap: dec!(5),
                },
            ],
        };
        assert!(err.is_risk_violation());
        assert!(err.is_kill_switch());
        assert_eq!(
            err.to_string(),
            "risk rejected: trading halted; portfolio delta cap: |6.2| exceeds 5"
        );
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn not_found_is_not_a_risk_violation() {
        assert!(!GateError::NotFound.is_risk_violation());
        assert!(!GateError::Expired.is_kill_switch());
        assert!(GateError::NotFound.violations().is_empty());
    }
}
