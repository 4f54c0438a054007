//! Preview → mint → confirm for 0DTE option trades.
//!
//! A caller asks the [`StrategyBuilder`] for a priced, risk-scored
//! [`TradeProposal`], mints a single-use token for it with the
//! [`IntentGate`], and later confirms the token. Confirmation re-prices the
//! legs from the live snapshot and re-runs every risk rule against fresh
//! account state before the proposal is released for execution.

pub mod account;
pub mod error;
pub mod execution;
pub mod gate;
pub mod risk;
pub mod service;
pub mod strategy;
pub mod types;

pub use account::PaperAccount;
pub use error::{BuildError, GateError, Violation};
pub use execution::{ExecutionReport, LegFill, OrderExecutor, PaperExecutor};
pub use gate::IntentGate;
pub use risk::{RiskEvaluator, RiskUtilization};
pub use service::{BackgroundTasks, RiskSnapshot, TradingCore};
pub use strategy::{price_legs, LegPricing, PricedLeg, StrategyBuilder};
pub use types::{
    IntentToken, Leg, ProfitCap, RiskSummary, Side, StraddleCandidate, StrategySpec, TokenState, TradeProposal,
};
