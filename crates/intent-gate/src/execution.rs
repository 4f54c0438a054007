//! Order execution seam and the paper executor.
//!
//! The core stops at handing back a validated proposal; whoever holds it
//! calls an [`OrderExecutor`]. The paper executor simulates fills at the
//! current cached mid.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use zdte_core::Clock;
use zdte_market::SnapshotCache;

use crate::types::{Side, TradeProposal};

/// Simulated or broker-reported fill for one leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegFill {
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub order_id: String,
    pub fills: Vec<LegFill>,
    /// Premium paid in dollars; negative when the order collected a credit.
    pub net_premium: Decimal,
    pub commission: Decimal,
    pub net_delta: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Places the legs of a confirmed proposal.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&self, proposal: &TradeProposal) -> Result<ExecutionReport>;
}

#[derive(Debug, Clone)]
pub struct PaperExecutor {
    cache: Arc<SnapshotCache>,
    clock: Arc<dyn Clock>,
    commission_per_contract: Decimal,
    multiplier: Decimal,
}

impl PaperExecutor {
    pub fn new(cache: Arc<SnapshotCache>, commission_per_contract: Decimal, multiplier: Decimal) -> Self {
        let clock = Arc::clone(cache.clock());
        Self {
            cache,
            clock,
            commission_per_contract,
            multiplier,
        }
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn execute(&self, proposal: &TradeProposal) -> Result<ExecutionReport> {
        let mut fills = Vec::with_capacity(proposal.legs.len());
        let mut net_premium = Decimal::ZERO;
        let mut net_delta = Decimal::ZERO;
        let mut contracts = 0u32;

        for leg in &proposal.legs {
            let record = self
                .cache
                .get(&leg.symbol)
                .ok_or_else(|| anyhow!("no live quote to fill {}", leg.symbol))?;
            let price = record.mid();
            net_premium += price * leg.signed_qty() * self.multiplier;
            net_delta += record.delta() * leg.signed_qty();
            contracts += leg.ratio_qty;
            fills.push(LegFill {
                symbol: leg.symbol.clone(),
                side: leg.side,
                quantity: leg.ratio_qty,
                price,
            });
        }

        let executed_at = self.clock.now();
        let report = ExecutionReport {
            order_id: format!("PAPER-{}", executed_at.timestamp_millis()),
            fills,
            net_premium,
            commission: self.commission_per_contract * Decimal::from(contracts),
            net_delta,
            executed_at,
        };

        info!(
            order_id = %report.order_id,
            proposal_id = %proposal.proposal_id,
            legs = report.fills.len(),
            premium = %report.net_premium,
            commission = %report.commission,
            "Paper fill simulated"
        );
        Ok(report)
    }
}
