//! Strategy builder: turns a strategy request into a priced, risk-annotated
//! proposal using only what the snapshot cache holds right now.
//!
//! Pricing convention: every leg is priced at mid, signed +1 for buys and -1
//! for sells, scaled by ratio and contract multiplier. A credit strategy
//! therefore has a negative `estimated_cost`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};
use uuid::Uuid;

use zdte_core::{AccountRiskState, InstrumentRecord, OptionRight, StrategyConfig};
use zdte_market::{ContractSpec, SnapshotCache};

use crate::error::BuildError;
use crate::risk::RiskEvaluator;
use crate::types::{Leg, ProfitCap, RiskSummary, StraddleCandidate, StrategySpec, TradeProposal};

const AT_THE_MONEY_DELTA: Decimal = dec!(0.50);

/// A leg together with the record it was priced from.
#[derive(Debug, Clone)]
pub struct PricedLeg {
    pub leg: Leg,
    pub record: Arc<InstrumentRecord>,
}

impl PricedLeg {
    pub fn new(leg: Leg, record: Arc<InstrumentRecord>) -> Self {
        Self { leg, record }
    }
}

/// Aggregate price and exposure of a set of legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegPricing {
    pub estimated_cost: Decimal,
    pub net_delta: Decimal,
    /// Oldest observation among the legs.
    pub snapshot_at: DateTime<Utc>,
}

/// Prices `legs` at mid. `None` for an empty slice.
pub fn price_legs(legs: &[PricedLeg], multiplier: Decimal) -> Option<LegPricing> {
    let snapshot_at = legs.iter().map(|l| l.record.observed_at).min()?;
    let (estimated_cost, net_delta) = legs.iter().fold((Decimal::ZERO, Decimal::ZERO), |(cost, delta), l| {
        let qty = l.leg.signed_qty();
        (
            cost + l.record.mid() * qty * multiplier,
            delta + l.record.delta() * qty,
        )
    });
    Some(LegPricing {
        estimated_cost,
        net_delta,
        snapshot_at,
    })
}

#[derive(Debug, Clone)]
pub struct StrategyBuilder {
    cache: Arc<SnapshotCache>,
    evaluator: RiskEvaluator,
    config: StrategyConfig,
}

impl StrategyBuilder {
    pub fn new(cache: Arc<SnapshotCache>, evaluator: RiskEvaluator, config: StrategyConfig) -> Self {
        Self {
            cache,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Builds the preview for `spec`, risk-scored against `state`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when the request is out of range or the
    /// current snapshot cannot satisfy it.
    pub fn build(&self, spec: &StrategySpec, state: &AccountRiskState) -> Result<TradeProposal, BuildError> {
        validate_request(spec)?;
        let mult = self.config.contract_multiplier;

        let (legs, pricing, max_loss, max_profit) = match spec {
            StrategySpec::LongCall { target_delta } => {
                let (_, call) = self.select_by_delta(OptionRight::Call, *target_delta)?;
                let legs = vec![PricedLeg::new(Leg::buy(&call.symbol, 1), call)];
                let pricing = self.price(&legs)?;
                (legs, pricing, pricing.estimated_cost, ProfitCap::Unbounded)
            }
            StrategySpec::LongPut { target_delta } => {
                let (contract, put) = self.select_by_delta(OptionRight::Put, *target_delta)?;
                let legs = vec![PricedLeg::new(Leg::buy(&put.symbol, 1), put)];
                let pricing = self.price(&legs)?;
                let cost = pricing.estimated_cost;
                let ceiling = (contract.strike * mult - cost).max(Decimal::ZERO);
                (legs, pricing, cost, ProfitCap::Bounded(ceiling))
            }
            StrategySpec::IronCondor { short_delta, width } => {
                let (call_spec, short_call) = self.select_by_delta(OptionRight::Call, *short_delta)?;
                let (put_spec, short_put) = self.select_by_delta(OptionRight::Put, *short_delta)?;
                let long_call = self.wing(&call_spec, call_spec.strike + *width)?;
                let long_put = self.wing(&put_spec, put_spec.strike - *width)?;

                let legs = vec![
                    PricedLeg::new(Leg::sell(&short_call.symbol, 1), short_call),
                    PricedLeg::new(Leg::buy(&long_call.symbol, 1), long_call),
                    PricedLeg::new(Leg::sell(&short_put.symbol, 1), short_put),
                    PricedLeg::new(Leg::buy(&long_put.symbol, 1), long_put),
                ];
                let pricing = self.price(&legs)?;
                let credit = -pricing.estimated_cost;
                if credit <= Decimal::ZERO {
                    return Err(BuildError::InsufficientLiquidity(format!(
                        "condor collects no credit ({credit})"
                    )));
                }
                let max_loss = *width * mult - credit;
                (legs, pricing, max_loss, ProfitCap::Bounded(credit))
            }
            StrategySpec::Lotto { right, target_delta } => {
                let (contract, record) = self.select_by_delta(*right, *target_delta)?;
                let unit_cost = record.mid() * mult;
                let qty = (self.config.lotto_risk_budget / unit_cost)
                    .floor()
                    .to_u32()
                    .unwrap_or(1)
                    .max(1);
                let legs = vec![PricedLeg::new(Leg::buy(&record.symbol, qty), record)];
                let pricing = self.price(&legs)?;
                let cost = pricing.estimated_cost;
                let max_profit = match right {
                    OptionRight::Call => ProfitCap::Unbounded,
                    OptionRight::Put => ProfitCap::Bounded(
                        (contract.strike * mult * Decimal::from(qty) - cost).max(Decimal::ZERO),
                    ),
                };
                (legs, pricing, cost, max_profit)
            }
            StrategySpec::Straddle { strike } => {
                let (call_spec, call) = match strike {
                    Some(k) => self.call_at_strike(*k)?,
                    None => self.at_the_money_call()?,
                };
                let put_spec = ContractSpec {
                    right: OptionRight::Put,
                    ..call_spec.clone()
                };
                let put = self.wing(&put_spec, call_spec.strike)?;
                let legs = vec![
                    PricedLeg::new(Leg::buy(&call.symbol, 1), call),
                    PricedLeg::new(Leg::buy(&put.symbol, 1), put),
                ];
                let pricing = self.price(&legs)?;
                (legs, pricing, pricing.estimated_cost, ProfitCap::Unbounded)
            }
        };

        Ok(self.finish(spec.name(), &legs, pricing, max_loss, max_profit, state))
    }

    /// Ranks same-strike call/put pairs for a straddle, smallest implied
    /// move first. Spot is taken as the strike of the call nearest 0.50 delta.
    pub fn scan_straddles(&self, max_iv: Decimal, min_volume: u64) -> Vec<StraddleCandidate> {
        let mult = self.config.contract_multiplier;
        let Some(spot) = self
            .cache
            .nearest_by_delta(AT_THE_MONEY_DELTA, OptionRight::Call, self.cache.max_staleness())
            .and_then(|atm| self.cache.contract_spec(&atm.symbol))
            .map(|atm| atm.strike)
            .filter(|strike| *strike > Decimal::ZERO)
        else {
            debug!("Straddle scan skipped, no at-the-money call");
            return Vec::new();
        };
        let mut candidates: Vec<StraddleCandidate> = self
            .cache
            .live_with_specs(Some(OptionRight::Call))
            .into_iter()
            .filter_map(|(spec, call)| {
                let put_spec = ContractSpec {
                    right: OptionRight::Put,
                    ..spec.clone()
                };
                let put = self.cache.find_by_strike(&put_spec, spec.strike)?;
                if call.implied_volatility > max_iv || put.implied_volatility > max_iv {
                    return None;
                }
                if call.volume < min_volume || put.volume < min_volume {
                    return None;
                }
                let premium = call.mid() + put.mid();
                Some(StraddleCandidate {
                    strike: spec.strike,
                    call_symbol: call.symbol.clone(),
                    put_symbol: put.symbol.clone(),
                    cost: premium * mult,
                    lower_breakeven: spec.strike - premium,
                    upper_breakeven: spec.strike + premium,
                    implied_move_pct: premium / spot * Decimal::ONE_HUNDRED,
                    combined_volume: call.volume + put.volume,
                    average_iv: (call.implied_volatility + put.implied_volatility) / Decimal::TWO,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.implied_move_pct
                .cmp(&b.implied_move_pct)
                .then_with(|| b.combined_volume.cmp(&a.combined_volume))
                .then_with(|| a.strike.cmp(&b.strike))
        });
        debug!(count = candidates.len(), %spot, %max_iv, min_volume, "Straddle scan complete");
        candidates
    }

    fn finish(
        &self,
        name: &str,
        legs: &[PricedLeg],
        pricing: LegPricing,
        max_loss: Decimal,
        max_profit: ProfitCap,
        state: &AccountRiskState,
    ) -> TradeProposal {
        let now = self.cache.now();
        let mut proposal = TradeProposal {
            proposal_id: Uuid::new_v4(),
            strategy_name: name.to_string(),
            legs: legs.iter().map(|l| l.leg.clone()).collect(),
            estimated_cost: pricing.estimated_cost,
            max_loss,
            max_profit,
            net_delta: pricing.net_delta,
            computed_from_snapshot_at: pricing.snapshot_at,
            risk_summary: RiskSummary::from_parts(Vec::new(), Vec::new()),
        };

        let mut summary = self.evaluator.evaluate(&proposal, state, now);
        if let Some(warning) = self.same_day_warning(legs, now) {
            summary.warnings.push(warning);
        }
        proposal.risk_summary = summary;

        info!(
            proposal_id = %proposal.proposal_id,
            strategy = name,
            legs = proposal.legs.len(),
            cost = %proposal.estimated_cost,
            net_delta = %proposal.net_delta,
            passed = proposal.risk_summary.passed,
            "Built strategy preview"
        );
        proposal
    }

    fn same_day_warning(&self, legs: &[PricedLeg], now: DateTime<Utc>) -> Option<String> {
        let calendar = self.cache.calendar();
        let today = calendar.exchange_date(now);
        legs.iter()
            .filter_map(|l| self.cache.contract_spec(&l.record.symbol))
            .any(|spec| spec.expiry == today)
            .then(|| {
                format!(
                    "0DTE: expires today, quotes cut off at {} {}",
                    calendar.close_time().format("%H:%M"),
                    calendar.timezone()
                )
            })
    }

    fn price(&self, legs: &[PricedLeg]) -> Result<LegPricing, BuildError> {
        price_legs(legs, self.config.contract_multiplier)
            .ok_or_else(|| BuildError::InvalidRequest("strategy has no legs".to_string()))
    }

    fn select_by_delta(
        &self,
        right: OptionRight,
        target: Decimal,
    ) -> Result<(ContractSpec, Arc<InstrumentRecord>), BuildError> {
        let signed = match right {
            OptionRight::Call => target,
            OptionRight::Put => -target,
        };
        let record = self
            .cache
            .nearest_by_delta(signed, right, self.cache.max_staleness())
            .ok_or_else(|| BuildError::StaleMarket(format!("no live {} quotes", right_name(right))))?;

        let distance = (record.delta() - signed).abs();
        if distance > self.config.delta_tolerance {
            return Err(BuildError::NoMatchingContract(format!(
                "nearest {} delta {} is {} away from {}",
                right_name(right),
                record.delta(),
                distance,
                signed
            )));
        }

        let spec = self
            .cache
            .contract_spec(&record.symbol)
            .ok_or_else(|| BuildError::NoMatchingContract(format!("cannot decode {}", record.symbol)))?;
        self.check_liquidity(&record)?;
        Ok((spec, record))
    }

    fn wing(&self, like: &ContractSpec, strike: Decimal) -> Result<Arc<InstrumentRecord>, BuildError> {
        let record = self.cache.find_by_strike(like, strike).ok_or_else(|| {
            BuildError::NoMatchingContract(format!(
                "no live {} {} at strike {}",
                like.underlying,
                right_name(like.right),
                strike.normalize()
            ))
        })?;
        self.check_liquidity(&record)?;
        Ok(record)
    }

    fn call_at_strike(&self, strike: Decimal) -> Result<(ContractSpec, Arc<InstrumentRecord>), BuildError> {
        if self.cache.live_count(OptionRight::Call) == 0 {
            return Err(BuildError::StaleMarket("no live call quotes".to_string()));
        }
        let (spec, record) = self
            .cache
            .by_strike_range(strike, strike, OptionRight::Call)
            .into_iter()
            .max_by(|(_, a), (_, b)| a.volume.cmp(&b.volume).then_with(|| b.symbol.cmp(&a.symbol)))
            .ok_or_else(|| BuildError::NoMatchingContract(format!("no live call at strike {}", strike.normalize())))?;
        self.check_liquidity(&record)?;
        Ok((spec, record))
    }

    fn at_the_money_call(&self) -> Result<(ContractSpec, Arc<InstrumentRecord>), BuildError> {
        let record = self
            .cache
            .nearest_by_delta(AT_THE_MONEY_DELTA, OptionRight::Call, self.cache.max_staleness())
            .ok_or_else(|| BuildError::StaleMarket("no live call quotes".to_string()))?;
        let spec = self
            .cache
            .contract_spec(&record.symbol)
            .ok_or_else(|| BuildError::NoMatchingContract(format!("cannot decode {}", record.symbol)))?;
        self.check_liquidity(&record)?;
        Ok((spec, record))
    }

    fn check_liquidity(&self, record: &InstrumentRecord) -> Result<(), BuildError> {
        if record.bid <= Decimal::ZERO || record.ask <= Decimal::ZERO {
            return Err(BuildError::InsufficientLiquidity(format!(
                "{} has no two-sided market ({} x {})",
                record.symbol, record.bid, record.ask
            )));
        }
        let spread_pct = record.spread() / record.mid() * Decimal::ONE_HUNDRED;
        if spread_pct > self.config.max_spread_pct {
            return Err(BuildError::InsufficientLiquidity(format!(
                "{} spread is {}% of mid",
                record.symbol,
                spread_pct.round_dp(1)
            )));
        }
        if record.volume < self.config.min_volume {
            return Err(BuildError::InsufficientLiquidity(format!(
                "{} volume {} below minimum {}",
                record.symbol, record.volume, self.config.min_volume
            )));
        }
        Ok(())
    }
}

fn validate_request(spec: &StrategySpec) -> Result<(), BuildError> {
    let check_delta = |delta: Decimal| {
        if delta <= Decimal::ZERO || delta >= Decimal::ONE {
            return Err(BuildError::InvalidRequest(format!(
                "target delta {delta} must be strictly between 0 and 1"
            )));
        }
        Ok(())
    };

    match spec {
        StrategySpec::LongCall { target_delta }
        | StrategySpec::LongPut { target_delta }
        | StrategySpec::Lotto { target_delta, .. } => check_delta(*target_delta),
        StrategySpec::IronCondor { short_delta, width } => {
            check_delta(*short_delta)?;
            if *width <= Decimal::ZERO {
                return Err(BuildError::InvalidRequest(format!("wing width {width} must be positive")));
            }
            Ok(())
        }
        StrategySpec::Straddle { strike: Some(k) } if *k <= Decimal::ZERO => Err(
            BuildError::InvalidRequest(format!("strike {k} must be positive")),
        ),
        StrategySpec::Straddle { .. } => Ok(()),
    }
}

fn right_name(right: OptionRight) -> &'static str {
    match right {
        OptionRight::Call => "call",
        OptionRight::Put => "put",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};
    use chrono_tz::America::New_York;
    use zdte_core::{Clock, Greeks, ManualClock, RiskConfig};
    use zdte_market::{OccConvention, SessionCalendar};

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 19, 14, 0, 0).unwrap()
    }

    // (symbol, delta, bid, ask, iv, volume)
    const CHAIN: &[(&str, Decimal, Decimal, Decimal, Decimal, u64)] = &[
        ("SPY260619C00440000", dec!(0.80), dec!(9.90), dec!(10.10), dec!(0.18), 300),
        ("SPY260619C00445000", dec!(0.65), dec!(6.00), dec!(6.20), dec!(0.18), 500),
        ("SPY260619C00450000", dec!(0.50), dec!(2.00), dec!(2.10), dec!(0.19), 2000),
        ("SPY260619C00455000", dec!(0.31), dec!(1.00), dec!(1.10), dec!(0.20), 1500),
        ("SPY260619C00460000", dec!(0.15), dec!(0.40), dec!(0.45), dec!(0.22), 800),
        ("SPY260619C00465000", dec!(0.06), dec!(0.10), dec!(0.12), dec!(0.26), 600),
        ("SPY260619C00470000", dec!(0.02), dec!(0.02), dec!(0.04), dec!(0.30), 50),
        ("SPY260619P00430000", dec!(-0.05), dec!(0.08), dec!(0.10), dec!(0.30), 400),
        ("SPY260619P00435000", dec!(-0.12), dec!(0.30), dec!(0.34), dec!(0.26), 700),
        ("SPY260619P00440000", dec!(-0.20), dec!(0.55), dec!(0.60), dec!(0.23), 900),
        ("SPY260619P00445000", dec!(-0.29), dec!(0.90), dec!(1.00), dec!(0.21), 1200),
        ("SPY260619P00450000", dec!(-0.50), dec!(2.00), dec!(2.10), dec!(0.19), 1800),
        ("SPY260619P00455000", dec!(-0.69), dec!(4.10), dec!(4.30), dec!(0.19), 200),
        ("SPY260619P00460000", dec!(-0.85), dec!(7.90), dec!(8.10), dec!(0.20), 50),
    ];

    pub(crate) fn chain(at: DateTime<Utc>) -> Vec<InstrumentRecord> {
        CHAIN
            .iter()
            .map(|(symbol, delta, bid, ask, iv, volume)| {
                InstrumentRecord::new(
                    *symbol,
                    *bid,
                    *ask,
                    Greeks {
                        delta: *delta,
                        ..Greeks::default()
                    },
                    *iv,
                    *volume,
                    at,
                )
                .unwrap()
            })
            .collect()
    }

    pub(crate) fn loaded_cache(clock: &ManualClock) -> Arc<SnapshotCache> {
        let cache = Arc::new(SnapshotCache::with_parts(
            SessionCalendar::new(New_York, NaiveTime::from_hms_opt(16, 15, 0).unwrap()),
            Duration::seconds(60),
            Arc::new(clock.clone()),
            Arc::new(OccConvention),
        ));
        cache.upsert_batch(chain(clock.now()));
        cache
    }

    fn builder(cache: Arc<SnapshotCache>) -> StrategyBuilder {
        StrategyBuilder::new(
            cache,
            RiskEvaluator::new(RiskConfig::default(), Duration::seconds(60)),
            StrategyConfig::default(),
        )
    }

    fn setup() -> (StrategyBuilder, ManualClock) {
        let clock = ManualClock::new(t0());
        (builder(loaded_cache(&clock)), clock)
    }

    fn state() -> AccountRiskState {
        AccountRiskState::default()
    }

    #[test]
    fn long_call_at_thirty_delta() {
        let (builder, _) = setup();
        let p = builder
            .build(&StrategySpec::LongCall { target_delta: dec!(0.30) }, &state())
            .unwrap();
        assert_eq!(p.strategy_name, "long_call");
        assert_eq!(p.legs, vec![Leg::buy("SPY260619C00455000", 1)]);
        assert_eq!(p.estimated_cost, dec!(105));
        assert_eq!(p.max_loss, dec!(105));
        assert_eq!(p.max_profit, ProfitCap::Unbounded);
        assert_eq!(p.net_delta, dec!(0.31));
        assert_eq!(p.computed_from_snapshot_at, t0());
        assert!(p.risk_summary.passed);
        assert!(p.risk_summary.warnings.iter().any(|w| w.starts_with("0DTE")));
    }

    #[test]
    fn long_put_matches_negative_delta() {
        let (builder, _) = setup();
        let p = builder
            .build(&StrategySpec::LongPut { target_delta: dec!(0.30) }, &state())
            .unwrap();
        assert_eq!(p.legs, vec![Leg::buy("SPY260619P00445000", 1)]);
        assert_eq!(p.estimated_cost, dec!(95));
        assert_eq!(p.max_profit, ProfitCap::Bounded(dec!(44405)));
        assert_eq!(p.net_delta, dec!(-0.29));
    }

    #[test]
    fn iron_condor_collects_credit() {
        let (builder, _) = setup();
        let p = builder
            .build(
                &StrategySpec::IronCondor {
                    short_delta: dec!(0.30),
                    width: dec!(10),
                },
                &state(),
            )
            .unwrap();
        assert_eq!(
            p.legs,
            vec![
                Leg::sell("SPY260619C00455000", 1),
                Leg::buy("SPY260619C00465000", 1),
                Leg::sell("SPY260619P00445000", 1),
                Leg::buy("SPY260619P00435000", 1),
            ]
        );
        assert_eq!(p.estimated_cost, dec!(-157));
        assert_eq!(p.max_profit, ProfitCap::Bounded(dec!(157)));
        assert_eq!(p.max_loss, dec!(843));
        assert_eq!(p.net_delta, dec!(-0.08));
        assert!(p.risk_summary.passed);
        assert!(p.risk_summary.warnings.iter().any(|w| w.contains("4 legs")));
    }

    #[test]
    fn condor_without_wings_is_unmatched() {
        let (builder, _) = setup();
        let err = builder
            .build(
                &StrategySpec::IronCondor {
                    short_delta: dec!(0.30),
                    width: dec!(50),
                },
                &state(),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::NoMatchingContract(_)));
    }

    #[test]
    fn lotto_sizes_to_risk_budget() {
        let (builder, _) = setup();
        let p = builder
            .build(
                &StrategySpec::Lotto {
                    right: OptionRight::Call,
                    target_delta: dec!(0.05),
                },
                &state(),
            )
            .unwrap();
        // 0.11 mid -> $11 per contract -> 9 contracts on a $100 budget
        assert_eq!(p.legs, vec![Leg::buy("SPY260619C00465000", 9)]);
        assert_eq!(p.estimated_cost, dec!(99));
        assert_eq!(p.net_delta, dec!(0.54));
    }

    #[test]
    fn wide_spread_is_illiquid() {
        let (builder, _) = setup();
        let err = builder
            .build(
                &StrategySpec::Lotto {
                    right: OptionRight::Call,
                    target_delta: dec!(0.02),
                },
                &state(),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::InsufficientLiquidity(_)));
    }

    #[test]
    fn straddle_defaults_to_at_the_money() {
        let (builder, _) = setup();
        let p = builder.build(&StrategySpec::Straddle { strike: None }, &state()).unwrap();
        assert_eq!(
            p.legs,
            vec![
                Leg::buy("SPY260619C00450000", 1),
                Leg::buy("SPY260619P00450000", 1)
            ]
        );
        assert_eq!(p.estimated_cost, dec!(410));
        assert_eq!(p.net_delta, dec!(0));

        let p = builder
            .build(&StrategySpec::Straddle { strike: Some(dec!(445)) }, &state())
            .unwrap();
        assert_eq!(p.legs[0].symbol, "SPY260619C00445000");
        assert_eq!(p.legs[1].symbol, "SPY260619P00445000");
    }

    #[test]
    fn delta_outside_tolerance_is_unmatched() {
        let (builder, _) = setup();
        let err = builder
            .build(&StrategySpec::LongCall { target_delta: dec!(0.40) }, &state())
            .unwrap_err();
        assert!(matches!(err, BuildError::NoMatchingContract(_)));
    }

    #[test]
    fn stale_chain_is_reported() {
        let (builder, clock) = setup();
        clock.advance(Duration::seconds(61));
        let err = builder
            .build(&StrategySpec::LongCall { target_delta: dec!(0.30) }, &state())
            .unwrap_err();
        assert!(matches!(err, BuildError::StaleMarket(_)));
    }

    #[test]
    fn out_of_range_requests_are_invalid() {
        let (builder, _) = setup();
        for spec in [
            StrategySpec::LongCall { target_delta: dec!(1.2) },
            StrategySpec::LongPut { target_delta: dec!(0) },
            StrategySpec::IronCondor {
                short_delta: dec!(0.3),
                width: dec!(-5),
            },
            StrategySpec::Straddle { strike: Some(dec!(0)) },
        ] {
            assert!(matches!(
                builder.build(&spec, &state()),
                Err(BuildError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn preview_carries_failed_risk_summary() {
        let (builder, _) = setup();
        let halted = AccountRiskState {
            kill_switch_engaged: true,
            ..AccountRiskState::default()
        };
        let p = builder
            .build(&StrategySpec::LongCall { target_delta: dec!(0.30) }, &halted)
            .unwrap();
        assert!(!p.risk_summary.passed);
        assert_eq!(p.risk_summary.violation_messages(), vec!["trading halted".to_string()]);
    }

    #[test]
    fn straddle_scan_ranks_by_implied_move() {
        let (builder, _) = setup();
        let rows = builder.scan_straddles(dec!(0.25), 100);
        let strikes: Vec<_> = rows.iter().map(|r| r.strike).collect();
        // premiums 4.10, 5.25, 7.05, 10.575 against a 450 spot
        assert_eq!(strikes, vec![dec!(450), dec!(455), dec!(445), dec!(440)]);

        let top = &rows[0];
        assert_eq!(top.cost, dec!(410));
        assert_eq!(top.lower_breakeven, dec!(445.90));
        assert_eq!(top.upper_breakeven, dec!(454.10));
        assert_eq!(top.implied_move_pct.round_dp(2), dec!(0.91));
        assert_eq!(top.combined_volume, 3800);
        assert_eq!(rows[3].implied_move_pct.round_dp(2), dec!(2.35));
    }

    #[test]
    fn straddle_scan_is_empty_without_live_calls() {
        let clock = ManualClock::new(t0());
        let cache = loaded_cache(&clock);
        clock.advance(Duration::seconds(61));
        assert!(builder(cache).scan_straddles(dec!(1), 0).is_empty());
    }

    #[test]
    fn price_legs_signs_by_side() {
        let records = chain(t0());
        let legs = vec![
            PricedLeg::new(Leg::sell(&records[3].symbol, 2), Arc::new(records[3].clone())),
            PricedLeg::new(
                Leg::buy(&records[4].symbol, 1),
                Arc::new(records[4].restamped(t0() - Duration::seconds(5))),
            ),
        ];
        let pricing = price_legs(&legs, dec!(100)).unwrap();
        // -2 * 1.05 * 100 + 0.425 * 100
        assert_eq!(pricing.estimated_cost, dec!(-167.5));
        assert_eq!(pricing.net_delta, dec!(-0.47));
        assert_eq!(pricing.snapshot_at, t0() - Duration::seconds(5));
        assert!(price_legs(&[], dec!(100)).is_none());
    }
}
