//! End-to-end preview → mint → confirm flows against a simulated clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use zdte_core::{AppConfig, Clock, Greeks, InstrumentRecord, ManualClock, MarketFeed};
use zdte_gate::{
    GateError, OrderExecutor, PaperAccount, PaperExecutor, StrategySpec, TokenState, TradingCore, Violation,
};
use zdte_market::ReplayFeed;

// 10:00 New York
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 19, 14, 0, 0).unwrap()
}

fn quote(symbol: &str, delta: Decimal, bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> InstrumentRecord {
    InstrumentRecord::new(
        symbol,
        bid,
        ask,
        Greeks {
            delta,
            ..Greeks::default()
        },
        dec!(0.20),
        1_000,
        at,
    )
    .unwrap()
}

fn chain(at: DateTime<Utc>) -> Vec<InstrumentRecord> {
    vec![
        quote("SPY260619C00450000", dec!(0.50), dec!(2.00), dec!(2.10), at),
        quote("SPY260619C00455000", dec!(0.31), dec!(1.00), dec!(1.10), at),
        quote("SPY260619C00465000", dec!(0.06), dec!(0.10), dec!(0.12), at),
        quote("SPY260619P00450000", dec!(-0.50), dec!(2.00), dec!(2.10), at),
        quote("SPY260619P00445000", dec!(-0.29), dec!(0.90), dec!(1.00), at),
        quote("SPY260619P00435000", dec!(-0.12), dec!(0.30), dec!(0.34), at),
    ]
}

struct Fixture {
    clock: ManualClock,
    account: Arc<PaperAccount>,
    core: Arc<TradingCore>,
}

fn fixture() -> Fixture {
    let clock = ManualClock::new(t0());
    let config = AppConfig::default();
    let account = Arc::new(PaperAccount::new(config.paper.starting_buying_power));
    let core = TradingCore::new(config, Arc::new(clock.clone()), account.clone()).unwrap();
    core.cache().upsert_batch(chain(t0()));
    Fixture {
        clock,
        account,
        core: Arc::new(core),
    }
}

fn long_call() -> StrategySpec {
    StrategySpec::LongCall { target_delta: dec!(0.30) }
}

#[tokio::test]
async fn token_is_single_use() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    assert!(proposal.risk_summary.passed);

    let token_id = f.core.mint_intent(&proposal).await.unwrap();
    let confirmed = f.core.confirm_intent(&token_id).await.unwrap();
    assert_eq!(confirmed.proposal_id, proposal.proposal_id);

    assert_eq!(f.core.confirm_intent(&token_id).await, Err(GateError::NotFound));
    assert_eq!(f.core.confirm_intent(&token_id).await, Err(GateError::NotFound));
}

#[tokio::test]
async fn minting_one_proposal_twice_releases_it_once() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();

    let first = f.core.mint_intent(&proposal).await.unwrap();
    let second = f.core.mint_intent(&proposal).await.unwrap();

    let outcomes = [
        f.core.confirm_intent(&first).await,
        f.core.confirm_intent(&second).await,
    ];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(outcomes[0], Err(GateError::NotFound));

    let err = f.core.mint_intent(&proposal).await.unwrap_err();
    assert_eq!(
        err,
        GateError::AlreadyConfirmed {
            proposal_id: proposal.proposal_id
        }
    );
}

#[tokio::test]
async fn confirm_after_timeout_is_expired() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    // keep quotes fresh so only the token deadline matters
    f.clock.advance(Duration::seconds(31));
    f.core.cache().upsert_batch(chain(f.clock.now()));

    assert_eq!(f.core.confirm_intent(&token_id).await, Err(GateError::Expired));
    let token = f.core.inspect_intent(&token_id).unwrap();
    assert_eq!(token.state, TokenState::Expired);
    assert_eq!(f.core.confirm_intent(&token_id).await, Err(GateError::NotFound));
}

#[tokio::test]
async fn adverse_pnl_between_mint_and_confirm_is_caught() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    // -420 - 105 <= -500
    f.account.set_daily_pnl(dec!(-300), dec!(-120));

    let err = f.core.confirm_intent(&token_id).await.unwrap_err();
    assert!(err.is_risk_violation());
    assert!(matches!(err.violations()[0], Violation::DailyLossCap { .. }));
    assert_eq!(f.core.inspect_intent(&token_id).unwrap().state, TokenState::Rejected);
}

#[tokio::test]
async fn confirm_reprices_from_fresh_quotes() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    // Down 350: the minted $105 debit still fits under the floor, the
    // rallied $200 debit does not.
    f.account.set_daily_pnl(dec!(-350), dec!(0));
    f.clock.advance(Duration::seconds(5));
    f.core.cache().upsert(quote(
        "SPY260619C00455000",
        dec!(0.45),
        dec!(1.90),
        dec!(2.10),
        f.clock.now(),
    ));

    let err = f.core.confirm_intent(&token_id).await.unwrap_err();
    assert!(matches!(err.violations(), [Violation::DailyLossCap { .. }]));
}

#[tokio::test]
async fn kill_switch_is_observed_on_next_confirm() {
    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    f.core.kill_switch(true).await.unwrap();
    f.account.set_portfolio_delta(dec!(10));

    let err = f.core.confirm_intent(&token_id).await.unwrap_err();
    assert!(err.is_kill_switch());
    assert_eq!(err.violations()[0].to_string(), "trading halted");
    assert_eq!(err.violations().len(), 2);

    f.core.kill_switch(false).await.unwrap();
    f.account.set_portfolio_delta(dec!(0));
    let fresh = f.core.build_strategy(&long_call()).await.unwrap();
    assert!(f.core.mint_intent(&fresh).await.is_ok());
}

#[tokio::test]
async fn session_close_kills_pending_intents() {
    let f = fixture();
    // 16:14:50 New York
    let late = Utc.with_ymd_and_hms(2026, 6, 19, 20, 14, 50).unwrap();
    f.clock.set(late);
    f.core.cache().upsert_batch(chain(late));

    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    f.clock.advance(Duration::seconds(15));
    let err = f.core.confirm_intent(&token_id).await.unwrap_err();
    assert!(err.violations().contains(&Violation::LegUnavailable {
        symbol: "SPY260619C00455000".to_string()
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_have_exactly_one_winner() {
    const RACERS: usize = 32;

    let f = fixture();
    let proposal = f.core.build_strategy(&long_call()).await.unwrap();
    let token_id = f.core.mint_intent(&proposal).await.unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let core = Arc::clone(&f.core);
            let barrier = Arc::clone(&barrier);
            let token_id = token_id.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                core.confirm_intent(&token_id).await
            })
        })
        .collect();

    let mut wins = 0;
    let mut not_found = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(p) => {
                assert_eq!(p.proposal_id, proposal.proposal_id);
                wins += 1;
            }
            Err(GateError::NotFound) => not_found += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(not_found, RACERS - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirms_on_different_tokens_all_succeed() {
    let f = fixture();
    let mut tokens = Vec::new();
    for _ in 0..8 {
        let proposal = f.core.build_strategy(&long_call()).await.unwrap();
        tokens.push(f.core.mint_intent(&proposal).await.unwrap());
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token_id| {
            let core = Arc::clone(&f.core);
            tokio::spawn(async move { core.confirm_intent(&token_id).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn paper_session_round_trip() {
    let f = fixture();
    let tasks = f.core.spawn_background(
        ReplayFeed::new(chain(t0() - Duration::seconds(30))).restamped_to(Arc::new(f.clock.clone())),
    );

    let proposal = f
        .core
        .build_strategy(&StrategySpec::IronCondor {
            short_delta: dec!(0.30),
            width: dec!(10),
        })
        .await
        .unwrap();
    assert_eq!(proposal.estimated_cost, dec!(-157));

    let token_id = f.core.mint_intent(&proposal).await.unwrap();
    let approved = f.core.confirm_intent(&token_id).await.unwrap();

    let executor = PaperExecutor::new(Arc::clone(f.core.cache()), dec!(0.65), dec!(100));
    let report = executor.execute(&approved).await.unwrap();
    f.account.record_execution(&report);

    let snapshot = f.core.risk_snapshot().await.unwrap();
    assert_eq!(snapshot.account.buying_power, Some(dec!(25000) + dec!(157) - dec!(2.60)));
    assert_eq!(snapshot.live_intents, 0);

    let stats = tasks.shutdown().await.unwrap();
    assert!(stats.stored <= 6);
}

#[tokio::test]
async fn replay_feed_is_a_market_feed() {
    let mut feed = ReplayFeed::new(chain(t0()));
    let mut seen = 0;
    while let Some(record) = feed.next_update().await.unwrap() {
        assert!(record.bid <= record.ask);
        seen += 1;
    }
    assert_eq!(seen, 6);
}
