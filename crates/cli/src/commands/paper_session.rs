//! `zdte paper` / `zdte scan`: drive the trading core from a recorded chain.
//!
//! The chain file holds one JSON instrument record per line. Records are
//! restamped to the wall clock as they are replayed, so a chain recorded on
//! any day behaves like a live snapshot taken just now.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use zdte_core::config_loader::DEFAULT_CONFIG_PATH;
use zdte_core::{Clock, ConfigLoader, OptionRight, SystemClock};
use zdte_gate::{
    BackgroundTasks, ExecutionReport, OrderExecutor, PaperAccount, PaperExecutor, StrategySpec, TradeProposal, TradingCore,
};
use zdte_market::ReplayFeed;

const REPLAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyKind {
    LongCall,
    LongPut,
    IronCondor,
    Lotto,
    Straddle,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RightArg {
    Call,
    Put,
}

impl From<RightArg> for OptionRight {
    fn from(right: RightArg) -> Self {
        match right {
            RightArg::Call => OptionRight::Call,
            RightArg::Put => OptionRight::Put,
        }
    }
}

/// Arguments for a paper preview/confirm session.
#[derive(Args, Debug)]
pub struct PaperSessionArgs {
    /// JSON-lines chain file
    #[arg(long)]
    pub chain: PathBuf,

    /// Strategy to preview
    #[arg(long, value_enum)]
    pub strategy: StrategyKind,

    /// Target delta (defaults: 0.30, lotto 0.05)
    #[arg(long)]
    pub delta: Option<Decimal>,

    /// Iron condor wing width in strike points
    #[arg(long, default_value = "10")]
    pub width: Decimal,

    /// Option right for the lotto play
    #[arg(long, value_enum, default_value_t = RightArg::Call)]
    pub right: RightArg,

    /// Straddle strike (at-the-money when omitted)
    #[arg(long)]
    pub strike: Option<Decimal>,

    /// Confirm the minted intent and paper-execute it
    #[arg(long)]
    pub confirm: bool,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

impl PaperSessionArgs {
    fn strategy_spec(&self) -> StrategySpec {
        match self.strategy {
            StrategyKind::LongCall => StrategySpec::LongCall {
                target_delta: self.delta.unwrap_or(dec!(0.30)),
            },
            StrategyKind::LongPut => StrategySpec::LongPut {
                target_delta: self.delta.unwrap_or(dec!(0.30)),
            },
            StrategyKind::IronCondor => StrategySpec::IronCondor {
                short_delta: self.delta.unwrap_or(dec!(0.30)),
                width: self.width,
            },
            StrategyKind::Lotto => StrategySpec::Lotto {
                right: self.right.into(),
                target_delta: self.delta.unwrap_or(dec!(0.05)),
            },
            StrategyKind::Straddle => StrategySpec::Straddle { strike: self.strike },
        }
    }
}

/// Arguments for the straddle scan.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// JSON-lines chain file
    #[arg(long)]
    pub chain: PathBuf,

    /// Maximum implied volatility on either leg
    #[arg(long, default_value = "0.8")]
    pub max_iv: Decimal,

    /// Minimum volume on each leg
    #[arg(long, default_value_t = 100)]
    pub min_volume: u64,

    /// Number of rows to print
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

pub async fn run(args: PaperSessionArgs) -> Result<()> {
    let (core, account) = start_core(&args.config)?;
    let core = Arc::new(core);
    let tasks = replay_chain(&core, &args.chain).await?;

    let spec = args.strategy_spec();
    let proposal = core.build_strategy(&spec).await?;
    print_preview(&proposal);

    if !proposal.risk_summary.passed {
        tasks.shutdown().await?;
        bail!("Preview failed risk checks, no intent minted");
    }

    let token_id = core.mint_intent(&proposal).await?;
    let timeout = core.gate().confirmation_timeout().num_seconds();
    println!("Intent minted: {token_id} (confirm within {timeout}s)");

    if args.confirm {
        let approved = core.confirm_intent(&token_id).await?;
        let executor = PaperExecutor::new(
            Arc::clone(core.cache()),
            core.config().paper.commission_per_contract,
            core.config().strategy.contract_multiplier,
        );
        let report = executor.execute(&approved).await?;
        account.record_execution(&report);
        print_execution(&report);

        let snapshot = core.risk_snapshot().await?;
        println!(
            "Account: P&L {}  delta {}  buying power {}  (loss limit used {}%, delta cap used {}%)",
            snapshot.account.daily_pnl(),
            snapshot.account.portfolio_delta,
            snapshot
                .account
                .buying_power
                .map_or_else(|| "n/a".to_string(), |bp| bp.round_dp(2).to_string()),
            snapshot.utilization.loss_pct,
            snapshot.utilization.delta_pct,
        );
    } else {
        println!("Dry run: re-run with --confirm to execute on paper");
    }

    let stats = tasks.shutdown().await?;
    info!(stored = stats.stored, dropped = stats.dropped, "Paper session finished");
    Ok(())
}

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let (core, _account) = start_core(&args.config)?;
    let core = Arc::new(core);
    let tasks = replay_chain(&core, &args.chain).await?;

    let rows = core.scan_straddles(args.max_iv, args.min_volume);
    println!();
    println!("{}", "=".repeat(104));
    println!(
        "STRADDLE SCAN  (max IV {}, min volume {})  {} candidates",
        args.max_iv,
        args.min_volume,
        rows.len()
    );
    println!("{}", "=".repeat(104));
    println!(
        "{:>10} {:<22} {:<22} {:>10} {:>10} {:>10} {:>7} {:>8}",
        "STRIKE", "CALL", "PUT", "COST", "LOW BE", "HIGH BE", "MOVE %", "VOLUME"
    );
    println!("{}", "-".repeat(104));
    for row in rows.iter().take(args.limit) {
        println!(
            "{:>10} {:<22} {:<22} {:>10} {:>10} {:>10} {:>7} {:>8}",
            row.strike.normalize().to_string(),
            row.call_symbol,
            row.put_symbol,
            row.cost.round_dp(2).to_string(),
            row.lower_breakeven.round_dp(2).to_string(),
            row.upper_breakeven.round_dp(2).to_string(),
            row.implied_move_pct.round_dp(2).to_string(),
            row.combined_volume
        );
    }
    println!();

    tasks.shutdown().await?;
    Ok(())
}

fn start_core(config_path: &str) -> Result<(TradingCore, Arc<PaperAccount>)> {
    let config = ConfigLoader::load_from(config_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let account = Arc::new(PaperAccount::new(config.paper.starting_buying_power));
    let core = TradingCore::new(config, clock, account.clone())?;
    Ok((core, account))
}

/// Replays the chain through the background ingest task and waits for it.
async fn replay_chain(core: &Arc<TradingCore>, chain: &Path) -> Result<BackgroundTasks> {
    let feed = ReplayFeed::from_file(chain)?.restamped_to(Arc::clone(core.cache().clock()));
    let records = feed.remaining();
    let tasks = core.spawn_background(feed);

    tokio::time::timeout(REPLAY_TIMEOUT, async {
        while !tasks.ingest_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("Timed out replaying chain")?;

    let stats = core.cache().stats();
    info!(
        file = %chain.display(),
        records,
        live = stats.live,
        calls = stats.calls,
        puts = stats.puts,
        "Chain loaded"
    );
    if stats.live == 0 {
        tasks.shutdown().await?;
        bail!("No live records after replaying {} (past the session cutoff?)", chain.display());
    }
    Ok(tasks)
}

fn print_preview(proposal: &TradeProposal) {
    println!();
    println!("{}", "=".repeat(72));
    println!("PREVIEW  {}  ({})", proposal.strategy_name, proposal.proposal_id);
    println!("{}", "=".repeat(72));
    for leg in &proposal.legs {
        println!("  {:<5} {:>3} x {}", leg.side, leg.ratio_qty, leg.symbol);
    }
    println!("{}", "-".repeat(72));
    let cost = proposal.estimated_cost.round_dp(2);
    if cost < Decimal::ZERO {
        println!("  Credit:      ${}", -cost);
    } else {
        println!("  Debit:       ${cost}");
    }
    println!("  Max loss:    ${}", proposal.max_loss.round_dp(2));
    println!("  Max profit:  {}", proposal.max_profit);
    println!("  Net delta:   {}", proposal.net_delta);
    println!("  Priced at:   {}", proposal.computed_from_snapshot_at);
    println!(
        "  Risk:        {}",
        if proposal.risk_summary.passed { "PASSED" } else { "FAILED" }
    );
    for violation in &proposal.risk_summary.violations {
        println!("    [X] {violation}");
    }
    for warning in &proposal.risk_summary.warnings {
        println!("    [!] {warning}");
    }
    println!();
}

fn print_execution(report: &ExecutionReport) {
    println!();
    println!("PAPER EXECUTION  {}", report.order_id);
    println!("{}", "-".repeat(72));
    for fill in &report.fills {
        println!(
            "  {:<5} {:>3} x {:<22} @ {}",
            fill.side, fill.quantity, fill.symbol, fill.price
        );
    }
    println!("  Premium:     ${}", report.net_premium.round_dp(2));
    println!("  Commission:  ${}", report.commission.round_dp(2));
    println!();
}
