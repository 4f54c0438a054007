//! `TradingCore`: the cache, builder and gate wired together, plus the
//! background tasks that keep them fed and tidy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use zdte_core::{AccountRiskState, AccountSource, AppConfig, Clock, MarketFeed};
use zdte_market::{run_ingest, run_sweeper, CacheStats, IngestStats, SnapshotCache};

use crate::error::{BuildError, GateError};
use crate::gate::IntentGate;
use crate::risk::{RiskEvaluator, RiskUtilization};
use crate::strategy::StrategyBuilder;
use crate::types::{IntentToken, StraddleCandidate, StrategySpec, TradeProposal};

/// Account, limit usage and cache health in one read.
#[derive(Debug, Clone, Serialize)]
pub struct RiskSnapshot {
    pub account: AccountRiskState,
    pub utilization: RiskUtilization,
    pub live_intents: usize,
    pub cache: CacheStats,
}

/// Entry point for callers: preview, mint, confirm, kill switch.
pub struct TradingCore {
    config: AppConfig,
    cache: Arc<SnapshotCache>,
    gate: Arc<IntentGate>,
    builder: StrategyBuilder,
    evaluator: RiskEvaluator,
    account: Arc<dyn AccountSource>,
}

impl std::fmt::Debug for TradingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingCore")
            .field("cache", &self.cache)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl TradingCore {
    /// Builds the cache, evaluator, builder and gate from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: AppConfig, clock: Arc<dyn Clock>, account: Arc<dyn AccountSource>) -> Result<Self> {
        config.validate().context("Invalid trading core configuration")?;

        let cache = Arc::new(SnapshotCache::new(&config.cache, clock)?);
        let evaluator = RiskEvaluator::new(config.risk.clone(), config.cache.max_staleness());
        let builder = StrategyBuilder::new(Arc::clone(&cache), evaluator.clone(), config.strategy.clone());
        let gate = Arc::new(IntentGate::new(
            Arc::clone(&cache),
            Arc::clone(&account),
            evaluator.clone(),
            config.gate.confirmation_timeout(),
            config.strategy.contract_multiplier,
        ));

        info!(
            max_daily_loss = %config.risk.max_daily_loss,
            delta_cap = %config.risk.delta_cap,
            confirmation_timeout_secs = config.gate.confirmation_timeout_secs,
            max_staleness_secs = config.cache.max_staleness_secs,
            auto_expire_at = %config.cache.auto_expire_at,
            exchange_timezone = %config.cache.exchange_timezone,
            "Trading core initialised"
        );

        Ok(Self {
            config,
            cache,
            gate,
            builder,
            evaluator,
            account,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn gate(&self) -> &Arc<IntentGate> {
        &self.gate
    }

    /// Preview: prices `spec` from the live snapshot and scores it.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the strategy cannot be built right now.
    pub async fn build_strategy(&self, spec: &StrategySpec) -> Result<TradeProposal, BuildError> {
        let state = self
            .account
            .current_risk_state()
            .await
            .map_err(|e| BuildError::AccountUnavailable(format!("{e:#}")))?;
        self.builder.build(spec, &state)
    }

    /// Mints a token for a proposal that passes risk now; returns its id.
    ///
    /// # Errors
    ///
    /// See [`IntentGate::mint`].
    pub async fn mint_intent(&self, proposal: &TradeProposal) -> Result<String, GateError> {
        self.gate.mint(proposal.clone()).await.map(|token| token.token_id)
    }

    /// Confirms a token. On success the caller executes the returned proposal.
    ///
    /// # Errors
    ///
    /// See [`IntentGate::confirm`].
    pub async fn confirm_intent(&self, token_id: &str) -> Result<TradeProposal, GateError> {
        self.gate.confirm(token_id).await
    }

    pub fn inspect_intent(&self, token_id: &str) -> Option<IntentToken> {
        self.gate.inspect(token_id)
    }

    /// Forwards the kill switch to the account source.
    ///
    /// # Errors
    ///
    /// Returns an error if the account source refuses the change.
    pub async fn kill_switch(&self, enabled: bool) -> Result<()> {
        self.account
            .set_kill_switch(enabled)
            .await
            .with_context(|| format!("Failed to set kill switch to {enabled}"))?;
        if enabled {
            warn!("Kill switch engaged");
        } else {
            info!("Kill switch released");
        }
        Ok(())
    }

    pub fn scan_straddles(&self, max_iv: Decimal, min_volume: u64) -> Vec<StraddleCandidate> {
        self.builder.scan_straddles(max_iv, min_volume)
    }

    /// # Errors
    ///
    /// Returns an error if the account state cannot be read.
    pub async fn risk_snapshot(&self) -> Result<RiskSnapshot> {
        let account = self
            .account
            .current_risk_state()
            .await
            .context("Failed to read account risk state")?;
        Ok(RiskSnapshot {
            utilization: self.evaluator.utilization(&account),
            account,
            live_intents: self.gate.live_count(),
            cache: self.cache.stats(),
        })
    }

    /// Starts feed ingestion, the cache sweep and the token sweep.
    pub fn spawn_background<F>(&self, feed: F) -> BackgroundTasks
    where
        F: MarketFeed + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ingest = tokio::spawn(run_ingest(feed, Arc::clone(&self.cache), shutdown_rx.clone()));
        let cache_sweeper = tokio::spawn(run_sweeper(
            Arc::clone(&self.cache),
            Duration::from_secs(self.config.cache.sweep_interval_secs),
            shutdown_rx.clone(),
        ));
        let token_sweeper = tokio::spawn(run_token_sweeper(
            Arc::clone(&self.gate),
            Duration::from_secs(self.config.gate.token_sweep_interval_secs),
            shutdown_rx,
        ));

        info!("Background tasks started");
        BackgroundTasks {
            shutdown_tx,
            ingest,
            sweepers: vec![cache_sweeper, token_sweeper],
        }
    }
}

/// Handles to the background tasks; `shutdown` stops and joins them.
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    ingest: JoinHandle<Result<IngestStats>>,
    sweepers: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// True once the ingest task has returned (feed exhausted or stopped).
    pub fn ingest_finished(&self) -> bool {
        self.ingest.is_finished()
    }

    /// Signals every task to stop and waits for them.
    ///
    /// # Errors
    ///
    /// Returns an error if a task panicked or the ingest task failed.
    pub async fn shutdown(self) -> Result<IngestStats> {
        // receivers may already be gone if every task exited on its own
        let _ = self.shutdown_tx.send(true);

        for handle in self.sweepers {
            handle.await.context("Background sweeper panicked")?;
        }
        let stats = self.ingest.await.context("Feed ingestion task panicked")??;
        info!("Background tasks stopped");
        Ok(stats)
    }
}

async fn run_token_sweeper(gate: Arc<IntentGate>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_secs = every.as_secs(), "Intent token sweeper started");
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = gate.sweep_tokens();
                debug!(removed, live = gate.live_count(), "Intent token sweep complete");
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Intent token sweeper stopped");
}
