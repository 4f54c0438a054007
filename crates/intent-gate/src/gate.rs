//! Intent gate: single-use, time-boxed authorisation between a preview and
//! its execution.
//!
//! The token table is a map of `token_id -> Arc<Mutex<IntentToken>>` plus a
//! `proposal_id -> token_id` index. The map lock is held only to look up,
//! insert or purge entries; the state machine runs under the per-token mutex,
//! so confirms on different tokens proceed in parallel while racing confirms
//! on one token are serialised and exactly one of them observes `Pending`.
//! Lock order is always map, then token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use zdte_core::{AccountRiskState, AccountSource, Clock};
use zdte_market::SnapshotCache;

use crate::error::{GateError, Violation};
use crate::risk::RiskEvaluator;
use crate::strategy::{price_legs, PricedLeg};
use crate::types::{IntentToken, TokenState, TradeProposal};

type TokenEntry = Arc<Mutex<IntentToken>>;

#[derive(Debug, Clone, Default)]
struct TokenTable {
    tokens: HashMap<String, TokenEntry>,
    /// Newest token minted for each proposal.
    by_proposal: HashMap<Uuid, String>,
}

impl TokenTable {
    fn latest_for(&self, proposal_id: Uuid) -> Option<TokenEntry> {
        self.by_proposal
            .get(&proposal_id)
            .and_then(|token_id| self.tokens.get(token_id))
            .cloned()
    }

    fn purge(&mut self, token_id: &str, proposal_id: Uuid) {
        self.tokens.remove(token_id);
        if self.by_proposal.get(&proposal_id).is_some_and(|id| id == token_id) {
            self.by_proposal.remove(&proposal_id);
        }
    }

    fn entries(&self) -> Vec<TokenEntry> {
        self.tokens.values().cloned().collect()
    }
}

pub struct IntentGate {
    tokens: RwLock<TokenTable>,
    cache: Arc<SnapshotCache>,
    account: Arc<dyn AccountSource>,
    evaluator: RiskEvaluator,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    multiplier: Decimal,
}

impl std::fmt::Debug for IntentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentGate")
            .field("tokens", &self.tokens.read().tokens.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IntentGate {
    pub fn new(
        cache: Arc<SnapshotCache>,
        account: Arc<dyn AccountSource>,
        evaluator: RiskEvaluator,
        timeout: Duration,
        multiplier: Decimal,
    ) -> Self {
        let clock = Arc::clone(cache.clock());
        Self {
            tokens: RwLock::new(TokenTable::default()),
            cache,
            account,
            evaluator,
            clock,
            timeout,
            multiplier,
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.timeout
    }

    /// Mints a `Pending` token for `proposal` after re-running the risk check
    /// against the current account state.
    ///
    /// A proposal has at most one live token: minting it again expires the
    /// previous `Pending` token, and a proposal that already went through a
    /// confirmed token is refused.
    ///
    /// # Errors
    ///
    /// `Rejected` with every violation if the proposal fails risk now,
    /// `AlreadyConfirmed` if it was confirmed before, or `Account` if the
    /// account state cannot be read.
    pub async fn mint(&self, proposal: TradeProposal) -> Result<IntentToken, GateError> {
        let state = self.fetch_state().await?;
        let now = self.clock.now();

        let summary = self.evaluator.evaluate(&proposal, &state, now);
        if !summary.passed {
            warn!(
                proposal_id = %proposal.proposal_id,
                strategy = %proposal.strategy_name,
                violations = ?summary.violation_messages(),
                "Mint refused by risk check"
            );
            return Err(GateError::Rejected {
                violations: summary.violations,
            });
        }

        let proposal_id = proposal.proposal_id;
        let token = IntentToken {
            token_id: format!("intent-{}", Uuid::new_v4().simple()),
            proposal,
            minted_at: now,
            expires_at: now + self.timeout,
            state: TokenState::Pending,
        };

        let superseded = {
            let mut table = self.tokens.write();
            // only the previous token of this same proposal is locked here
            let superseded = match table.latest_for(proposal_id) {
                Some(entry) => {
                    let mut previous = entry.lock();
                    let outcome = match previous.state {
                        TokenState::Pending => {
                            previous.state = TokenState::Expired;
                            Some(previous.token_id.clone())
                        }
                        TokenState::Confirmed | TokenState::Consumed => {
                            warn!(%proposal_id, token_id = %previous.token_id, "Mint refused, proposal already confirmed");
                            return Err(GateError::AlreadyConfirmed { proposal_id });
                        }
                        TokenState::Expired | TokenState::Rejected => None,
                    };
                    outcome
                }
                None => None,
            };
            table.by_proposal.insert(proposal_id, token.token_id.clone());
            table
                .tokens
                .insert(token.token_id.clone(), Arc::new(Mutex::new(token.clone())));
            superseded
        };

        if let Some(previous) = superseded {
            info!(token_id = %previous, replaced_by = %token.token_id, "Pending intent superseded by re-mint");
        }
        info!(
            token_id = %token.token_id,
            %proposal_id,
            strategy = %token.proposal.strategy_name,
            expires_at = %token.expires_at,
            "Intent minted"
        );
        Ok(token)
    }

    /// Re-validates and consumes the token, returning the proposal to execute.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown or terminal tokens (including the losers of
    ///   a confirm race), whatever the account source is doing
    /// - `Expired` when confirmed after the deadline
    /// - `Rejected` when a leg is gone or the fresh risk check fails
    /// - `Account` when the account state cannot be read; a live token stays
    ///   `Pending`
    pub async fn confirm(&self, token_id: &str) -> Result<TradeProposal, GateError> {
        let entry = self.lookup(token_id).ok_or(GateError::NotFound)?;
        {
            let mut token = entry.lock();
            self.check_open(token_id, &mut token, self.clock.now())?;
        }
        let state = self.fetch_state().await?;
        self.settle(token_id, &entry, &state)
    }

    /// Current state of a token, for operators and audit.
    pub fn inspect(&self, token_id: &str) -> Option<IntentToken> {
        self.lookup(token_id).map(|entry| entry.lock().clone())
    }

    /// Pending tokens that have not yet passed their deadline.
    pub fn live_count(&self) -> usize {
        let now = self.clock.now();
        let entries = self.tokens.read().entries();
        entries
            .iter()
            .filter(|entry| {
                let token = entry.lock();
                token.state == TokenState::Pending && now <= token.expires_at
            })
            .count()
    }

    /// Expires overdue pending tokens and drops terminal ones. Consumed
    /// tokens are kept until their proposal is too stale to mint again.
    /// Memory hygiene only; `confirm` enforces expiry on its own.
    pub fn sweep_tokens(&self) -> usize {
        let now = self.clock.now();
        let entries = self.tokens.read().entries();

        let mut purgeable = Vec::new();
        for entry in entries {
            let mut token = entry.lock();
            if token.state == TokenState::Pending && now > token.expires_at {
                token.state = TokenState::Expired;
            }
            if self.is_purgeable(&token, now) {
                purgeable.push((token.token_id.clone(), token.proposal.proposal_id));
            }
        }
        if purgeable.is_empty() {
            return 0;
        }

        let mut table = self.tokens.write();
        for (token_id, proposal_id) in &purgeable {
            table.purge(token_id, *proposal_id);
        }
        debug!(removed = purgeable.len(), remaining = table.tokens.len(), "Swept intent tokens");
        purgeable.len()
    }

    fn is_purgeable(&self, token: &IntentToken, now: DateTime<Utc>) -> bool {
        match token.state {
            TokenState::Pending => false,
            TokenState::Expired | TokenState::Rejected => true,
            TokenState::Confirmed | TokenState::Consumed => {
                now - token.proposal.computed_from_snapshot_at > self.evaluator.max_staleness()
            }
        }
    }

    fn lookup(&self, token_id: &str) -> Option<TokenEntry> {
        self.tokens.read().tokens.get(token_id).cloned()
    }

    async fn fetch_state(&self) -> Result<AccountRiskState, GateError> {
        self.account
            .current_risk_state()
            .await
            .map_err(|e| GateError::Account(format!("{e:#}")))
    }

    /// Terminal tokens answer `NotFound`; an overdue `Pending` token expires.
    fn check_open(&self, token_id: &str, token: &mut IntentToken, now: DateTime<Utc>) -> Result<(), GateError> {
        if token.state != TokenState::Pending {
            return Err(GateError::NotFound);
        }
        if now > token.expires_at {
            token.state = TokenState::Expired;
            warn!(token_id, expired_at = %token.expires_at, "Intent expired before confirmation");
            return Err(GateError::Expired);
        }
        Ok(())
    }

    fn settle(&self, token_id: &str, entry: &TokenEntry, state: &AccountRiskState) -> Result<TradeProposal, GateError> {
        let mut token = entry.lock();
        let now = self.clock.now();
        // the account read happened outside the lock; re-check
        self.check_open(token_id, &mut token, now)?;

        let mut fresh = Vec::with_capacity(token.proposal.legs.len());
        let mut missing = Vec::new();
        for leg in &token.proposal.legs {
            match self.cache.get(&leg.symbol) {
                Some(record) => fresh.push(PricedLeg::new(leg.clone(), record)),
                None => missing.push(Violation::LegUnavailable {
                    symbol: leg.symbol.clone(),
                }),
            }
        }

        // Re-price from fresh quotes; with legs missing, fall back to the
        // minted figures so the other rules are still reported.
        let mut current = token.proposal.clone();
        if missing.is_empty() {
            if let Some(pricing) = price_legs(&fresh, self.multiplier) {
                current.estimated_cost = pricing.estimated_cost;
                current.net_delta = pricing.net_delta;
                current.computed_from_snapshot_at = pricing.snapshot_at;
            }
        }

        let mut violations = self.evaluator.evaluate(&current, state, now).violations;
        violations.extend(missing);

        if !violations.is_empty() {
            token.state = TokenState::Rejected;
            warn!(
                token_id,
                violations = ?violations.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Intent rejected at confirmation"
            );
            return Err(GateError::Rejected { violations });
        }

        token.state = TokenState::Confirmed;
        let proposal = token.proposal.clone();
        token.state = TokenState::Consumed;

        info!(
            token_id,
            proposal_id = %proposal.proposal_id,
            strategy = %proposal.strategy_name,
            repriced_cost = %current.estimated_cost,
            "Intent confirmed"
        );
        Ok(proposal)
    }

    #[cfg(test)]
    fn expire_at(&self, token_id: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.lookup(token_id) {
            entry.lock().expires_at = at;
        }
    }
}
