//! Ledger Service
//!
//! Shares one lifecycle engine between connection tasks. A single
//! `RwLock` serializes every mutation: a write-locked call is one
//! transaction, and no reader observes a half-applied placement or
//! resolution. Payout transfers run inside the resolving write lock, so the
//! totals they were computed from cannot move underneath them.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::config::LedgerConfig;
use crate::core::amount::Amount;
use crate::core::hash::StateHash;
use crate::ledger::account::AccountId;
use crate::ledger::bet::{BetId, BetView, OptionInfo, UserBet};
use crate::ledger::custody::Escrow;
use crate::ledger::engine::{BetLifecycleEngine, Placement};
use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::events::{BroadcastSink, LedgerEvent};
use crate::ledger::journal::Journal;
use crate::ledger::payout::PayoutReport;

/// Engine type used by the server.
pub type SharedEngine = BetLifecycleEngine<Escrow, BroadcastSink>;

/// Thread-safe handle to the ledger. Cheap to clone.
#[derive(Clone)]
pub struct LedgerService {
    engine: Arc<RwLock<SharedEngine>>,
    events: BroadcastSink,
    authority: AccountId,
}

impl LedgerService {
    /// Create a service with an empty escrow.
    pub fn new(config: &LedgerConfig) -> Self {
        Self::with_escrow(config, Escrow::new())
    }

    /// Create a service over an existing escrow.
    pub fn with_escrow(config: &LedgerConfig, escrow: Escrow) -> Self {
        let events = BroadcastSink::new(config.event_capacity);
        let engine = BetLifecycleEngine::from_config(config, escrow, events.clone());

        info!(
            "Ledger service ready (authority {}, journal {})",
            config.authority,
            if config.record_journal { "on" } else { "off" }
        );

        Self {
            engine: Arc::new(RwLock::new(engine)),
            events,
            authority: config.authority,
        }
    }

    /// The bet authority.
    pub fn authority(&self) -> AccountId {
        self.authority
    }

    /// Is `account` the bet authority?
    pub fn is_authority(&self, account: &AccountId) -> bool {
        *account == self.authority
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Open a bet.
    pub async fn create_bet(
        &self,
        caller: &AccountId,
        topic: &str,
        options: &[String],
    ) -> LedgerResult<BetId> {
        self.engine.write().await.create_bet(caller, topic, options)
    }

    /// Place value on an option.
    pub async fn place_bet(
        &self,
        bet_id: BetId,
        option: &str,
        participant: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Placement> {
        self.engine.write().await.place_bet(bet_id, option, participant, amount)
    }

    /// Resolve a bet and pay the winners.
    pub async fn resolve(
        &self,
        bet_id: BetId,
        winning_option: &str,
        caller: &AccountId,
    ) -> LedgerResult<PayoutReport> {
        self.engine.write().await.resolve(bet_id, winning_option, caller)
    }

    /// Credit a wallet. Authority only.
    pub async fn fund(
        &self,
        caller: &AccountId,
        account: AccountId,
        amount: Amount,
    ) -> LedgerResult<Amount> {
        if !self.is_authority(caller) {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut engine = self.engine.write().await;
        let balance = engine
            .custody_mut()
            .fund(account, amount)
            .map_err(|e| LedgerError::DepositRejected(e.to_string()))?;

        info!("Funded {} with {} (balance {})", account.short(), amount, balance);
        Ok(balance)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Snapshot of a bet.
    pub async fn get_bet(&self, bet_id: BetId) -> LedgerResult<BetView> {
        Ok(self.engine.read().await.get_bet(bet_id)?.view())
    }

    /// Options, totals and pot.
    pub async fn get_option_info(&self, bet_id: BetId) -> LedgerResult<OptionInfo> {
        self.engine.read().await.get_option_info(bet_id)
    }

    /// One participant's stakes.
    pub async fn get_user_bet(&self, bet_id: BetId, participant: &AccountId) -> LedgerResult<UserBet> {
        self.engine.read().await.get_user_bet(bet_id, participant)
    }

    /// Number of bets.
    pub async fn count(&self) -> usize {
        self.engine.read().await.count()
    }

    /// Spendable wallet balance.
    pub async fn balance(&self, account: &AccountId) -> Amount {
        self.engine.read().await.custody().balance_of(account)
    }

    /// Value held in escrow across all pots.
    pub async fn held(&self) -> Amount {
        self.engine.read().await.custody().held()
    }

    /// Registry digest and the number of bets it covers.
    pub async fn state_hash(&self) -> (StateHash, usize) {
        let engine = self.engine.read().await;
        (engine.state_hash(), engine.count())
    }

    /// Copy of the journal, if recording.
    pub async fn journal(&self) -> Option<Journal> {
        self.engine.read().await.journal().cloned()
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}
