//! Bet Registry
//!
//! Append-only store of bets indexed by sequential id. Bets are never
//! removed, so the next id is always the current length.

use std::collections::BTreeSet;
use tracing::info;

use crate::core::hash::{StateHash, StateHasher};
use crate::ledger::account::AccountId;
use crate::ledger::bet::{Bet, BetId, MIN_OPTIONS};
use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::events::{EventBus, EventSink, LedgerEventData};

/// Owner of all bet records.
#[derive(Debug, Clone)]
pub struct BetRegistry {
    authority: AccountId,
    bets: Vec<Bet>,
}

impl BetRegistry {
    /// Create an empty registry governed by `authority`.
    pub fn new(authority: AccountId) -> Self {
        Self {
            authority,
            bets: Vec::new(),
        }
    }

    /// The single principal allowed to create and resolve bets.
    pub fn authority(&self) -> AccountId {
        self.authority
    }

    /// Fail with `Unauthorized` unless `caller` is the authority.
    pub fn ensure_authority(&self, caller: &AccountId) -> LedgerResult<()> {
        if *caller != self.authority {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    /// Open a new bet.
    ///
    /// Emits `BetCreated` on success. Nothing is appended on error.
    pub fn create<S: EventSink>(
        &mut self,
        caller: &AccountId,
        topic: &str,
        options: &[String],
        events: &mut EventBus<S>,
    ) -> LedgerResult<BetId> {
        self.ensure_authority(caller)?;
        validate_creation(topic, options)?;

        let id = self.bets.len() as BetId;
        self.bets.push(Bet::new(id, topic.to_string(), options.to_vec()));

        events.publish(LedgerEventData::BetCreated {
            bet_id: id,
            topic: topic.to_string(),
            options: options.to_vec(),
        });

        info!("Bet {} created: {:?} with {} options", id, topic, options.len());
        Ok(id)
    }

    /// Look up a bet.
    pub fn get(&self, bet_id: BetId) -> LedgerResult<&Bet> {
        usize::try_from(bet_id)
            .ok()
            .and_then(|i| self.bets.get(i))
            .ok_or(LedgerError::NotFound(bet_id))
    }

    /// Look up a bet for mutation.
    pub(crate) fn get_mut(&mut self, bet_id: BetId) -> LedgerResult<&mut Bet> {
        usize::try_from(bet_id)
            .ok()
            .and_then(|i| self.bets.get_mut(i))
            .ok_or(LedgerError::NotFound(bet_id))
    }

    /// Number of bets created so far.
    pub fn count(&self) -> usize {
        self.bets.len()
    }

    /// Deterministic digest of the whole registry.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_ledger_state();
        hasher.update_id(self.authority.as_bytes());
        hasher.update_u64(self.bets.len() as u64);
        for bet in &self.bets {
            bet.hash_into(&mut hasher);
        }
        hasher.finalize()
    }
}

/// Reject empty topics, fewer than two options, and empty or repeated labels.
pub fn validate_creation(topic: &str, options: &[String]) -> LedgerResult<()> {
    if topic.is_empty() {
        return Err(LedgerError::InvalidArgument("topic must not be empty".into()));
    }

    if options.len() < MIN_OPTIONS {
        return Err(LedgerError::InvalidArgument(
            "at least two options are required".into(),
        ));
    }

    let mut seen = BTreeSet::new();
    for label in options {
        if label.is_empty() {
            return Err(LedgerError::InvalidArgument("option labels must not be empty".into()));
        }
        if !seen.insert(label.as_str()) {
            return Err(LedgerError::InvalidArgument(format!("duplicate option {:?}", label)));
        }
    }

    Ok(())
}
