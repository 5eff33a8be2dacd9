//! Operation Journal
//!
//! Append-only record of every successful mutation, each stamped with the
//! registry digest it produced. Replaying the operations against a fresh
//! registry must reproduce every digest; any divergence means the journal
//! (or the code) no longer describes the same ledger.
//!
//! Value movement is not replayed. Stakes and payouts already happened in
//! the original run, so replay uses [`ReplayCustody`].

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::amount::Amount;
use crate::core::hash::StateHash;
use crate::ledger::account::AccountId;
use crate::ledger::bet::BetId;
use crate::ledger::custody::ReplayCustody;
use crate::ledger::engine::BetLifecycleEngine;
use crate::ledger::error::LedgerError;
use crate::ledger::events::LedgerEvent;

/// Journal failures.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Binary encoding failed.
    #[error("journal encoding failed: {0}")]
    Codec(#[from] bincode::Error),

    /// Entries are not numbered 0, 1, 2, ...
    #[error("journal sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Next sequence number.
        expected: u64,
        /// Number actually present.
        found: u64,
    },

    /// A recorded operation failed on replay.
    #[error("entry {sequence} rejected on replay: {error}")]
    Rejected {
        /// Entry that failed.
        sequence: u64,
        /// Why.
        error: LedgerError,
    },

    /// Replayed state differs from the recorded digest.
    #[error("state hash mismatch at entry {sequence}")]
    HashMismatch {
        /// First divergent entry.
        sequence: u64,
    },
}

/// A state-changing ledger operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    /// `create_bet`
    CreateBet {
        /// Caller (the authority).
        caller: AccountId,
        /// Topic.
        topic: String,
        /// Option labels.
        options: Vec<String>,
    },
    /// `place_bet`
    PlaceBet {
        /// Target bet.
        bet_id: BetId,
        /// Chosen label.
        option: String,
        /// Bettor.
        participant: AccountId,
        /// Value placed.
        amount: Amount,
    },
    /// `resolve`
    ResolveBet {
        /// Target bet.
        bet_id: BetId,
        /// Declared winner.
        winning_option: String,
        /// Caller (the authority).
        caller: AccountId,
    },
}

/// One journaled operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal.
    pub sequence: u64,
    /// The operation.
    pub op: LedgerOp,
    /// Registry digest after the operation.
    pub state_hash: StateHash,
    /// Wall-clock time of recording. Informational only.
    pub recorded_at: DateTime<Utc>,
}

/// Append-only operation log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation with its resulting digest.
    pub fn record(&mut self, op: LedgerOp, state_hash: StateHash) -> u64 {
        let sequence = self.entries.len() as u64;
        self.entries.push(JournalEntry {
            sequence,
            op,
            state_hash,
            recorded_at: Utc::now(),
        });
        sequence
    }

    /// All entries in order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest after the latest entry.
    pub fn last_hash(&self) -> Option<StateHash> {
        self.entries.last().map(|e| e.state_hash)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, JournalError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode).
    pub fn from_bytes(data: &[u8]) -> Result<Self, JournalError> {
        Ok(bincode::deserialize(data)?)
    }

    /// Replay this journal; see [`replay`].
    pub fn replay(&self, authority: AccountId) -> Result<StateHash, JournalError> {
        replay(authority, &self.entries)
    }
}

/// Re-apply `entries` to a fresh registry governed by `authority`.
///
/// Returns the final digest, or the first entry that fails or diverges.
pub fn replay(authority: AccountId, entries: &[JournalEntry]) -> Result<StateHash, JournalError> {
    let mut engine: BetLifecycleEngine<ReplayCustody, Vec<LedgerEvent>> =
        BetLifecycleEngine::new(authority, ReplayCustody, Vec::new());

    for (expected, entry) in entries.iter().enumerate() {
        let expected = expected as u64;
        if entry.sequence != expected {
            return Err(JournalError::SequenceGap { expected, found: entry.sequence });
        }

        let applied = match &entry.op {
            LedgerOp::CreateBet { caller, topic, options } => {
                engine.create_bet(caller, topic, options).map(|_| ())
            }
            LedgerOp::PlaceBet { bet_id, option, participant, amount } => {
                engine.place_bet(*bet_id, option, participant, *amount).map(|_| ())
            }
            LedgerOp::ResolveBet { bet_id, winning_option, caller } => {
                engine.resolve(*bet_id, winning_option, caller).map(|_| ())
            }
        };
        applied.map_err(|error| JournalError::Rejected { sequence: entry.sequence, error })?;

        if engine.state_hash() != entry.state_hash {
            warn!("Journal replay diverged at entry {}", entry.sequence);
            return Err(JournalError::HashMismatch { sequence: entry.sequence });
        }
    }

    debug!("Replayed {} journal entries", entries.len());
    Ok(engine.state_hash())
}
