//! Bet Records
//!
//! A bet is a topic with a fixed, ordered list of mutually exclusive options.
//! Uses BTreeMap for participant stakes so iteration (and therefore payout
//! order and state hashing) is deterministic.
//!
//! ## Invariants
//!
//! - `options.len() == option_totals.len() >= 2`, labels distinct
//! - `total_pot == sum(option_totals) == sum of every stake entry`
//! - once resolved, totals and stakes never change

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::amount::{decimal_amount, decimal_amounts, Amount, AMOUNT_ZERO};
use crate::core::hash::StateHasher;
use crate::ledger::account::AccountId;
use crate::ledger::error::{LedgerError, LedgerResult};

/// Sequential bet identifier, starting at 0.
pub type BetId = u64;

/// Stable position of an option within its bet.
pub type OptionIndex = usize;

/// Minimum number of options a bet must offer.
pub const MIN_OPTIONS: usize = 2;

// =============================================================================
// STAKES
// =============================================================================

/// Accumulated stake of one participant on one option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeEntry {
    /// Option the value backs.
    pub option_index: OptionIndex,
    /// Total value placed on that option by this participant.
    #[serde(with = "decimal_amount")]
    pub amount: Amount,
}

/// Totals a placement would produce, computed before anything is mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StakeTotals {
    /// New total on the chosen option.
    pub option_total: Amount,
    /// New pot.
    pub total_pot: Amount,
}

// =============================================================================
// BET STATUS
// =============================================================================

/// Lifecycle state. `Resolved` is terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetStatus {
    /// Accepting placements.
    Open,
    /// Winner declared; frozen.
    Resolved {
        /// Winning label.
        winning_option: String,
        /// Index of the winning label.
        winning_index: OptionIndex,
    },
}

// =============================================================================
// BET
// =============================================================================

/// A single bet and all value placed on it.
#[derive(Clone, Debug)]
pub struct Bet {
    id: BetId,
    topic: String,
    options: Vec<String>,
    option_totals: Vec<Amount>,
    total_pot: Amount,
    status: BetStatus,
    participant_bets: BTreeMap<AccountId, Vec<StakeEntry>>,
}

impl Bet {
    /// Create an open bet with zeroed totals.
    ///
    /// Input validation happens in the registry; this only builds the record.
    pub(crate) fn new(id: BetId, topic: String, options: Vec<String>) -> Self {
        let option_totals = vec![AMOUNT_ZERO; options.len()];
        Self {
            id,
            topic,
            options,
            option_totals,
            total_pot: AMOUNT_ZERO,
            status: BetStatus::Open,
            participant_bets: BTreeMap::new(),
        }
    }

    /// Bet identifier.
    pub fn id(&self) -> BetId {
        self.id
    }

    /// Display topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ordered option labels.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Accumulated value per option, parallel to `options()`.
    pub fn option_totals(&self) -> &[Amount] {
        &self.option_totals
    }

    /// Sum of all placed value.
    pub fn total_pot(&self) -> Amount {
        self.total_pot
    }

    /// Current lifecycle state.
    pub fn status(&self) -> &BetStatus {
        &self.status
    }

    /// Has a winner been declared?
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, BetStatus::Resolved { .. })
    }

    /// Winning label, set iff resolved.
    pub fn winning_option(&self) -> Option<&str> {
        match &self.status {
            BetStatus::Resolved { winning_option, .. } => Some(winning_option),
            BetStatus::Open => None,
        }
    }

    /// Winning index, set iff resolved.
    pub fn winning_index(&self) -> Option<OptionIndex> {
        match self.status {
            BetStatus::Resolved { winning_index, .. } => Some(winning_index),
            BetStatus::Open => None,
        }
    }

    /// Look up an option by exact label.
    pub fn option_index(&self, label: &str) -> Option<OptionIndex> {
        self.options.iter().position(|o| o == label)
    }

    /// Stakes of every participant, in account order.
    pub fn participant_bets(&self) -> &BTreeMap<AccountId, Vec<StakeEntry>> {
        &self.participant_bets
    }

    /// Stake entries for one participant (empty if they never bet).
    pub fn stakes_of(&self, participant: &AccountId) -> &[StakeEntry] {
        self.participant_bets
            .get(participant)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Options, totals and pot in one snapshot.
    pub fn option_info(&self) -> OptionInfo {
        OptionInfo {
            options: self.options.clone(),
            option_totals: self.option_totals.clone(),
            total_pot: self.total_pot,
        }
    }

    /// Parallel index/amount lists for one participant.
    pub fn user_bet(&self, participant: &AccountId) -> UserBet {
        let stakes = self.stakes_of(participant);
        UserBet {
            option_indexes: stakes.iter().map(|s| s.option_index).collect(),
            amounts: stakes.iter().map(|s| s.amount).collect(),
        }
    }

    /// Every participant's stake on one option, in account order.
    pub fn stakes_on(&self, option_index: OptionIndex) -> Vec<(AccountId, Amount)> {
        self.participant_bets
            .iter()
            .filter_map(|(participant, entries)| {
                entries
                    .iter()
                    .find(|e| e.option_index == option_index)
                    .map(|e| (*participant, e.amount))
            })
            .collect()
    }

    /// Compute the totals a stake would produce, or fail on overflow.
    ///
    /// Pure: lets the caller collect value from custody only once the
    /// accounting is known to succeed.
    pub(crate) fn checked_stake(
        &self,
        option_index: OptionIndex,
        participant: &AccountId,
        amount: Amount,
    ) -> LedgerResult<StakeTotals> {
        let overflow = || LedgerError::ArithmeticOverflow(self.id);

        let option_total = self.option_totals[option_index]
            .checked_add(amount)
            .ok_or_else(overflow)?;
        let total_pot = self.total_pot.checked_add(amount).ok_or_else(overflow)?;

        // A single entry can never exceed its option total, but check anyway
        // so apply_stake has no failure path.
        let existing = self
            .stakes_of(participant)
            .iter()
            .find(|e| e.option_index == option_index)
            .map(|e| e.amount)
            .unwrap_or(AMOUNT_ZERO);
        existing.checked_add(amount).ok_or_else(overflow)?;

        Ok(StakeTotals { option_total, total_pot })
    }

    /// Apply a stake whose totals were produced by `checked_stake`.
    pub(crate) fn apply_stake(
        &mut self,
        option_index: OptionIndex,
        participant: AccountId,
        amount: Amount,
        totals: StakeTotals,
    ) {
        debug_assert!(!self.is_resolved(), "stake applied to resolved bet");

        self.option_totals[option_index] = totals.option_total;
        self.total_pot = totals.total_pot;

        let entries = self.participant_bets.entry(participant).or_default();
        match entries.iter_mut().find(|e| e.option_index == option_index) {
            Some(entry) => entry.amount += amount,
            None => entries.push(StakeEntry { option_index, amount }),
        }
    }

    /// Freeze the bet with a winner. Callers check the bet is open first.
    pub(crate) fn mark_resolved(&mut self, winning_index: OptionIndex) {
        debug_assert!(!self.is_resolved(), "bet resolved twice");

        self.status = BetStatus::Resolved {
            winning_option: self.options[winning_index].clone(),
            winning_index,
        };
    }

    /// Feed the full record into a state hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.id);
        hasher.update_str(&self.topic);

        hasher.update_u32(self.options.len() as u32);
        for (label, total) in self.options.iter().zip(&self.option_totals) {
            hasher.update_str(label);
            hasher.update_amount(*total);
        }
        hasher.update_amount(self.total_pot);

        match self.status {
            BetStatus::Open => hasher.update_bool(false),
            BetStatus::Resolved { winning_index, .. } => {
                hasher.update_bool(true);
                hasher.update_u32(winning_index as u32);
            }
        }

        hasher.update_u32(self.participant_bets.len() as u32);
        for (participant, entries) in &self.participant_bets {
            hasher.update_id(participant.as_bytes());
            hasher.update_u32(entries.len() as u32);
            for entry in entries {
                hasher.update_u32(entry.option_index as u32);
                hasher.update_amount(entry.amount);
            }
        }
    }

    /// Wire-friendly snapshot of the whole record.
    pub fn view(&self) -> BetView {
        BetView {
            id: self.id,
            topic: self.topic.clone(),
            options: self.options.clone(),
            option_totals: self.option_totals.clone(),
            total_pot: self.total_pot,
            is_resolved: self.is_resolved(),
            winning_option: self.winning_option().map(str::to_string),
            participants: self
                .participant_bets
                .iter()
                .map(|(participant, entries)| ParticipantStakes {
                    participant: *participant,
                    entries: entries.clone(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// QUERY VIEWS
// =============================================================================

/// Options with their totals and the pot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionInfo {
    /// Ordered labels.
    pub options: Vec<String>,
    /// Value per option.
    #[serde(with = "decimal_amounts")]
    pub option_totals: Vec<Amount>,
    /// Sum of all option totals.
    #[serde(with = "decimal_amount")]
    pub total_pot: Amount,
}

/// One participant's stakes as parallel lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBet {
    /// Option indexes, in order of first bet.
    pub option_indexes: Vec<OptionIndex>,
    /// Accumulated amount per index.
    #[serde(with = "decimal_amounts")]
    pub amounts: Vec<Amount>,
}

impl UserBet {
    /// No stakes recorded.
    pub fn is_empty(&self) -> bool {
        self.option_indexes.is_empty()
    }
}

/// Stakes of one participant inside a [`BetView`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStakes {
    /// Participant account.
    pub participant: AccountId,
    /// Entries in first-bet order.
    pub entries: Vec<StakeEntry>,
}

/// Serializable snapshot of a bet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetView {
    /// Bet identifier.
    pub id: BetId,
    /// Display topic.
    pub topic: String,
    /// Ordered labels.
    pub options: Vec<String>,
    /// Value per option.
    #[serde(with = "decimal_amounts")]
    pub option_totals: Vec<Amount>,
    /// Sum of all option totals.
    #[serde(with = "decimal_amount")]
    pub total_pot: Amount,
    /// Has a winner been declared?
    pub is_resolved: bool,
    /// Winning label once resolved.
    pub winning_option: Option<String>,
    /// Stakes in account order.
    pub participants: Vec<ParticipantStakes>,
}
