//! Proportional Payout
//!
//! Resolution pays the entire pot to the backers of the winning option,
//! split in proportion to their stake:
//!
//! ```text
//! W = option_totals[winning_index]
//! P = total_pot
//! reward(participant) = floor(stake_on_winner * P / W)
//! ```
//!
//! The plan is computed from a snapshot before the bet is frozen, so an
//! arithmetic failure can still abort resolution cleanly. Execution then
//! performs one isolated transfer per winner; a failed transfer is recorded
//! against that participant and the loop moves on.
//!
//! Floor division leaves `P - sum(rewards)` undistributed. There is no
//! remainder sweep: the residual stays in custody.

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::amount::{decimal_amount, Amount, AMOUNT_ZERO, mul_div_floor};
use crate::ledger::account::AccountId;
use crate::ledger::bet::{Bet, BetId, OptionIndex};
use crate::ledger::custody::ValueCustody;
use crate::ledger::error::{LedgerError, LedgerResult};

/// One winner's computed reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPayout {
    /// Recipient.
    pub participant: AccountId,
    /// Value they placed on the winning option.
    #[serde(with = "decimal_amount")]
    pub stake: Amount,
    /// Floor share of the pot.
    #[serde(with = "decimal_amount")]
    pub reward: Amount,
}

/// Rewards for every winner, computed from frozen totals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutPlan {
    /// Bet being resolved.
    pub bet_id: BetId,
    /// Winning label.
    pub winning_option: String,
    /// Winning index.
    pub winning_index: OptionIndex,
    /// Pot at the instant of resolution.
    pub total_pot: Amount,
    /// Value backing the winner at the instant of resolution.
    pub winning_total: Amount,
    /// Rewards in account order.
    pub payouts: Vec<PlannedPayout>,
}

impl PayoutPlan {
    /// Compute the plan for `winning_index` on an open bet.
    pub fn compute(bet: &Bet, winning_index: OptionIndex) -> LedgerResult<Self> {
        let total_pot = bet.total_pot();
        let winning_total = bet.option_totals()[winning_index];

        let payouts = if winning_total == AMOUNT_ZERO {
            Vec::new()
        } else {
            bet.stakes_on(winning_index)
                .into_iter()
                .map(|(participant, stake)| {
                    mul_div_floor(stake, total_pot, winning_total)
                        .map(|reward| PlannedPayout { participant, stake, reward })
                        .ok_or(LedgerError::ArithmeticOverflow(bet.id()))
                })
                .collect::<LedgerResult<Vec<_>>>()?
        };

        Ok(Self {
            bet_id: bet.id(),
            winning_option: bet.options()[winning_index].clone(),
            winning_index,
            total_pot,
            winning_total,
            payouts,
        })
    }

    /// Did anyone back the winner?
    pub fn has_winners(&self) -> bool {
        self.winning_total > AMOUNT_ZERO
    }

    /// Sum of planned rewards. Never exceeds the pot.
    pub fn total_rewards(&self) -> Amount {
        self.payouts.iter().map(|p| p.reward).sum()
    }

    /// Floor residual left in custody when every transfer succeeds.
    pub fn undistributed(&self) -> Amount {
        self.total_pot - self.total_rewards()
    }

    /// Perform every transfer, isolating failures per participant.
    ///
    /// Transfers are attempted exactly once each, in plan order. Every
    /// planned reward is at least 1 because `stake >= 1` and `P >= W`.
    pub fn execute<C: ValueCustody + ?Sized>(self, custody: &mut C) -> PayoutReport {
        let mut records = Vec::with_capacity(self.payouts.len());

        for payout in &self.payouts {
            let outcome = match custody.transfer(&payout.participant, payout.reward) {
                Ok(()) => {
                    debug!(
                        "Bet {}: paid {} to {}",
                        self.bet_id, payout.reward, payout.participant.short()
                    );
                    PayoutOutcome::Paid
                }
                Err(e) => {
                    warn!(
                        "Bet {}: payout of {} to {} failed: {}",
                        self.bet_id, payout.reward, payout.participant.short(), e
                    );
                    PayoutOutcome::TransferFailed { reason: e.to_string() }
                }
            };

            records.push(PayoutRecord {
                participant: payout.participant,
                stake: payout.stake,
                amount: payout.reward,
                outcome,
            });
        }

        PayoutReport {
            bet_id: self.bet_id,
            winning_option: self.winning_option,
            winning_index: self.winning_index,
            total_pot: self.total_pot,
            winning_total: self.winning_total,
            payouts: records,
        }
    }
}

/// Result of one payout transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutOutcome {
    /// Custody delivered the reward.
    Paid,
    /// Custody refused; the reward stays held.
    TransferFailed {
        /// Custody's reason.
        reason: String,
    },
}

/// Per-participant payout result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    /// Recipient.
    pub participant: AccountId,
    /// Stake on the winning option.
    #[serde(with = "decimal_amount")]
    pub stake: Amount,
    /// Reward attempted.
    #[serde(with = "decimal_amount")]
    pub amount: Amount,
    /// What happened.
    pub outcome: PayoutOutcome,
}

impl PayoutRecord {
    /// Was the reward delivered?
    pub fn is_paid(&self) -> bool {
        matches!(self.outcome, PayoutOutcome::Paid)
    }

    /// The failure as a ledger error, if the transfer failed.
    pub fn error(&self) -> Option<LedgerError> {
        match &self.outcome {
            PayoutOutcome::Paid => None,
            PayoutOutcome::TransferFailed { reason } => Some(LedgerError::TransferFailed {
                participant: self.participant,
                amount: self.amount,
                reason: reason.clone(),
            }),
        }
    }
}

/// Everything a resolution did, returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReport {
    /// Resolved bet.
    pub bet_id: BetId,
    /// Winning label.
    pub winning_option: String,
    /// Winning index.
    pub winning_index: OptionIndex,
    /// Pot at resolution.
    #[serde(with = "decimal_amount")]
    pub total_pot: Amount,
    /// Value backing the winner.
    #[serde(with = "decimal_amount")]
    pub winning_total: Amount,
    /// One record per winner.
    pub payouts: Vec<PayoutRecord>,
}

impl PayoutReport {
    /// Reward delivered to `participant` (0 if none).
    pub fn paid_to(&self, participant: &AccountId) -> Amount {
        self.payouts
            .iter()
            .filter(|r| r.participant == *participant && r.is_paid())
            .map(|r| r.amount)
            .sum()
    }

    /// Sum of delivered rewards.
    pub fn total_paid(&self) -> Amount {
        self.payouts.iter().filter(|r| r.is_paid()).map(|r| r.amount).sum()
    }

    /// Failed transfers as ledger errors.
    pub fn failures(&self) -> Vec<LedgerError> {
        self.payouts.iter().filter_map(PayoutRecord::error).collect()
    }

    /// Value that stayed in custody: floor residual, failed transfers, or
    /// the whole pot when nobody backed the winner.
    pub fn retained(&self) -> Amount {
        self.total_pot - self.total_paid()
    }
}
