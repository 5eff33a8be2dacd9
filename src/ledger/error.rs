//! Ledger Errors

use thiserror::Error;
use serde::{Serialize, Deserialize};

use crate::core::amount::Amount;
use crate::ledger::account::AccountId;
use crate::ledger::bet::BetId;

/// Errors returned by registry and lifecycle operations.
///
/// Every variant except `TransferFailed` aborts the operation with no state
/// change. `TransferFailed` only ever appears attached to a single payout
/// record; it never aborts a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerError {
    /// Malformed creation input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown bet id.
    #[error("bet {0} does not exist")]
    NotFound(BetId),

    /// Mutation attempted on a resolved bet.
    #[error("bet {0} has already been resolved")]
    AlreadyResolved(BetId),

    /// Option label does not belong to the bet.
    #[error("option {option:?} does not exist on bet {bet_id}")]
    InvalidOption {
        /// Bet the lookup ran against.
        bet_id: BetId,
        /// Requested label.
        option: String,
    },

    /// Placement value must be greater than zero.
    #[error("bet amount must be greater than zero")]
    InvalidAmount,

    /// Caller is not the bet authority.
    #[error("only the authority can perform this action (caller {caller})")]
    Unauthorized {
        /// Rejected caller.
        caller: AccountId,
    },

    /// A totals update would exceed the amount range.
    #[error("amount overflow on bet {0}")]
    ArithmeticOverflow(BetId),

    /// Custody refused to collect a stake.
    #[error("deposit rejected: {0}")]
    DepositRejected(String),

    /// Payout to one participant failed.
    #[error("transfer of {amount} to {participant} failed: {reason}")]
    TransferFailed {
        /// Intended recipient.
        participant: AccountId,
        /// Reward that was not delivered.
        amount: Amount,
        /// Custody's rejection reason.
        reason: String,
    },
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
