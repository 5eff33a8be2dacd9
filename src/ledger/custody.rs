//! Value Custody
//!
//! The ledger records accounting; custody actually holds value. Stakes are
//! collected into custody atomically with a placement, and rewards leave it
//! one independent transfer at a time during resolution.
//!
//! [`Escrow`] is the in-process implementation used by the service layer.
//! It keeps wallet balances for every account plus the value held against
//! open and resolved pots, and maintains a conservation invariant:
//!
//! ```text
//! sum(wallets) + held == total_funded
//! ```

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::core::amount::{Amount, AMOUNT_ZERO};
use crate::ledger::account::AccountId;

/// Custody failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    /// Wallet cannot cover a stake.
    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds {
        /// Wallet balance.
        available: Amount,
        /// Requested stake.
        required: Amount,
    },

    /// Held balance cannot cover a payout.
    #[error("insufficient escrow: {held} held, {required} required")]
    InsufficientEscrow {
        /// Value currently held.
        held: Amount,
        /// Requested payout.
        required: Amount,
    },

    /// Recipient refuses incoming value.
    #[error("recipient {0} rejected the transfer")]
    RecipientRejected(AccountId),

    /// Balance arithmetic overflowed.
    #[error("balance overflow")]
    Overflow,
}

/// Collaborator that moves value in and out of the pot.
pub trait ValueCustody {
    /// Collect `amount` from `from` into held custody.
    ///
    /// On error nothing has moved.
    fn deposit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError>;

    /// Pay `amount` out of held custody to `to`.
    ///
    /// On error nothing has moved.
    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError>;
}

impl<C: ValueCustody + ?Sized> ValueCustody for Box<C> {
    fn deposit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        (**self).deposit(from, amount)
    }

    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        (**self).transfer(to, amount)
    }
}

// =============================================================================
// ESCROW
// =============================================================================

/// In-memory escrow with wallet balances.
#[derive(Debug, Clone, Default)]
pub struct Escrow {
    /// Spendable balance per account.
    wallets: BTreeMap<AccountId, Amount>,
    /// Value held against pots.
    held: Amount,
    /// Everything ever credited through `fund`.
    total_funded: Amount,
    /// Accounts that refuse incoming payouts.
    rejecting: BTreeSet<AccountId>,
}

impl Escrow {
    /// Create an empty escrow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet with new value.
    ///
    /// The only way value enters the system. Funding never touches the held
    /// balance, so unsolicited value cannot end up in a pot.
    pub fn fund(&mut self, account: AccountId, amount: Amount) -> Result<Amount, CustodyError> {
        let total_funded = self
            .total_funded
            .checked_add(amount)
            .ok_or(CustodyError::Overflow)?;
        let balance = self.balance_of(&account);
        let new_balance = balance.checked_add(amount).ok_or(CustodyError::Overflow)?;

        self.total_funded = total_funded;
        self.wallets.insert(account, new_balance);
        Ok(new_balance)
    }

    /// Spendable balance of an account.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.wallets.get(account).copied().unwrap_or(AMOUNT_ZERO)
    }

    /// Value currently held against pots.
    pub fn held(&self) -> Amount {
        self.held
    }

    /// Everything ever funded.
    pub fn total_funded(&self) -> Amount {
        self.total_funded
    }

    /// Make an account refuse (or accept again) incoming payouts.
    pub fn set_rejecting(&mut self, account: AccountId, rejecting: bool) {
        if rejecting {
            self.rejecting.insert(account);
        } else {
            self.rejecting.remove(&account);
        }
    }

    /// Check `sum(wallets) + held == total_funded`.
    pub fn is_balanced(&self) -> bool {
        let wallets = self
            .wallets
            .values()
            .try_fold(AMOUNT_ZERO, |acc, v| acc.checked_add(*v));
        wallets.and_then(|w| w.checked_add(self.held)) == Some(self.total_funded)
    }
}

impl ValueCustody for Escrow {
    fn deposit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(CustodyError::InsufficientFunds { available, required: amount });
        }
        let held = self.held.checked_add(amount).ok_or(CustodyError::Overflow)?;

        self.wallets.insert(*from, available - amount);
        self.held = held;
        Ok(())
    }

    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        if self.rejecting.contains(to) {
            return Err(CustodyError::RecipientRejected(*to));
        }
        if self.held < amount {
            return Err(CustodyError::InsufficientEscrow { held: self.held, required: amount });
        }
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(CustodyError::Overflow)?;

        self.held -= amount;
        self.wallets.insert(*to, balance);
        Ok(())
    }
}

/// Custody that accepts every movement without tracking balances.
///
/// Used to re-apply journaled operations, whose value movements already
/// happened in the original run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayCustody;

impl ValueCustody for ReplayCustody {
    fn deposit(&mut self, _from: &AccountId, _amount: Amount) -> Result<(), CustodyError> {
        Ok(())
    }

    fn transfer(&mut self, _to: &AccountId, _amount: Amount) -> Result<(), CustodyError> {
        Ok(())
    }
}
