//! Pari-mutuel ledger (deterministic)
//!
//! Everything here is a pure state machine over in-memory data. There is no
//! I/O, no clock in any hashed state, and every map is a `BTreeMap`, so the
//! same operation sequence always yields the same registry digest.
//!
//! - `account`: participant identifiers
//! - `bet`: the bet record and its read-only views
//! - `registry`: append-only bet storage with sequential ids
//! - `engine`: create / place / resolve transitions
//! - `payout`: proportional reward computation and isolated transfers
//! - `custody`: value custody seam and the in-memory escrow
//! - `events`: lifecycle notifications and sinks
//! - `journal`: operation log with hash-checked replay

pub mod account;
pub mod bet;
pub mod custody;
pub mod engine;
pub mod error;
pub mod events;
pub mod journal;
pub mod payout;
pub mod registry;

pub use account::AccountId;
pub use bet::{Bet, BetId, BetStatus, BetView, OptionIndex, OptionInfo, StakeEntry, UserBet};
pub use custody::{CustodyError, Escrow, ReplayCustody, ValueCustody};
pub use engine::{BetLifecycleEngine, Placement};
pub use error::{LedgerError, LedgerResult};
pub use events::{BroadcastSink, EventBus, EventSink, LedgerEvent, LedgerEventData};
pub use journal::{Journal, JournalEntry, JournalError, LedgerOp};
pub use payout::{PayoutOutcome, PayoutPlan, PayoutRecord, PayoutReport};
pub use registry::BetRegistry;
