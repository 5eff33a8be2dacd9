//! # MultiBet Ledger
//!
//! Pari-mutuel betting ledger: an authority opens bets with two or more
//! named options, participants place value on options, and on resolution the
//! whole pot is split among the winning option's backers in proportion to
//! their stake.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MULTIBET LEDGER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── amount.rs   - u128 amounts, exact mul-div               │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  ledger/         - Accounting (deterministic)                │
//! │  ├── bet.rs      - Bet record and query views                │
//! │  ├── registry.rs - Append-only bet storage                   │
//! │  ├── engine.rs   - Create / place / resolve transitions      │
//! │  ├── payout.rs   - Proportional payout                       │
//! │  ├── custody.rs  - Value custody seam and escrow             │
//! │  ├── events.rs   - Lifecycle notifications                   │
//! │  └── journal.rs  - Operation log and replay                  │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── service.rs  - Lock-serialized shared ledger             │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT validation                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `ledger/` modules are deterministic:
//! - Integer amounts only, no floating point
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time in hashed state
//!
//! The same operation sequence always produces the same registry digest,
//! which is what journal replay checks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod ledger;
pub mod network;

// Re-export commonly used types
pub use crate::config::{ConfigError, LedgerConfig};
pub use crate::core::amount::{Amount, AMOUNT_ZERO};
pub use crate::core::hash::StateHash;
pub use crate::ledger::{
    AccountId, Bet, BetId, BetLifecycleEngine, Escrow, EventSink, LedgerError, LedgerEvent,
    LedgerResult, PayoutReport, ValueCustody,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
