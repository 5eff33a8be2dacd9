//! Network Layer
//!
//! WebSocket front end for the ledger.
//! This layer is **non-deterministic**: all accounting runs through `ledger/`,
//! serialized by the lock in `service`.

pub mod auth;
pub mod protocol;
pub mod server;
pub mod service;

pub use auth::{AuthConfig, Authenticator, AuthError, Identity, Role, TokenClaims};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode, ServerError};
pub use server::{LedgerServer, ServerConfig, LedgerServerError};
pub use service::LedgerService;
