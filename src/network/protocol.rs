//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON objects tagged by `"type"`. Binary frames carry the
//! same JSON payload as raw bytes.
//!
//! Amounts sent by clients may be JSON numbers or decimal strings; values
//! above `u64::MAX` must use the string form. Every amount the server sends,
//! including those inside events, bet views and payout reports, is a decimal
//! string. Account ids go out as UUID strings.

use serde::{Serialize, Deserialize};

use crate::core::amount::{decimal_amount, Amount};
use crate::ledger::account::AccountId;
use crate::ledger::bet::{BetId, BetView, OptionIndex, OptionInfo, UserBet};
use crate::ledger::error::LedgerError;
use crate::ledger::events::LedgerEvent;
use crate::ledger::payout::PayoutReport;
use crate::network::auth::AuthError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Open a bet (authority only).
    CreateBet {
        /// What the bet is about.
        topic: String,
        /// Option labels in index order.
        options: Vec<String>,
    },

    /// Place value on an option.
    PlaceBet {
        /// Target bet.
        bet_id: BetId,
        /// Chosen label (exact match).
        option: String,
        /// Value to place.
        #[serde(with = "decimal_amount")]
        amount: Amount,
    },

    /// Declare the winner (authority only).
    ResolveBet {
        /// Target bet.
        bet_id: BetId,
        /// Winning label.
        winning_option: String,
    },

    /// Full bet record.
    GetBet {
        /// Target bet.
        bet_id: BetId,
    },

    /// Options, totals and pot.
    GetOptionInfo {
        /// Target bet.
        bet_id: BetId,
    },

    /// One participant's stakes. Defaults to the caller.
    GetUserBet {
        /// Target bet.
        bet_id: BetId,
        /// Account (UUID or hex); the authenticated caller if omitted.
        #[serde(default)]
        participant: Option<String>,
    },

    /// Number of bets created.
    BetCount,

    /// Credit a wallet (authority only).
    Fund {
        /// Account to credit (UUID or hex).
        account: String,
        /// Value to credit.
        #[serde(with = "decimal_amount")]
        amount: Amount,
    },

    /// Spendable wallet balance. Defaults to the caller.
    Balance {
        /// Account (UUID or hex); the authenticated caller if omitted.
        #[serde(default)]
        account: Option<String>,
    },

    /// Start receiving ledger events.
    Subscribe,

    /// Stop receiving ledger events.
    Unsubscribe,

    /// Current registry digest.
    StateHash,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
///
/// With JWT validation configured, `token` is required and `account_id` is
/// ignored. Without it, `account_id` is taken as declared, except that the
/// authority id is refused outside development mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Requested account (UUID or 32-char hex).
    #[serde(default)]
    pub account_id: Option<String>,
    /// Identity provider token.
    #[serde(default)]
    pub token: Option<String>,
    /// Client version, logged only.
    #[serde(default)]
    pub client_version: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Bet opened.
    BetCreated {
        /// New bet id.
        bet_id: BetId,
    },

    /// Placement accepted.
    BetPlaced(PlacementInfo),

    /// Resolution committed, with per-winner payout results.
    BetResolved(PayoutReport),

    /// Full bet record.
    Bet(BetView),

    /// Options, totals and pot.
    OptionInfo {
        /// Target bet.
        bet_id: BetId,
        /// Query result.
        info: OptionInfo,
    },

    /// One participant's stakes.
    UserBet {
        /// Target bet.
        bet_id: BetId,
        /// Participant queried.
        participant: AccountId,
        /// Query result.
        user_bet: UserBet,
    },

    /// Number of bets.
    BetCount {
        /// Bets created so far.
        count: usize,
    },

    /// Wallet balance.
    Balance {
        /// Account queried.
        account: AccountId,
        /// Spendable balance.
        #[serde(with = "decimal_amount")]
        balance: Amount,
    },

    /// Subscription state changed.
    Subscription {
        /// Whether events are now forwarded.
        active: bool,
    },

    /// Forwarded ledger event.
    Event(LedgerEvent),

    /// Registry digest.
    StateHash {
        /// Hex-encoded SHA-256.
        hash: String,
        /// Bets covered by the digest.
        bet_count: usize,
    },

    /// Pong response.
    Pong {
        /// Client timestamp.
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Account the connection now acts as.
    pub account_id: Option<AccountId>,
    /// Whether that account is the bet authority.
    pub is_authority: bool,
    /// Why auth failed.
    pub error: Option<ServerError>,
    /// Server version.
    pub server_version: String,
}

/// Accepted placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementInfo {
    /// Target bet.
    pub bet_id: BetId,
    /// Chosen option index.
    pub option_index: OptionIndex,
    /// Option total afterwards.
    #[serde(with = "decimal_amount")]
    pub option_total: Amount,
    /// Pot afterwards.
    #[serde(with = "decimal_amount")]
    pub total_pot: Amount,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&LedgerError> for ServerError {
    fn from(err: &LedgerError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

impl From<&AuthError> for ServerError {
    fn from(err: &AuthError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Malformed message or argument.
    InvalidInput,
    /// Caller is not the bet authority.
    Unauthorized,
    /// Unknown bet id.
    BetNotFound,
    /// Bet already resolved.
    AlreadyResolved,
    /// Unknown option label.
    InvalidOption,
    /// Zero amount.
    InvalidAmount,
    /// Totals would overflow.
    ArithmeticOverflow,
    /// Custody refused the stake.
    DepositRejected,
    /// A payout transfer failed.
    TransferFailed,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&LedgerError> for ErrorCode {
    fn from(err: &LedgerError) -> Self {
        match err {
            LedgerError::InvalidArgument(_) => ErrorCode::InvalidInput,
            LedgerError::NotFound(_) => ErrorCode::BetNotFound,
            LedgerError::AlreadyResolved(_) => ErrorCode::AlreadyResolved,
            LedgerError::InvalidOption { .. } => ErrorCode::InvalidOption,
            LedgerError::InvalidAmount => ErrorCode::InvalidAmount,
            LedgerError::Unauthorized { .. } => ErrorCode::Unauthorized,
            LedgerError::ArithmeticOverflow(_) => ErrorCode::ArithmeticOverflow,
            LedgerError::DepositRejected(_) => ErrorCode::DepositRejected,
            LedgerError::TransferFailed { .. } => ErrorCode::TransferFailed,
        }
    }
}

impl From<&AuthError> for ErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::InvalidSignature
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::MissingClaim(_)
            | AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::AuthorityRequiresToken | AuthError::RoleMismatch(_) => ErrorCode::Unauthorized,
            AuthError::NotConfigured
            | AuthError::TokenRequired
            | AuthError::AccountRequired
            | AuthError::InvalidAccount(_)
            | AuthError::InvalidKey(_) => ErrorCode::AuthFailed,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame holding JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Does this message change ledger state?
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ClientMessage::CreateBet { .. }
                | ClientMessage::PlaceBet { .. }
                | ClientMessage::ResolveBet { .. }
                | ClientMessage::Fund { .. }
        )
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}
