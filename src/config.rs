//! Ledger Configuration
//!
//! Read from the environment at startup. The bet authority has no default:
//! a ledger without a configured authority refuses to start.

use thiserror::Error;

use crate::ledger::account::AccountId;

/// Default per-subscriber event buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither authority variable is set.
    #[error("MULTIBET_AUTHORITY or MULTIBET_AUTHORITY_SUB must be set")]
    MissingAuthority,

    /// A variable is set but unparseable.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Ledger configuration.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// The only principal allowed to create and resolve bets.
    pub authority: AccountId,
    /// Record every mutation in a replayable journal.
    pub record_journal: bool,
    /// Events buffered per subscriber before slow readers lag.
    pub event_capacity: usize,
}

impl LedgerConfig {
    /// Configuration with the given authority and defaults elsewhere.
    pub fn new(authority: AccountId) -> Self {
        Self {
            authority,
            record_journal: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Create config from environment variables.
    ///
    /// `MULTIBET_AUTHORITY` takes a UUID or 32-hex account id;
    /// `MULTIBET_AUTHORITY_SUB` takes an auth subject and derives the id the
    /// same way authenticated participants are derived.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let authority = match (lookup("MULTIBET_AUTHORITY"), lookup("MULTIBET_AUTHORITY_SUB")) {
            (Some(raw), _) => AccountId::parse(raw.trim()).ok_or(ConfigError::InvalidValue {
                name: "MULTIBET_AUTHORITY",
                value: raw,
            })?,
            (None, Some(sub)) if !sub.is_empty() => AccountId::from_subject(&sub),
            _ => return Err(ConfigError::MissingAuthority),
        };

        let record_journal = lookup("MULTIBET_RECORD_JOURNAL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let event_capacity = match lookup("MULTIBET_EVENT_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "MULTIBET_EVENT_CAPACITY",
                    value: raw,
                })?,
            None => DEFAULT_EVENT_CAPACITY,
        };

        Ok(Self {
            authority,
            record_journal,
            event_capacity,
        })
    }
}
