//! Ledger Events
//!
//! Lifecycle notifications emitted as state transitions are applied.
//! Every event carries a sequence number; sinks observe events in the order
//! the corresponding transitions were committed.

use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;

use crate::core::amount::{decimal_amount, Amount};
use crate::ledger::account::AccountId;
use crate::ledger::bet::BetId;

/// Ledger event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventData {
    /// A bet was opened.
    BetCreated {
        /// New bet id.
        bet_id: BetId,
        /// What the bet is about.
        topic: String,
        /// Option labels in index order.
        options: Vec<String>,
    },

    /// Value was placed on an option.
    BetPlaced {
        /// Target bet.
        bet_id: BetId,
        /// Who placed the value.
        participant: AccountId,
        /// Value placed.
        #[serde(with = "decimal_amount")]
        amount: Amount,
        /// Chosen label.
        option: String,
    },

    /// The authority declared a winner.
    BetResolved {
        /// Resolved bet.
        bet_id: BetId,
        /// Declared winner.
        winning_option: String,
    },
}

/// A ledger event with its position in the commit order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Monotonic sequence number, starting at 0.
    pub sequence: u64,

    /// Event data
    pub data: LedgerEventData,
}

impl LedgerEvent {
    /// Bet this event concerns.
    pub fn bet_id(&self) -> BetId {
        match &self.data {
            LedgerEventData::BetCreated { bet_id, .. }
            | LedgerEventData::BetPlaced { bet_id, .. }
            | LedgerEventData::BetResolved { bet_id, .. } => *bet_id,
        }
    }

    /// Account involved, if any.
    pub fn participant(&self) -> Option<AccountId> {
        match &self.data {
            LedgerEventData::BetPlaced { participant, .. } => Some(*participant),
            _ => None,
        }
    }
}

// =============================================================================
// SINKS
// =============================================================================

/// Receiver of ledger notifications.
///
/// Injected into the engine so delivery can be swapped (channel, log,
/// in-memory capture for tests).
pub trait EventSink {
    /// Deliver one event. Must not fail the transition that produced it.
    fn emit(&mut self, event: LedgerEvent);
}

impl EventSink for Vec<LedgerEvent> {
    fn emit(&mut self, event: LedgerEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: LedgerEvent) {
        (**self).emit(event);
    }
}

/// Fan-out sink backed by a tokio broadcast channel.
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Clone, Debug)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LedgerEvent>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: LedgerEvent) {
        // Err only means there are no receivers right now.
        let _ = self.tx.send(event);
    }
}

/// Sink wrapper that stamps sequence numbers.
#[derive(Debug)]
pub struct EventBus<S> {
    sink: S,
    next_sequence: u64,
}

impl<S: EventSink> EventBus<S> {
    /// Wrap a sink; numbering starts at 0.
    pub fn new(sink: S) -> Self {
        Self { sink, next_sequence: 0 }
    }

    /// Stamp and deliver an event, returning its sequence number.
    pub fn publish(&mut self, data: LedgerEventData) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.sink.emit(LedgerEvent { sequence, data });
        sequence
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.next_sequence
    }

    /// Borrow the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
