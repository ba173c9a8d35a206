//! Fire-and-forget change broadcaster
//!
//! Wraps a `tokio::sync::broadcast` channel: every subscriber sees
//! every event emitted after it subscribed. Emission is synchronous,
//! non-blocking, and infallible by contract; the emitter never learns
//! whether anyone was listening.

use crate::{
    error::Error,
    event::ChangeEvent,
    metrics::{EVENTS_DROPPED_TOTAL, EVENTS_EMITTED_TOTAL},
    types::{ChangeKind, ChangePayload},
};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity before lagging subscribers start losing events
pub const DEFAULT_CAPACITY: usize = 1024;

/// Change broadcaster
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Broadcaster {
    /// Create broadcaster with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create broadcaster with explicit channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all change events
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Emit a customer change
    pub fn emit_customer(&self, kind: ChangeKind, customer: serde_json::Value) {
        self.emit(ChangePayload::CustomerChanged { kind, customer });
    }

    /// Emit a transaction change with the freshly recalculated balance
    pub fn emit_transaction(
        &self,
        kind: ChangeKind,
        transaction: serde_json::Value,
        balance: Decimal,
    ) {
        self.emit(ChangePayload::TransactionChanged {
            kind,
            transaction,
            balance,
        });
    }

    /// Signal that aggregate dashboard stats changed
    pub fn emit_stats(&self) {
        self.emit(ChangePayload::StatsChanged);
    }

    /// Emit an event to all subscribers (fire-and-forget)
    pub fn emit(&self, payload: ChangePayload) {
        let channel = payload.channel();
        let event = ChangeEvent::new(payload);

        trace!(subject = %event.subject(), event_id = %event.id, "Emitting change event");

        match self.sender.send(event) {
            Ok(receivers) => {
                EVENTS_EMITTED_TOTAL.with_label_values(&[channel]).inc();
                debug!(channel, receivers, "Change event delivered");
            }
            Err(_) => {
                // No subscribers connected; by contract this is not an error
                EVENTS_DROPPED_TOTAL.with_label_values(&[channel]).inc();
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription handle for receiving change events
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Receive the next event
    ///
    /// Returns `Error::Lagged` when this subscriber fell behind and
    /// events were discarded; the subscription remains usable.
    pub async fn recv(&mut self) -> crate::Result<ChangeEvent> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(Error::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(Error::Closed),
        }
    }

    /// Receive without waiting; `None` when nothing is pending
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }
}
