//! # Event bus for broadcasting pool events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that workers, the supervisor and
//! the pool manager can publish without ever blocking on a slow consumer.
//!
//! ```text
//! Publishers (many):                 Consumers:
//!   Worker 1  ──┐
//!   Worker N  ──┼──────► Bus ───────► subscriber listener ──► SubscriberSet
//!   Supervisor ─┤  (broadcast chan)   Pool::subscribe_events() receivers
//!   Pool       ─┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - A single ring buffer of `capacity` events is shared by all receivers.
//! - A receiver that falls behind gets `RecvError::Lagged(n)` and skips `n` events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pool events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
