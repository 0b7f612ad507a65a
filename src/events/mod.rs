//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the pool, its supervisor, its
//! workers and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Pool` (submit/shutdown), `Supervisor`, workers,
//!   `runner::run_once`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the pool's subscriber listener (fans out to `SubscriberSet`)
//!   and anyone holding [`Pool::subscribe_events`](crate::Pool::subscribe_events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
