//! # Event subscribers.
//!
//! [`Subscribe`] is the extension point for observing a pool: logging, metrics,
//! alerting. [`SubscriberSet`] drives each subscriber from its own bounded queue
//! so a slow or panicking subscriber never stalls workers or other subscribers.
//!
//! ```text
//! Worker ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                    ├─► [queue] ─► LogWriter
//!                                                    ├─► [queue] ─► Metrics
//!                                                    └─► [queue] ─► ...
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
