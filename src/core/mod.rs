//! Runtime core: queue, workers, supervision and lifecycle.
//!
//! The only public API from this module is [`Pool`] (with its builder, stats and
//! worker records). Everything else runs behind it.
//!
//! Internal modules:
//! - [`queue`]: bounded FIFO with hand-off admission;
//! - [`registry`]: one record per worker slot, plus in-flight jobs;
//! - [`runner`]: executes one attempt with timeout, panic isolation and event publishing;
//! - [`worker`]: pulls jobs and retries failed attempts in place;
//! - [`supervisor`]: owns the workers, respawns crashed ones within the crash budget;
//! - [`shutdown`]: graceful drain with a hard deadline, OS signal handling;
//! - [`shared`]: state shared by all of the above.

mod builder;
mod pool;
mod queue;
mod registry;
mod runner;
mod shared;
mod shutdown;
mod supervisor;
mod worker;

pub use builder::PoolBuilder;
pub use pool::{Pool, PoolState, PoolStats};
pub use registry::{WorkerRecord, WorkerState};

pub(crate) use runner::panic_message;
