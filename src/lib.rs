//! # poolvisor
//!
//! **Poolvisor** is a bounded worker pool for async Rust with crash supervision
//! and graceful shutdown.
//!
//! Callers submit payloads; a fixed set of workers runs a caller-supplied
//! [`Handler`] on them. The pool applies backpressure when its queue is full,
//! retries failed attempts, replaces crashed workers within a crash budget and
//! drains on shutdown. Every submitted task resolves exactly once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller ── submit(payload, deadline) ──► Pool ──► PendingResult<R>
//!                                            │
//!                                            ▼
//!                               ┌──────────────────────────┐
//!                               │ JobQueue (bounded, FIFO) │── QueueFull
//!                               └────────────┬─────────────┘
//!                  ┌─────────────────────────┼─────────────────────────┐
//!                  ▼                         ▼                         ▼
//!           ┌────────────┐            ┌────────────┐            ┌────────────┐
//!           │  Worker 0  │            │  Worker 1  │    ...     │ Worker N-1 │
//!           │ run_once() │            │ run_once() │            │ run_once() │
//!           └─────┬──────┘            └─────┬──────┘            └─────┬──────┘
//!                 │ exit / crash            │                         │
//!                 ▼                         ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │ Supervisor (JoinSet owner)                                                │
//! │  - Registry (WorkerRecord per slot, in-flight jobs)                       │
//! │  - CrashBudget (sliding window) → respawn with backoff or degrade         │
//! │  - stall watchdog                                                         │
//! └───────────────────────────────────────────────────────────────────────────┘
//!
//!   every step ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                 ├─► LogWriter
//!                                                                 └─► your Subscribe impls
//! ```
//!
//! ### Task lifecycle
//! ```text
//! submit ─► TaskSubmitted ─► queue ─► worker pops
//!   loop {
//!     ├─► deadline passed?       ─► DeadlineExceeded
//!     ├─► TaskStarting{attempt}
//!     ├─► run_once (timeout, catch_unwind)
//!     │     ├─ Ok  ─► TaskCompleted ─► resolve Ok
//!     │     └─ Err ─► TaskFailed
//!     │           ├─ retryable & attempts left ─► RetryScheduled ─► sleep ─► again
//!     │           └─ otherwise                 ─► TaskExhausted ─► resolve Err
//!     └─► worker crash ─► supervisor retries the job on the replacement worker
//!   }
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                          |
//! |-------------------|---------------------------------------------------------|---------------------------------------------|
//! | **Pool**          | Submit work, observe, recover, shut down.               | [`Pool`], [`PoolBuilder`], [`PoolStats`]    |
//! | **Handlers**      | The work itself, as a trait or a closure.               | [`Handler`], [`HandlerFn`], [`HandlerRef`]  |
//! | **Results**       | One resolution per task.                                | [`PendingResult`], [`JobError`]             |
//! | **Policies**      | Respawn/retry delays and the crash budget.              | [`BackoffPolicy`], [`JitterPolicy`], [`CrashBudget`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics).          | [`Subscribe`], [`Event`], [`EventKind`]     |
//! | **Configuration** | Immutable pool settings.                                | [`PoolConfig`]                              |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{HandlerFn, HandlerRef, Pool, PoolConfig, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = PoolConfig::with_size(4);
//!     cfg.task_timeout = Duration::from_secs(5);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn poolvisor::Subscribe>> = vec![Arc::new(poolvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn poolvisor::Subscribe>> = Vec::new();
//!
//!     let handler: HandlerRef<u64, u64> = HandlerFn::arc("square", |n: u64, _ctx: CancellationToken| async move {
//!         Ok::<_, TaskError>(n * n)
//!     });
//!     let pool = Pool::builder(cfg, handler).with_subscribers(subs).build()?;
//!
//!     let results: Vec<_> = (1..=3).map(|n| pool.submit(n, None)).collect::<Result<_, _>>()?;
//!     for pending in results {
//!         println!("{}", pending.await?);
//!     }
//!
//!     pool.shutdown(None).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod jobs;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use config::PoolConfig;
pub use core::{Pool, PoolBuilder, PoolState, PoolStats, WorkerRecord, WorkerState};
pub use error::{JobError, PoolError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{BoxJobFuture, Handler, HandlerFn, HandlerRef, PendingResult, TaskId, WorkerId};
pub use policies::{BackoffPolicy, CrashBudget, JitterPolicy};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
