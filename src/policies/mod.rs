//! Respawn, retry and crash-budget policies.
//!
//! This module groups the knobs that control **how long** to wait before a
//! replacement worker or a retried task starts, and **when** the pool stops
//! self-healing.
//!
//! ## Contents
//! - [`BackoffPolicy`]  how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]   randomization strategy to avoid synchronized respawns
//! - [`CrashBudget`]    sliding-window crash counter (circuit breaker)
//!
//! ## Quick wiring
//! ```text
//! PoolConfig { respawn_backoff, retry_backoff, crash_budget, crash_window }
//!      ├─► core::supervisor uses:
//!      │     - CrashBudget::record(now) to decide respawn vs. degrade
//!      │     - respawn_backoff.next(consecutive_crashes - 1) to delay the replacement
//!      └─► core::worker uses:
//!            - retry_backoff.next(attempt) between attempts of a failing task
//! ```

mod backoff;
mod crash_budget;
mod jitter;

pub use backoff::BackoffPolicy;
pub use crash_budget::CrashBudget;
pub use jitter::JitterPolicy;
