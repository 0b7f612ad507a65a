//! # Runtime events emitted by the pool, supervisor and workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Task events**: submission and execution flow (starting, completed, failed, timeout, retry)
//! - **Worker events**: spawn, crash, stall, respawn, retirement
//! - **Pool events**: degradation, recovery, shutdown
//! - **Subscriber events**: overflow and panics of event subscribers
//!
//! The [`Event`] struct carries metadata such as timestamps, task/worker ids,
//! attempts, delays and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use poolvisor::{Event, EventKind, TaskId};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task(TaskId::new(7))
//!     .with_reason("boom")
//!     .with_attempt(2)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task, Some(TaskId::new(7)));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::jobs::{TaskId, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (`subscriber=<name> info=<panic>`).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (`subscriber=<name> reason=full|closed`).
    SubscriberOverflow,

    // === Task events ===
    /// Task accepted into the queue.
    ///
    /// Sets: `task`.
    TaskSubmitted,

    /// A worker is starting an attempt.
    ///
    /// Sets: `task`, `worker`, `attempt` (0-based).
    TaskStarting,

    /// Attempt succeeded; the task is resolved.
    ///
    /// Sets: `task`, `worker`, `attempt`.
    TaskCompleted,

    /// Attempt failed.
    ///
    /// Sets: `task`, `worker`, `attempt`, `reason`.
    TaskFailed,

    /// Attempt exceeded its timeout (followed by `TaskFailed`).
    ///
    /// Sets: `task`, `worker`, `attempt`, `timeout_ms`.
    TimeoutHit,

    /// Another attempt is scheduled on the same worker.
    ///
    /// Sets: `task`, `worker`, `attempt` (the failed one), `delay_ms`, `reason`.
    RetryScheduled,

    /// Task resolved with a terminal error.
    ///
    /// Sets: `task`, optional `worker`, `attempt`, `reason` (error label).
    TaskExhausted,

    // === Worker events ===
    /// Worker task spawned into a slot.
    ///
    /// Sets: `worker`, optional `delay_ms` (respawn backoff).
    WorkerSpawned,

    /// Worker task terminated abnormally.
    ///
    /// Sets: `worker`, optional `task` (in-flight), `reason`.
    WorkerCrashed,

    /// Worker stayed busy past the task timeout without yielding; it is being aborted.
    ///
    /// Sets: `worker`, `task`, `timeout_ms`.
    WorkerStalled,

    /// Worker slot left empty because the crash budget is exhausted.
    ///
    /// Sets: `worker`.
    WorkerRetired,

    // === Pool events ===
    /// Crash budget exceeded; the pool stopped respawning.
    ///
    /// Sets: `reason`.
    PoolDegraded,

    /// Operator restarted a degraded pool.
    PoolRecovered,

    /// Shutdown requested (API call or OS signal).
    ShutdownRequested,

    /// Every worker exited within the shutdown grace.
    AllDrainedWithin,

    /// Shutdown grace exceeded; stragglers were force-terminated.
    ///
    /// Sets: `reason` (stuck tasks).
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields depend on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task the event is about, if any.
    pub task: Option<TaskId>,
    /// Worker the event is about, if any.
    pub worker: Option<WorkerId>,
    /// Attempt number (0-based).
    pub attempt: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            worker: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Attaches a worker id.
    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// Timeout as a [`Duration`], if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Delay as a [`Duration`], if set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
