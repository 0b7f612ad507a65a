//! # LogWriter: renders pool events through `tracing`
//!
//! A subscriber that turns every [`Event`] into one structured `tracing` record.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  poolvisor: task starting task=task-3 worker=worker-1 attempt=0
//! WARN  poolvisor: task failed task=task-3 worker=worker-1 attempt=0 reason="execution failed: boom"
//! INFO  poolvisor: retry scheduled task=task-3 delay_ms=50
//! ERROR poolvisor: worker crashed worker=worker-1 task=task-4 reason="aborted"
//! ERROR poolvisor: pool degraded reason="4 crashes within 60s"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.map(|t| t.to_string()).unwrap_or_default();
        let worker = e.worker.map(|w| w.to_string()).unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TaskSubmitted => debug!(target: "poolvisor", %task, "task submitted"),
            EventKind::TaskStarting => {
                info!(target: "poolvisor", %task, %worker, attempt = ?e.attempt, "task starting")
            }
            EventKind::TaskCompleted => {
                info!(target: "poolvisor", %task, %worker, attempt = ?e.attempt, "task completed")
            }
            EventKind::TaskFailed => {
                warn!(target: "poolvisor", %task, %worker, attempt = ?e.attempt, reason, "task failed")
            }
            EventKind::TimeoutHit => {
                warn!(target: "poolvisor", %task, %worker, timeout_ms = ?e.timeout_ms, "task timeout")
            }
            EventKind::RetryScheduled => {
                info!(target: "poolvisor", %task, delay_ms = ?e.delay_ms, attempt = ?e.attempt, "retry scheduled")
            }
            EventKind::TaskExhausted => {
                warn!(target: "poolvisor", %task, attempt = ?e.attempt, reason, "task resolved with error")
            }
            EventKind::WorkerSpawned => {
                debug!(target: "poolvisor", %worker, delay_ms = ?e.delay_ms, "worker spawned")
            }
            EventKind::WorkerCrashed => {
                error!(target: "poolvisor", %worker, %task, reason, "worker crashed")
            }
            EventKind::WorkerStalled => {
                error!(target: "poolvisor", %worker, %task, timeout_ms = ?e.timeout_ms, "worker stalled")
            }
            EventKind::WorkerRetired => warn!(target: "poolvisor", %worker, "worker retired"),
            EventKind::PoolDegraded => error!(target: "poolvisor", reason, "pool degraded"),
            EventKind::PoolRecovered => info!(target: "poolvisor", "pool recovered"),
            EventKind::ShutdownRequested => info!(target: "poolvisor", "shutdown requested"),
            EventKind::AllDrainedWithin => info!(target: "poolvisor", "all drained within grace"),
            EventKind::GraceExceeded => error!(target: "poolvisor", reason, "grace exceeded"),
            EventKind::SubscriberOverflow => warn!(target: "poolvisor", reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => error!(target: "poolvisor", reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
