//! # Shutdown: graceful drain with a hard deadline, plus OS signal handling.
//!
//! ```text
//! drain(grace):
//!   state → Draining ─► ShutdownRequested
//!   queue.close()            (new submits fail, waiting jobs still run)
//!   wait(finished, grace)
//!     ├─ in time  → AllDrainedWithin → Ok
//!     └─ timeout  → resolve in-flight + queued with ShutdownTimeout
//!                   cancel runtime token, abort workers
//!                   GraceExceeded → Err(ShutdownTimeout { grace, stuck })
//!   state → Stopped
//! ```
//!
//! ## Signals
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Elsewhere:** Ctrl-C.

use tokio::time::{self, Duration};

use crate::{
    core::{pool::PoolState, shared::Shared},
    error::{JobError, PoolError},
    events::{Event, EventKind},
    jobs::TaskId,
};

/// How long a forced stop waits for aborted workers to be reaped.
const REAP_WAIT: Duration = Duration::from_millis(100);

/// Drains the pool, force-terminating whatever is left after `grace`.
pub(crate) async fn drain<P: Clone, R>(shared: &Shared<P, R>, grace: Duration) -> Result<(), PoolError> {
    *shared.state.write() = PoolState::Draining;
    shared
        .bus
        .publish(Event::new(EventKind::ShutdownRequested).with_timeout(grace));
    tracing::info!(?grace, "shutdown requested");

    shared.queue.close();
    shared.draining.cancel();

    let res = match time::timeout(grace, shared.finished.cancelled()).await {
        Ok(()) => {
            shared
                .bus
                .publish(Event::new(EventKind::AllDrainedWithin).with_timeout(grace));
            Ok(())
        }
        Err(_elapsed) => {
            let stuck = force_stop(shared).await;
            tracing::warn!(?grace, ?stuck, "shutdown grace exceeded, forced termination");
            shared.bus.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_timeout(grace)
                    .with_reason(format!("{stuck:?}")),
            );
            let err = PoolError::ShutdownTimeout { grace, stuck };
            *shared.fatal.lock() = Some(err.clone());
            Err(err)
        }
    };

    *shared.state.write() = PoolState::Stopped;
    res
}

/// Resolves every unfinished job with `ShutdownTimeout` and aborts the workers.
///
/// Returns the ids of the jobs it resolved, in submission order.
async fn force_stop<P: Clone, R>(shared: &Shared<P, R>) -> Vec<TaskId> {
    let mut stuck = Vec::new();
    // Queue first: a job popped in between is already tracked by its worker.
    let queued = shared.queue.drain();
    for job in queued.into_iter().chain(shared.registry.drain_in_flight()) {
        if job.resolve(Err(JobError::ShutdownTimeout)) {
            stuck.push(job.id);
        }
    }
    stuck.sort();
    stuck.dedup();

    shared.runtime_token.cancel();
    shared.registry.abort_all();
    let _ = time::timeout(REAP_WAIT, shared.finished.cancelled()).await;
    shared.registry.stop_all();
    stuck
}

/// Waits for a termination signal.
///
/// Returns `Err` if the signal handlers cannot be registered.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
        _ = sigquit.recv() => Ok(()),
    }
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        config::PoolConfig,
        error::TaskError,
        events::Bus,
        jobs::{HandlerFn, HandlerRef, Job, pending},
    };

    fn shared() -> Shared<u32, u32> {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("echo", |n: u32, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(n)
        });
        Shared::new(PoolConfig::with_size(1), handler, Bus::new(16))
    }

    #[tokio::test]
    async fn drained_in_time_when_supervisor_finishes() {
        let shared = shared();
        shared.finished.cancel();
        assert_eq!(drain(&shared, Duration::from_millis(50)).await, Ok(()));
        assert_eq!(shared.state(), PoolState::Stopped);
        assert!(shared.queue.is_closed());
    }

    fn job(id: u64) -> (Job<u32, u32>, crate::PendingResult<u32>) {
        let (completer, rx) = pending(TaskId::new(id));
        let job = Job {
            id: TaskId::new(id),
            payload: 1,
            submitted_at: time::Instant::now(),
            deadline: None,
            attempt: 0,
            max_attempts: 1,
            completer,
        };
        (job, rx)
    }

    #[tokio::test]
    async fn timeout_resolves_queued_jobs() {
        let shared = shared();
        let (job, rx) = job(7);
        assert!(shared.queue.push(job).is_ok());

        let err = drain(&shared, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(
            err,
            PoolError::ShutdownTimeout {
                grace: Duration::from_millis(20),
                stuck: vec![TaskId::new(7)],
            }
        );
        assert_eq!(rx.await, Err(JobError::ShutdownTimeout));
        assert!(shared.runtime_token.is_cancelled());
        assert_eq!(shared.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn stuck_lists_claimed_and_queued_jobs() {
        let shared = shared();
        let worker = crate::jobs::WorkerId::new(1);
        shared.registry.install(0, worker, None);
        let (queued, queued_rx) = job(3);
        let (claimed, claimed_rx) = job(2);
        assert!(shared.queue.push(claimed).is_ok());
        assert!(shared.queue.push(queued).is_ok());
        let popped = shared
            .queue
            .pop_claimed(|job| shared.registry.track(0, worker, job))
            .await;
        assert_eq!(popped.as_ref().map(|j| j.id), Some(TaskId::new(2)));

        let err = drain(&shared, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(
            err,
            PoolError::ShutdownTimeout {
                grace: Duration::from_millis(20),
                stuck: vec![TaskId::new(2), TaskId::new(3)],
            }
        );
        assert_eq!(claimed_rx.await, Err(JobError::ShutdownTimeout));
        assert_eq!(queued_rx.await, Err(JobError::ShutdownTimeout));
        drop(popped);
    }

    #[test]
    fn shared_is_usable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<Shared<String, Vec<u8>>>>();
    }
}
