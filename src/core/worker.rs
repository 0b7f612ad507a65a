//! # Worker: pulls jobs from the queue and runs them to a resolution.
//!
//! One worker is one tokio task owned by the supervisor's `JoinSet`.
//!
//! ## Loop
//! ```text
//! [respawn delay] → [initial job] → loop {
//!   ├─► Idle; pop() ─────────► None (closed & empty) → Drained
//!   │                  └─────► runtime token cancelled → Cancelled
//!   └─► execute(job):
//!         ├─► deadline passed?  → DeadlineExceeded
//!         ├─► Busy; TaskStarting; run_once()
//!         ├─► Ok               → resolve, reset crash counter
//!         ├─► retryable & left → RetryScheduled → sleep(retry_backoff) → again
//!         └─► otherwise        → Failed / TimedOut / DeadlineExceeded
//! }
//! ```
//!
//! ## Rules
//! - Attempts of one job run sequentially on the same worker.
//! - Handler errors and panics never end the worker; only an abort or a panic
//!   outside the handler does (a crash, seen by the supervisor).
//! - The registry tracks a job from the moment it leaves the queue until
//!   `execute` ends, so a crash or forced stop at any point can find it.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::{
    select,
    time::{self, Duration, Instant},
};

use crate::{
    core::{
        runner::{AttemptCtx, run_once},
        shared::Shared,
    },
    error::{JobError, TaskError},
    events::{Event, EventKind},
    jobs::{Job, WorkerId},
};

/// How a worker ended without crashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// The queue was closed and empty.
    Drained,
    /// The runtime token was cancelled (forced stop).
    Cancelled,
}

pub(crate) struct Worker<P, R> {
    pub id: WorkerId,
    pub slot: usize,
    pub shared: Arc<Shared<P, R>>,
}

impl<P, R> Worker<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Runs the worker until the queue drains or the pool is force-stopped.
    ///
    /// `delay` is the respawn backoff; `initial` is a job retried after the
    /// previous worker in this slot crashed.
    pub async fn run(self, initial: Option<Job<P, R>>, delay: Duration) -> WorkerExit {
        let token = self.shared.runtime_token.clone();

        if !delay.is_zero() {
            select! {
                _ = time::sleep(delay) => {}
                _ = token.cancelled() => return WorkerExit::Cancelled,
            }
        }
        if let Some(job) = initial {
            if self.execute(job).await.is_break() {
                return WorkerExit::Cancelled;
            }
        }

        loop {
            self.shared.registry.set_idle(self.slot, self.id);
            let next = select! {
                biased;
                _ = token.cancelled() => return WorkerExit::Cancelled,
                job = self.shared.queue.pop_claimed(|job| {
                    self.shared.registry.track(self.slot, self.id, job)
                }) => job,
            };
            let Some(job) = next else {
                return WorkerExit::Drained;
            };
            if self.execute(job).await.is_break() {
                return WorkerExit::Cancelled;
            }
        }
    }

    /// Runs every attempt of `job`. Breaks if the pool was force-stopped meanwhile.
    async fn execute(&self, mut job: Job<P, R>) -> ControlFlow<()> {
        let shared = &self.shared;
        let registry = &shared.registry;
        let token = &shared.runtime_token;
        registry.track(self.slot, self.id, &job);
        tracing::trace!(
            task = %job.id,
            worker = %self.id,
            waited = ?job.submitted_at.elapsed(),
            "job picked up"
        );

        let flow = loop {
            if job.is_resolved() {
                break ControlFlow::Continue(());
            }
            let now = Instant::now();
            if job.is_expired(now) {
                shared.exhaust(&job, Some(self.id), JobError::DeadlineExceeded);
                break ControlFlow::Continue(());
            }

            registry.set_busy(self.slot, self.id, job.id, now);
            shared.bus.publish(
                Event::new(EventKind::TaskStarting)
                    .with_task(job.id)
                    .with_worker(self.id)
                    .with_attempt(job.attempt),
            );

            let at = AttemptCtx {
                task: job.id,
                worker: self.id,
                attempt: job.attempt,
            };
            let timeout = job.attempt_timeout(shared.cfg.timeout(), now);
            let res = run_once(
                shared.handler.as_ref(),
                job.payload.clone(),
                token,
                timeout,
                at,
                &shared.bus,
            )
            .await;

            let err = match res {
                Ok(value) => {
                    job.resolve(Ok(value));
                    registry.reset_crashes(self.slot, self.id);
                    break ControlFlow::Continue(());
                }
                Err(err) => err,
            };

            if token.is_cancelled() {
                break ControlFlow::Break(());
            }
            if job.is_expired(Instant::now()) {
                shared.exhaust(&job, Some(self.id), JobError::DeadlineExceeded);
                break ControlFlow::Continue(());
            }
            if !err.is_retryable() || !job.has_attempts_left() {
                let attempts = job.attempts();
                shared.exhaust(&job, Some(self.id), JobError::from_final(err, attempts));
                break ControlFlow::Continue(());
            }

            if self.backoff(&mut job, &err).await.is_break() {
                break ControlFlow::Break(());
            }
        };

        registry.untrack(self.slot, self.id);
        flow
    }

    /// Schedules the next attempt of `job` and waits out the retry delay.
    async fn backoff(&self, job: &mut Job<P, R>, err: &TaskError) -> ControlFlow<()> {
        let shared = &self.shared;
        let delay = shared.cfg.retry_backoff.next(job.attempt);
        shared.bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_task(job.id)
                .with_worker(self.id)
                .with_attempt(job.attempt)
                .with_delay(delay)
                .with_reason(err.to_string()),
        );

        job.attempt += 1;
        shared.registry.track(self.slot, self.id, job);
        shared.registry.set_waiting(self.slot, self.id, job.id);

        select! {
            _ = time::sleep(delay) => ControlFlow::Continue(()),
            _ = shared.runtime_token.cancelled() => ControlFlow::Break(()),
        }
    }
}
