//! # Run a single attempt of a job.
//!
//! Executes one handler attempt with an optional timeout, isolating panics, and
//! publishes lifecycle events to the [`Bus`].
//!
//! ## Event flow
//! ```text
//! Success:  handler.call() → Ok(v)          → TaskCompleted
//! Failure:  handler.call() → Err(e)         → TaskFailed
//! Panic:    handler.call() or its future panics → TaskFailed (Panicked)
//! Timeout:  timeout elapsed → cancel child  → TimeoutHit → TaskFailed (Timeout)
//! ```
//!
//! ## Rules
//! - Publishes **exactly one** of `TaskCompleted` / `TaskFailed` per attempt.
//! - A handler panic never escapes: it is a task failure, not a worker crash.
//! - Each attempt gets a **child token**; cancelling it does not touch the parent.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::TaskError,
    events::{Bus, Event, EventKind},
    jobs::{Handler, TaskId, WorkerId},
};

/// Identifies the attempt for event publishing.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AttemptCtx {
    pub task: TaskId,
    pub worker: WorkerId,
    pub attempt: u32,
}

/// Executes a single attempt of `handler` on `payload`.
///
/// ### Timeout behavior
/// With `Some(dur)` the attempt is wrapped in `tokio::time::timeout`; on expiry the
/// child token is cancelled, `TimeoutHit` is published and `TaskError::Timeout` returned.
/// A zero duration times out immediately.
pub(crate) async fn run_once<P: 'static, R: 'static>(
    handler: &dyn Handler<P, R>,
    payload: P,
    parent: &CancellationToken,
    timeout: Option<Duration>,
    at: AttemptCtx,
    bus: &Bus,
) -> Result<R, TaskError> {
    let child = parent.child_token();
    let ctx = child.clone();
    // `call` itself runs inside the guard so a panic while building the future is caught too.
    let fut = AssertUnwindSafe(async move { handler.call(payload, ctx).await }).catch_unwind();

    let res = match timeout {
        Some(dur) => match time::timeout(dur, fut).await {
            Ok(r) => flatten(r),
            Err(_elapsed) => {
                child.cancel();
                bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_task(at.task)
                        .with_worker(at.worker)
                        .with_attempt(at.attempt)
                        .with_timeout(dur),
                );
                Err(TaskError::Timeout { timeout: dur })
            }
        },
        None => flatten(fut.await),
    };

    match &res {
        Ok(_) => bus.publish(
            Event::new(EventKind::TaskCompleted)
                .with_task(at.task)
                .with_worker(at.worker)
                .with_attempt(at.attempt),
        ),
        Err(e) => bus.publish(
            Event::new(EventKind::TaskFailed)
                .with_task(at.task)
                .with_worker(at.worker)
                .with_attempt(at.attempt)
                .with_reason(e.to_string()),
        ),
    }
    res
}

fn flatten<R>(
    caught: Result<Result<R, TaskError>, Box<dyn Any + Send>>,
) -> Result<R, TaskError> {
    caught.unwrap_or_else(|panic| {
        Err(TaskError::Panicked {
            info: panic_message(panic.as_ref()),
        })
    })
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
