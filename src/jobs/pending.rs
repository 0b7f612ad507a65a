//! # Pending results: one resolution per task.
//!
//! [`pending`] creates the two halves for a task:
//! - [`Completer`]: cloneable, held by the queue/worker/registry; the **first**
//!   `resolve` wins, later calls are no-ops.
//! - [`PendingResult`]: the caller's future.
//!
//! ```text
//! Completer (worker) ─┐
//! Completer (registry)┼──► oneshot ──► PendingResult (caller)
//! Completer (shutdown)┘   first resolve wins
//! ```
//!
//! If every `Completer` clone is dropped without resolving, the task resolves
//! with [`JobError::Abandoned`], so a caller never waits on a task the pool forgot.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::JobError;
use crate::jobs::job::TaskId;

type Outcome<R> = Result<R, JobError>;

/// Creates a linked completer / pending-result pair for task `id`.
pub(crate) fn pending<R>(id: TaskId) -> (Completer<R>, PendingResult<R>) {
    let (tx, rx) = oneshot::channel();
    let completer = Completer {
        inner: Arc::new(CompleterInner {
            tx: Mutex::new(Some(tx)),
        }),
    };
    (completer, PendingResult { id, rx })
}

struct CompleterInner<R> {
    tx: Mutex<Option<oneshot::Sender<Outcome<R>>>>,
}

impl<R> Drop for CompleterInner<R> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.get_mut().take() {
            let _ = tx.send(Err(JobError::Abandoned));
        }
    }
}

/// Write side of a pending result. Resolves at most once across all clones.
pub(crate) struct Completer<R> {
    inner: Arc<CompleterInner<R>>,
}

impl<R> Clone for Completer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Completer<R> {
    /// Delivers `outcome`. Returns `false` if already resolved.
    ///
    /// A caller that dropped its [`PendingResult`] still counts as resolved.
    pub fn resolve(&self, outcome: Outcome<R>) -> bool {
        let tx = self.inner.tx.lock().take();
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.tx.lock().is_none()
    }
}

/// Handle to the outcome of a submitted task.
///
/// Resolves exactly once with the handler's value or a terminal [`JobError`].
/// Like a `JoinHandle`, it must not be polled again after it returned `Ready`.
#[must_use = "a PendingResult does nothing unless awaited"]
pub struct PendingResult<R> {
    id: TaskId,
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> PendingResult<R> {
    /// Id of the task this result belongs to.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the outcome if it is already available, without waiting.
    pub fn try_take(&mut self) -> Option<Outcome<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(JobError::Abandoned)),
        }
    }
}

impl<R> Future for PendingResult<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(JobError::Abandoned)))
    }
}

impl<R> fmt::Debug for PendingResult<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResult").field("id", &self.id).finish()
    }
}
