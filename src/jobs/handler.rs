//! # Handler abstraction: the caller-supplied work.
//!
//! A pool runs exactly one [`Handler`] for every task it accepts. The handler turns
//! a payload into a result; the pool takes care of queueing, timeouts, retries,
//! crash recovery and shutdown.
//!
//! A handler receives a [`CancellationToken`] that is cancelled when the attempt
//! times out or the pool is force-terminated. Checking it is how a handler makes
//! cancellation cooperative; a handler that never yields cannot be interrupted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Boxed future returned by [`Handler::call`].
pub type BoxJobFuture<R> = Pin<Box<dyn Future<Output = Result<R, TaskError>> + Send + 'static>>;

/// Shared handle to a handler.
pub type HandlerRef<P, R> = Arc<dyn Handler<P, R>>;

/// # Asynchronous, cancelable work applied to each payload.
///
/// `call` must produce a fresh `'static` future per attempt, so retries never share
/// hidden state. Put shared state behind an `Arc` explicitly.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use poolvisor::{BoxJobFuture, Handler, TaskError};
///
/// struct Double;
///
/// impl Handler<u64, u64> for Double {
///     fn name(&self) -> &str { "double" }
///
///     fn call(&self, n: u64, ctx: CancellationToken) -> BoxJobFuture<u64> {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return Err(TaskError::Canceled);
///             }
///             Ok(n * 2)
///         })
///     }
/// }
/// ```
pub trait Handler<P, R>: Send + Sync + 'static {
    /// Stable, human-readable name.
    fn name(&self) -> &str;

    /// Runs one attempt for `payload`.
    fn call(&self, payload: P, ctx: CancellationToken) -> BoxJobFuture<R>;
}
