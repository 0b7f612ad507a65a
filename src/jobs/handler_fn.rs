//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(P, CancellationToken) -> Fut`, producing a
//! fresh future per attempt.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{HandlerFn, HandlerRef, TaskError};
//!
//! let h: HandlerRef<String, usize> = HandlerFn::arc("len", |s: String, _ctx: CancellationToken| async move {
//!     Ok::<_, TaskError>(s.len())
//! });
//!
//! assert_eq!(h.name(), "len");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::jobs::handler::{BoxJobFuture, Handler};

/// Function-backed handler.
pub struct HandlerFn<P, F> {
    name: Cow<'static, str>,
    f: F,
    _payload: PhantomData<fn(P)>,
}

impl<P, F> HandlerFn<P, F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`](crate::HandlerRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _payload: PhantomData,
        }
    }

    /// Creates the handler and returns it behind an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<P, R, F, Fut> Handler<P, R> for HandlerFn<P, F>
where
    P: 'static,
    F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, payload: P, ctx: CancellationToken) -> BoxJobFuture<R> {
        Box::pin((self.f)(payload, ctx))
    }
}
