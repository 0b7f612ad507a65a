//! # Jobs: handlers, submitted tasks and their pending results.
//!
//! - [`Handler`] - trait for the caller-supplied async work
//! - [`HandlerFn`] - closure-backed handler
//! - [`HandlerRef`] - shared handler (`Arc<dyn Handler<P, R>>`)
//! - [`TaskId`], [`WorkerId`] - identities
//! - [`PendingResult`] - the caller's handle to a task outcome
//! - `Job` and its completer - internal carriers of a task through the pool

mod handler;
mod handler_fn;
mod job;
mod pending;

pub use handler::{BoxJobFuture, Handler, HandlerRef};
pub use handler_fn::HandlerFn;
pub use job::{TaskId, WorkerId};
pub use pending::PendingResult;

pub(crate) use job::Job;
pub(crate) use pending::pending;
