//! # Jobs: one submitted task travelling through the pool.
//!
//! A [`Job`] bundles the caller's payload with its identity, deadline, attempt
//! counter and the [`Completer`] of its pending result. The queue owns it until
//! a worker claims it; the registry keeps a clone while it is in flight so the
//! supervisor can retry or fail it after a crash.

use std::fmt;

use tokio::time::{Duration, Instant};

use crate::error::JobError;
use crate::jobs::pending::Completer;

/// Identity of a submitted task, unique per pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identity of a worker incarnation. A respawned worker gets a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A task inside the pool.
pub(crate) struct Job<P, R> {
    pub id: TaskId,
    pub payload: P,
    pub submitted_at: Instant,
    pub deadline: Option<Instant>,
    /// 0 for the first attempt.
    pub attempt: u32,
    pub max_attempts: u32,
    pub completer: Completer<R>,
}

impl<P: Clone, R> Clone for Job<P, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            submitted_at: self.submitted_at,
            deadline: self.deadline,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            completer: self.completer.clone(),
        }
    }
}

impl<P, R> Job<P, R> {
    /// True if another attempt is allowed after the current one.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt.saturating_add(1) < self.max_attempts
    }

    /// Attempts made so far, counting the current one.
    pub fn attempts(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// True once the deadline (if any) has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Timeout for the next attempt: the pool timeout, shortened by the deadline.
    pub fn attempt_timeout(&self, pool_timeout: Option<Duration>, now: Instant) -> Option<Duration> {
        let until_deadline = self.deadline.map(|d| d.saturating_duration_since(now));
        match (pool_timeout, until_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Resolves the job. Returns `false` if it was already resolved.
    pub fn resolve(&self, outcome: Result<R, JobError>) -> bool {
        self.completer.resolve(outcome)
    }

    pub fn is_resolved(&self) -> bool {
        self.completer.is_resolved()
    }
}

impl<P, R> fmt::Debug for Job<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
