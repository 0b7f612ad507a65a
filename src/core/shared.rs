//! State shared by the pool handle, the supervisor and every worker.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PoolConfig,
    core::{pool::PoolState, queue::JobQueue, registry::Registry},
    error::{JobError, PoolError},
    events::{Bus, Event, EventKind},
    jobs::{HandlerRef, Job, TaskId, WorkerId},
};

pub(crate) struct Shared<P, R> {
    pub cfg: PoolConfig,
    pub handler: HandlerRef<P, R>,
    pub queue: JobQueue<Job<P, R>>,
    pub registry: Registry<P, R>,
    pub bus: Bus,

    /// Lifecycle state. `submit` holds the read lock across its push so a
    /// transition under the write lock never races an admission.
    pub state: RwLock<PoolState>,
    /// Error reported by `stats().fatal`.
    pub fatal: Mutex<Option<PoolError>>,

    /// Cancelled on forced stop: workers abandon their jobs and exit.
    pub runtime_token: CancellationToken,
    /// Cancelled when shutdown starts: the supervisor exits once its last worker has.
    pub draining: CancellationToken,
    /// Cancelled by the supervisor right before it returns.
    pub finished: CancellationToken,

    next_task: AtomicU64,
    next_worker: AtomicU64,
    crashes: AtomicU64,
    retired: AtomicUsize,
}

impl<P: Clone, R> Shared<P, R> {
    pub fn new(cfg: PoolConfig, handler: HandlerRef<P, R>, bus: Bus) -> Self {
        Self {
            queue: JobQueue::new(cfg.queue_capacity),
            registry: Registry::new(cfg.size),
            cfg,
            handler,
            bus,
            state: RwLock::new(PoolState::Running),
            fatal: Mutex::new(None),
            runtime_token: CancellationToken::new(),
            draining: CancellationToken::new(),
            finished: CancellationToken::new(),
            next_task: AtomicU64::new(1),
            next_worker: AtomicU64::new(1),
            crashes: AtomicU64::new(0),
            retired: AtomicUsize::new(0),
        }
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId::new(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_worker_id(&self) -> WorkerId {
        WorkerId::new(self.next_worker.fetch_add(1, Ordering::Relaxed))
    }

    pub fn record_crash(&self) {
        self.crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn crashes(&self) -> u64 {
        self.crashes.load(Ordering::Relaxed)
    }

    pub fn record_retired(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retired(&self) -> usize {
        self.retired.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    pub fn budget_error(&self) -> PoolError {
        PoolError::CrashBudgetExceeded {
            budget: self.cfg.crash_budget,
            window: self.cfg.crash_window,
        }
    }

    /// Moves `Running` to `Degraded`. Returns `true` on the transition.
    pub fn degrade(&self) -> bool {
        let mut state = self.state.write();
        *self.fatal.lock() = Some(self.budget_error());
        if *state != PoolState::Running {
            return false;
        }
        *state = PoolState::Degraded;
        true
    }

    /// Resolves `job` with a terminal error and reports it.
    pub fn exhaust(&self, job: &Job<P, R>, worker: Option<WorkerId>, err: JobError) {
        let label = err.as_label();
        if job.resolve(Err(err)) {
            let mut ev = Event::new(EventKind::TaskExhausted)
                .with_task(job.id)
                .with_attempt(job.attempt)
                .with_reason(label);
            if let Some(w) = worker {
                ev = ev.with_worker(w);
            }
            self.bus.publish(ev);
        }
    }
}
