//! # Pool: the public handle of a supervised worker pool.
//!
//! A [`Pool`] owns nothing but shared state and a command channel; the work
//! happens in the supervisor task and its workers.
//!
//! ```text
//! submit ──► state check ──► JobQueue ──► Worker ──► PendingResult
//! stats / workers ──► Registry snapshot
//! recover ──► Command::Recover ──► Supervisor
//! shutdown ──► OnceCell ──► drain(grace)
//! ```
//!
//! ## States
//! ```text
//! Running ⇄ Degraded           (crash budget exceeded / recover)
//! Running | Degraded → Draining → Stopped
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{HandlerFn, HandlerRef, Pool, PoolConfig, TaskError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), poolvisor::PoolError> {
//! let handler: HandlerRef<String, String> = HandlerFn::arc("upper", |s: String, _ctx: CancellationToken| async move {
//!     Ok::<_, TaskError>(s.to_uppercase())
//! });
//! let pool = Pool::new(PoolConfig::with_size(2), handler)?;
//!
//! let pending = pool.submit("hello".to_string(), None)?;
//! assert_eq!(pending.await.unwrap(), "HELLO");
//!
//! pool.shutdown(Some(Duration::from_secs(1))).await
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{
    sync::{OnceCell, broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PoolConfig,
    core::{
        builder::PoolBuilder,
        registry::WorkerRecord,
        shared::Shared,
        shutdown,
        supervisor::Command,
    },
    error::PoolError,
    events::{Event, EventKind},
    jobs::{HandlerRef, Job, PendingResult, WorkerId, pending},
};

/// Lifecycle state of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting work, self-healing.
    Running,
    /// Crash budget exceeded: no respawns, `submit` fails until [`Pool::recover`].
    Degraded,
    /// Shutdown in progress: no new work, queued work still runs.
    Draining,
    /// Shut down.
    Stopped,
}

/// Read-only snapshot returned by [`Pool::stats`].
#[derive(Clone, Debug)]
pub struct PoolStats {
    pub state: PoolState,
    /// Workers running a task.
    pub active_workers: usize,
    /// Workers waiting for a task.
    pub idle_workers: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Slots left empty by the crash budget, over the pool's lifetime.
    pub dead_workers_retired: usize,
    /// Worker crashes over the pool's lifetime.
    pub crashes: u64,
    /// Why the pool is degraded, or how shutdown failed.
    pub fatal: Option<PoolError>,
}

/// Fixed-size worker pool with a bounded queue, crash supervision and graceful shutdown.
///
/// Dropping the pool without calling [`shutdown`](Pool::shutdown) force-stops
/// every worker.
pub struct Pool<P, R> {
    shared: Arc<Shared<P, R>>,
    commands: mpsc::UnboundedSender<Command>,
    listener: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
    shutdown: OnceCell<Result<(), PoolError>>,
}

impl<P, R> Pool<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Starts a pool of `cfg.size` workers running `handler`.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// [`PoolError::InvalidConfig`] if `cfg` fails [`PoolConfig::validate`].
    pub fn new(cfg: PoolConfig, handler: HandlerRef<P, R>) -> Result<Self, PoolError> {
        Self::builder(cfg, handler).build()
    }

    /// Returns a builder to attach subscribers before starting.
    pub fn builder(cfg: PoolConfig, handler: HandlerRef<P, R>) -> PoolBuilder<P, R> {
        PoolBuilder::new(cfg, handler)
    }

    pub(crate) fn from_parts(
        shared: Arc<Shared<P, R>>,
        commands: mpsc::UnboundedSender<Command>,
        listener: Option<(JoinHandle<()>, CancellationToken)>,
    ) -> Self {
        Self {
            shared,
            commands,
            listener: Mutex::new(listener),
            shutdown: OnceCell::new(),
        }
    }

    /// Enqueues `payload`, returning a handle to its eventual result.
    ///
    /// Never blocks. `deadline` bounds the whole task, across retries.
    ///
    /// # Errors
    /// - [`PoolError::CrashBudgetExceeded`] while the pool is degraded
    /// - [`PoolError::Closed`] once shutdown has started
    /// - [`PoolError::QueueFull`] when the queue is full and no worker is idle
    pub fn submit(&self, payload: P, deadline: Option<Instant>) -> Result<PendingResult<R>, PoolError> {
        let shared = &self.shared;
        let state = shared.state.read();
        match *state {
            PoolState::Running => {}
            PoolState::Degraded => return Err(shared.budget_error()),
            PoolState::Draining | PoolState::Stopped => return Err(PoolError::Closed),
        }

        let id = shared.next_task_id();
        let (completer, pending) = pending(id);
        let job = Job {
            id,
            payload,
            submitted_at: Instant::now(),
            deadline,
            attempt: 0,
            max_attempts: shared.cfg.max_attempts(),
            completer,
        };
        let submitted = Event::new(EventKind::TaskSubmitted).with_task(id);
        shared.queue.push(job).map_err(|(err, _job)| err)?;
        drop(state);

        shared.bus.publish(submitted);
        Ok(pending)
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let (active_workers, idle_workers) = shared.registry.counts();
        PoolStats {
            state: shared.state(),
            active_workers,
            idle_workers,
            queued_tasks: shared.queue.len(),
            dead_workers_retired: shared.retired(),
            crashes: shared.crashes(),
            fatal: shared.fatal.lock().clone(),
        }
    }

    /// One record per worker slot.
    pub fn workers(&self) -> Vec<WorkerRecord> {
        self.shared.registry.snapshot()
    }

    /// The configuration the pool runs with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.cfg
    }

    /// Stops accepting work and drains within `grace` (default: `shutdown_grace`).
    ///
    /// Idempotent: concurrent and repeated calls all return the outcome of the first.
    ///
    /// # Errors
    /// [`PoolError::ShutdownTimeout`] if the grace elapsed; every unfinished task
    /// was then resolved with [`JobError::ShutdownTimeout`](crate::JobError::ShutdownTimeout).
    pub async fn shutdown(&self, grace: Option<Duration>) -> Result<(), PoolError> {
        let grace = grace.unwrap_or(self.shared.cfg.shutdown_grace);
        self.shutdown
            .get_or_init(|| async {
                let res = shutdown::drain(&self.shared, grace).await;
                let listener = self.listener.lock().take();
                if let Some((handle, stop)) = listener {
                    stop.cancel();
                    let _ = handle.await;
                }
                res
            })
            .await
            .clone()
    }

    /// Brings a degraded pool back to `Running`: resets the crash budget and
    /// respawns retired workers. A running pool is left as is.
    ///
    /// # Errors
    /// [`PoolError::Closed`] once shutdown has started.
    pub async fn recover(&self) -> Result<(), PoolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Recover(tx))
            .map_err(|_| PoolError::Closed)?;
        rx.await.unwrap_or(Err(PoolError::Closed))
    }

    /// Aborts the worker's task, as if it had crashed.
    ///
    /// Returns `false` if no running worker has this id.
    pub fn kill_worker(&self, id: WorkerId) -> bool {
        self.shared.registry.abort(id)
    }

    /// Waits for SIGINT, SIGTERM or SIGQUIT (Ctrl-C off Unix), then shuts down
    /// with the default grace.
    pub async fn run_until_signal(&self) -> Result<(), PoolError> {
        if let Err(error) = shutdown::wait_for_shutdown_signal().await {
            tracing::warn!(%error, "cannot listen for shutdown signals, shutting down now");
        }
        self.shutdown(None).await
    }

    /// Raw receiver of every event published after this call.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }
}

impl<P, R> Drop for Pool<P, R> {
    fn drop(&mut self) {
        self.shared.queue.close();
        self.shared.runtime_token.cancel();
        if let Some((_, stop)) = self.listener.get_mut().take() {
            stop.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        error::{JobError, TaskError},
        jobs::HandlerFn,
        policies::BackoffPolicy,
        WorkerState,
    };

    const GUARD: Duration = Duration::from_secs(5);

    fn fast_config(size: usize) -> PoolConfig {
        PoolConfig {
            size,
            respawn_backoff: BackoffPolicy::immediate(),
            retry_backoff: BackoffPolicy::immediate(),
            ..PoolConfig::default()
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        timeout(GUARD, async {
            while !cond() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Handler that blocks each task until `gate` is notified.
    fn gated(gate: Arc<Notify>, running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> HandlerRef<u32, u32> {
        HandlerFn::arc("gated", move |n: u32, _ctx: CancellationToken| {
            let gate = Arc::clone(&gate);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                gate.notified().await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, TaskError>(n)
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded_by_size() {
        let gate = Arc::new(Notify::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut cfg = fast_config(3);
        cfg.queue_capacity = 100;
        let pool = Pool::new(cfg, gated(gate.clone(), running.clone(), peak.clone())).unwrap();

        let pending: Vec<_> = (0..20).map(|n| pool.submit(n, None).unwrap()).collect();
        wait_until(|| running.load(Ordering::SeqCst) == 3).await;

        let release = tokio::spawn({
            let gate = gate.clone();
            async move {
                loop {
                    gate.notify_waiters();
                    sleep(Duration::from_millis(5)).await;
                }
            }
        });
        for (n, p) in pending.into_iter().enumerate() {
            assert_eq!(timeout(GUARD, p).await.unwrap(), Ok(n as u32));
        }
        release.abort();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backpressure_rejects_beyond_capacity() {
        let gate = Arc::new(Notify::new());
        let running = Arc::new(AtomicUsize::new(0));
        let mut cfg = fast_config(2);
        cfg.queue_capacity = 3;
        let pool = Pool::new(
            cfg,
            gated(gate.clone(), running.clone(), Arc::new(AtomicUsize::new(0))),
        )
        .unwrap();
        wait_until(|| pool.stats().idle_workers == 2).await;

        let mut accepted = Vec::new();
        for n in 0..5 {
            accepted.push(pool.submit(n, None).unwrap());
        }
        wait_until(|| running.load(Ordering::SeqCst) == 2).await;
        assert_eq!(pool.stats().queued_tasks, 3);
        assert_eq!(
            pool.submit(99, None).unwrap_err(),
            PoolError::QueueFull { capacity: 3 }
        );

        drop(accepted);
        pool.shutdown(Some(Duration::from_millis(50))).await.unwrap_err();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_task_resolves_exactly_once() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("mixed", |n: u32, _ctx: CancellationToken| async move {
            if n % 3 == 0 {
                Err(TaskError::Fatal { error: format!("bad {n}") })
            } else {
                Ok(n)
            }
        });
        let mut cfg = fast_config(4);
        cfg.queue_capacity = 200;
        let pool = Pool::new(cfg, handler).unwrap();

        let pending: Vec<_> = (0..100).map(|n| (n, pool.submit(n, None).unwrap())).collect();
        for (n, p) in pending {
            let out = timeout(GUARD, p).await.unwrap();
            if n % 3 == 0 {
                assert!(matches!(out, Err(JobError::Failed { attempts: 1, .. })));
            } else {
                assert_eq!(out, Ok(n));
            }
        }
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn single_worker_starts_tasks_in_fifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("record", {
            let order = Arc::clone(&order);
            move |n: u32, _ctx: CancellationToken| {
                order.lock().push(n);
                async move { Ok::<_, TaskError>(n) }
            }
        });
        let mut cfg = fast_config(1);
        cfg.queue_capacity = 16;
        let pool = Pool::new(cfg, handler).unwrap();

        let pending: Vec<_> = (0..10).map(|n| pool.submit(n, None).unwrap()).collect();
        for p in pending {
            timeout(GUARD, p).await.unwrap().unwrap();
        }
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn killed_worker_is_replaced_and_task_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("first-hangs", {
            let calls = Arc::clone(&calls);
            move |n: u32, _ctx: CancellationToken| {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        std::future::pending::<()>().await;
                    }
                    Ok::<_, TaskError>(n)
                }
            }
        });
        let pool = Pool::new(fast_config(1), handler).unwrap();
        let pending = pool.submit(7, None).unwrap();

        wait_until(|| pool.stats().active_workers == 1).await;
        let victim = pool.workers()[0].id;
        wait_until(|| pool.kill_worker(victim)).await;

        assert_eq!(timeout(GUARD, pending).await.unwrap(), Ok(7));
        let record = &pool.workers()[0];
        assert_ne!(record.id, victim);
        assert_eq!(record.slot, 0);
        assert_eq!(pool.stats().crashes, 1);
        assert!(!pool.kill_worker(victim));
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_budget_degrades_the_pool() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("hang", |_: u32, _ctx: CancellationToken| async move {
            std::future::pending::<()>().await;
            Ok::<u32, TaskError>(0)
        });
        let mut cfg = fast_config(1);
        cfg.crash_budget = 2;
        cfg.crash_window = Duration::from_secs(60);
        cfg.max_retries = 10;
        let pool = Pool::new(cfg, handler).unwrap();
        let pending = pool.submit(1, None).unwrap();

        for crash in 1..=3u64 {
            wait_until(|| pool.stats().active_workers == 1).await;
            let id = pool.workers()[0].id;
            wait_until(|| pool.kill_worker(id)).await;
            wait_until(|| pool.stats().crashes == crash).await;
        }

        assert_eq!(timeout(GUARD, pending).await.unwrap(), Err(JobError::PoolDegraded));
        let stats = pool.stats();
        assert_eq!(stats.state, PoolState::Degraded);
        assert_eq!(stats.dead_workers_retired, 1);
        assert!(matches!(stats.fatal, Some(PoolError::CrashBudgetExceeded { budget: 2, .. })));
        assert_eq!(
            pool.submit(2, None).unwrap_err(),
            PoolError::CrashBudgetExceeded {
                budget: 2,
                window: Duration::from_secs(60)
            }
        );
        assert_eq!(pool.workers()[0].consecutive_crashes, 3);
        assert!(pool.workers()[0].retired);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn degraded_pool_hands_crash_retry_to_surviving_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("first-hangs", {
            let calls = Arc::clone(&calls);
            move |n: u32, _ctx: CancellationToken| {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        std::future::pending::<()>().await;
                    }
                    Ok::<_, TaskError>(n)
                }
            }
        });
        let mut cfg = fast_config(2);
        cfg.crash_budget = 0;
        cfg.max_retries = 3;
        let pool = Pool::new(cfg, handler).unwrap();
        let pending = pool.submit(7, None).unwrap();

        wait_until(|| pool.stats().active_workers == 1).await;
        let busy = pool
            .workers()
            .into_iter()
            .find(|w| w.state == WorkerState::Busy)
            .unwrap()
            .id;
        wait_until(|| pool.kill_worker(busy)).await;

        assert_eq!(timeout(GUARD, pending).await.unwrap(), Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = pool.stats();
        assert_eq!(stats.state, PoolState::Degraded);
        assert_eq!(stats.dead_workers_retired, 1);
        assert_eq!(stats.crashes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handler_panicking_before_its_future_is_not_a_crash() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("eager", |n: u32, _ctx: CancellationToken| {
            if n == 0 {
                panic!("eager handler bug");
            }
            async move { Ok::<_, TaskError>(n) }
        });
        let mut cfg = fast_config(1);
        cfg.max_retries = 0;
        let pool = Pool::new(cfg, handler).unwrap();

        let out = timeout(GUARD, pool.submit(0, None).unwrap()).await.unwrap();
        match out {
            Err(JobError::Failed { error, attempts }) => {
                assert_eq!(attempts, 1);
                assert!(error.contains("eager handler bug"), "{error}");
                assert!(!error.contains("worker crashed"), "{error}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(timeout(GUARD, pool.submit(4, None).unwrap()).await.unwrap(), Ok(4));
        let stats = pool.stats();
        assert_eq!(stats.crashes, 0);
        assert_eq!(stats.state, PoolState::Running);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watchdog_times_out_a_blocking_handler_and_replaces_the_worker() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("blocking", |n: u32, _ctx: CancellationToken| async move {
            if n == 0 {
                std::thread::sleep(Duration::from_millis(600));
            }
            Ok::<_, TaskError>(n)
        });
        let mut cfg = fast_config(1);
        cfg.task_timeout = Duration::from_millis(50);
        cfg.max_retries = 0;
        let pool = Pool::new(cfg, handler).unwrap();
        wait_until(|| pool.stats().idle_workers == 1).await;
        let victim = pool.workers()[0].id;

        let out = timeout(GUARD, pool.submit(0, None).unwrap()).await.unwrap();
        assert_eq!(
            out,
            Err(JobError::TimedOut {
                timeout: Duration::from_millis(50),
                attempts: 1
            })
        );

        wait_until(|| pool.stats().crashes == 1).await;
        assert_eq!(timeout(GUARD, pool.submit(1, None).unwrap()).await.unwrap(), Ok(1));
        assert_ne!(pool.workers()[0].id, victim);
        assert_eq!(pool.stats().state, PoolState::Running);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn respawn_delay_starts_at_the_base_and_doubles() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("hang", |_: u32, _ctx: CancellationToken| async move {
            std::future::pending::<()>().await;
            Ok::<u32, TaskError>(0)
        });
        let mut cfg = fast_config(1);
        cfg.respawn_backoff = BackoffPolicy::exponential(Duration::from_millis(20), Duration::from_secs(1));
        cfg.max_retries = 10;
        let pool = Pool::new(cfg, handler).unwrap();
        let mut events = pool.subscribe_events();
        let _pending = pool.submit(1, None).unwrap();

        let mut delays = Vec::new();
        for _ in 0..2 {
            wait_until(|| pool.stats().active_workers == 1).await;
            let id = pool.workers()[0].id;
            wait_until(|| pool.kill_worker(id)).await;
            let spawned = timeout(GUARD, async {
                loop {
                    let ev = events.recv().await.unwrap();
                    if ev.kind == EventKind::WorkerSpawned && ev.worker != Some(id) {
                        break ev;
                    }
                }
            })
            .await
            .unwrap();
            delays.push(spawned.delay());
        }
        assert_eq!(
            delays,
            vec![Some(Duration::from_millis(20)), Some(Duration::from_millis(40))]
        );
        pool.shutdown(Some(Duration::from_millis(50))).await.unwrap_err();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn recover_restarts_a_degraded_pool() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("maybe-hang", |n: u32, _ctx: CancellationToken| async move {
            if n == 0 {
                std::future::pending::<()>().await;
            }
            Ok::<_, TaskError>(n)
        });
        let mut cfg = fast_config(1);
        cfg.crash_budget = 0;
        cfg.max_retries = 0;
        let pool = Pool::new(cfg, handler).unwrap();

        let hung = pool.submit(0, None).unwrap();
        wait_until(|| pool.stats().active_workers == 1).await;
        let victim = pool.workers()[0].id;
        wait_until(|| pool.kill_worker(victim)).await;

        assert!(matches!(
            timeout(GUARD, hung).await.unwrap(),
            Err(JobError::Failed { attempts: 1, .. })
        ));
        wait_until(|| pool.stats().state == PoolState::Degraded).await;

        pool.recover().await.unwrap();
        assert_eq!(pool.stats().state, PoolState::Running);
        assert!(pool.stats().fatal.is_none());
        let ok = pool.submit(5, None).unwrap();
        assert_eq!(timeout(GUARD, ok).await.unwrap(), Ok(5));
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn failing_handler_is_retried_then_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("flaky", {
            let calls = Arc::clone(&calls);
            move |_: u32, _ctx: CancellationToken| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, _>(TaskError::Fail { error: "nope".into() }) }
            }
        });
        let mut cfg = fast_config(1);
        cfg.max_retries = 2;
        let pool = Pool::new(cfg, handler).unwrap();

        let out = timeout(GUARD, pool.submit(1, None).unwrap()).await.unwrap();
        assert_eq!(
            out,
            Err(JobError::Failed {
                error: "execution failed: nope".into(),
                attempts: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn timeout_is_retried_then_times_out() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("slow", |_: u32, _ctx: CancellationToken| async move {
            sleep(Duration::from_secs(10)).await;
            Ok::<u32, TaskError>(0)
        });
        let mut cfg = fast_config(1);
        cfg.task_timeout = Duration::from_millis(20);
        cfg.max_retries = 1;
        let pool = Pool::new(cfg, handler).unwrap();

        let out = timeout(GUARD, pool.submit(1, None).unwrap()).await.unwrap();
        assert_eq!(
            out,
            Err(JobError::TimedOut {
                timeout: Duration::from_millis(20),
                attempts: 2
            })
        );
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn handler_panic_is_not_a_worker_crash() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("panics", |n: u32, _ctx: CancellationToken| async move {
            if n == 0 {
                panic!("handler bug");
            }
            Ok::<_, TaskError>(n)
        });
        let mut cfg = fast_config(1);
        cfg.max_retries = 0;
        let pool = Pool::new(cfg, handler).unwrap();
        wait_until(|| pool.stats().idle_workers == 1).await;
        let worker = pool.workers()[0].id;

        let out = timeout(GUARD, pool.submit(0, None).unwrap()).await.unwrap();
        assert!(matches!(out, Err(JobError::Failed { attempts: 1, .. })));
        assert_eq!(timeout(GUARD, pool.submit(4, None).unwrap()).await.unwrap(), Ok(4));

        assert_eq!(pool.stats().crashes, 0);
        assert_eq!(pool.workers()[0].id, worker);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn expired_deadline_skips_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("count", {
            let calls = Arc::clone(&calls);
            move |n: u32, _ctx: CancellationToken| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, TaskError>(n) }
            }
        });
        let pool = Pool::new(fast_config(1), handler).unwrap();

        let out = pool.submit(1, Some(Instant::now())).unwrap().await;
        assert_eq!(out, Err(JobError::DeadlineExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn graceful_shutdown_completes_running_work() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("one-second", |n: u32, _ctx: CancellationToken| async move {
            sleep(Duration::from_secs(1)).await;
            Ok::<_, TaskError>(n)
        });
        let pool = Pool::new(fast_config(2), handler).unwrap();
        let a = pool.submit(1, None).unwrap();
        let b = pool.submit(2, None).unwrap();
        wait_until(|| pool.stats().active_workers == 2).await;

        assert_eq!(pool.shutdown(Some(Duration::from_secs(5))).await, Ok(()));
        assert_eq!(a.await, Ok(1));
        assert_eq!(b.await, Ok(2));
        assert_eq!(pool.stats().state, PoolState::Stopped);
        assert_eq!(pool.submit(3, None).unwrap_err(), PoolError::Closed);
        assert!(pool.workers().iter().all(|w| w.state == WorkerState::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_past_grace_forces_termination() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("five-seconds", |n: u32, _ctx: CancellationToken| async move {
            sleep(Duration::from_secs(5)).await;
            Ok::<_, TaskError>(n)
        });
        let mut cfg = fast_config(1);
        cfg.queue_capacity = 4;
        let pool = Pool::new(cfg, handler).unwrap();
        let running = pool.submit(1, None).unwrap();
        let queued = pool.submit(2, None).unwrap();
        let running_id = running.id();
        let queued_id = queued.id();
        wait_until(|| pool.stats().active_workers == 1).await;

        let started = Instant::now();
        let err = pool.shutdown(Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            err,
            PoolError::ShutdownTimeout {
                grace: Duration::from_millis(100),
                stuck: vec![running_id, queued_id],
            }
        );
        assert_eq!(running.await, Err(JobError::ShutdownTimeout));
        assert_eq!(queued.await, Err(JobError::ShutdownTimeout));
        assert_eq!(pool.stats().state, PoolState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_shutdowns_share_one_outcome() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("quick", |n: u32, _ctx: CancellationToken| async move {
            sleep(Duration::from_millis(50)).await;
            Ok::<_, TaskError>(n)
        });
        let pool = Arc::new(Pool::new(fast_config(2), handler).unwrap());
        let pending = pool.submit(1, None).unwrap();
        let mut events = pool.subscribe_events();

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.shutdown(None).await })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap(), Ok(()));
        }
        assert_eq!(pool.shutdown(None).await, Ok(()));
        assert_eq!(pending.await, Ok(1));

        let mut requested = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::ShutdownRequested {
                requested += 1;
            }
        }
        assert_eq!(requested, 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("noop", |n: u32, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(n)
        });
        let err = Pool::new(fast_config(0), handler.clone()).err();
        assert!(matches!(err, Some(PoolError::InvalidConfig { .. })));

        let mut cfg = fast_config(1);
        cfg.crash_window = Duration::ZERO;
        assert!(matches!(
            Pool::new(cfg, handler).err(),
            Some(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn building_outside_a_runtime_fails() {
        let handler: HandlerRef<u32, u32> = HandlerFn::arc("noop", |n: u32, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(n)
        });
        assert!(matches!(
            Pool::new(fast_config(1), handler).err(),
            Some(PoolError::InvalidConfig { .. })
        ));
    }
}
