//! # Supervisor: keeps `size` workers alive within the crash budget.
//!
//! The supervisor is a single tokio task that owns the workers' [`JoinSet`].
//! It is the only place that spawns workers, so "at most `size` alive" holds by
//! construction: a slot gets a replacement only after its previous worker was
//! joined.
//!
//! ## Event loop
//! ```text
//! loop select {
//!   runtime token cancelled ─► abort every worker (forced stop)
//!   join_next_with_id()     ─► Ok  → slot Stopped
//!                              Err → handle_crash(slot)
//!   command                 ─► Recover → reset budget, respawn retired slots
//!   watchdog tick           ─► resolve + abort workers stuck past the timeout
//!   draining & no workers   ─► exit
//! }
//! ```
//!
//! ## Crash handling
//! ```text
//! crash ─► registry.mark_crashed (consecutive += 1)
//!       ├─► in-flight job: resolved already → leave it
//!       │                  attempts left    → attempt += 1, ride on replacement
//!       │                  otherwise        → Failed
//!       ├─► CrashBudget.record(now)
//!       └─► exceeded or degraded?
//!             yes → Degraded, retire slot, retry → head of the queue
//!                   (PoolDegraded once no worker is left to run it)
//!             no  → spawn replacement after respawn_backoff.next(consecutive - 1)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::{Id, JoinError, JoinSet},
    time::{self, Duration, Instant, Interval, MissedTickBehavior},
};

use crate::{
    core::{
        pool::PoolState,
        runner::panic_message,
        shared::Shared,
        worker::{Worker, WorkerExit},
    },
    error::{JobError, PoolError},
    events::{Event, EventKind},
    jobs::{Job, WorkerId},
    policies::CrashBudget,
};

/// Requests from the pool handle.
pub(crate) enum Command {
    Recover(oneshot::Sender<Result<(), PoolError>>),
}

pub(crate) struct Supervisor<P, R> {
    shared: Arc<Shared<P, R>>,
    set: JoinSet<WorkerExit>,
    slots: HashMap<Id, (usize, WorkerId)>,
    budget: CrashBudget,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<P, R> Supervisor<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new(shared: Arc<Shared<P, R>>, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        let budget = CrashBudget::new(shared.cfg.crash_budget, shared.cfg.crash_window);
        Self {
            shared,
            set: JoinSet::new(),
            slots: HashMap::new(),
            budget,
            commands,
        }
    }

    /// Spawns the initial workers and supervises them until the pool stops.
    pub async fn run(mut self) {
        for slot in 0..self.shared.cfg.size {
            self.spawn_worker(slot, None, Duration::ZERO);
        }

        let mut watchdog = self.shared.cfg.timeout().map(|t| {
            let mut iv = time::interval(watch_period(t));
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            iv
        });
        let runtime_token = self.shared.runtime_token.clone();
        let draining = self.shared.draining.clone();
        let mut forced = false;

        loop {
            select! {
                biased;
                _ = runtime_token.cancelled(), if !forced => {
                    forced = true;
                    self.set.abort_all();
                }
                Some(joined) = self.set.join_next_with_id(), if !self.set.is_empty() => {
                    self.handle_exit(joined);
                }
                Some(cmd) = self.commands.recv() => self.handle_command(cmd),
                _ = tick(&mut watchdog) => self.check_stalls(),
                _ = draining.cancelled(), if self.set.is_empty() => break,
                _ = runtime_token.cancelled(), if self.set.is_empty() => break,
            }
        }

        self.shared.registry.stop_all();
        self.shared.finished.cancel();
    }

    fn spawn_worker(&mut self, slot: usize, initial: Option<Job<P, R>>, delay: Duration) {
        let id = self.shared.next_worker_id();
        self.shared.registry.install(slot, id, initial.as_ref());

        let worker = Worker {
            id,
            slot,
            shared: Arc::clone(&self.shared),
        };
        let handle = self.set.spawn(worker.run(initial, delay));
        self.slots.insert(handle.id(), (slot, id));
        self.shared.registry.set_abort(slot, id, handle);

        let mut ev = Event::new(EventKind::WorkerSpawned).with_worker(id);
        if !delay.is_zero() {
            ev = ev.with_delay(delay);
        }
        self.shared.bus.publish(ev);
    }

    fn handle_exit(&mut self, joined: Result<(Id, WorkerExit), JoinError>) {
        let (task_id, reason) = match joined {
            Ok((task_id, _exit)) => (task_id, None),
            Err(err) => {
                let task_id = err.id();
                let reason = if err.is_panic() {
                    format!("panicked: {}", panic_message(err.into_panic().as_ref()))
                } else {
                    "aborted".to_string()
                };
                (task_id, Some(reason))
            }
        };
        let Some((slot, worker)) = self.slots.remove(&task_id) else {
            return;
        };

        match reason {
            None => {
                // Clean exits hold no job; a forced stop already resolved anything it had.
                let _ = self.shared.registry.mark_stopped(slot);
            }
            Some(reason) => self.handle_crash(slot, worker, reason),
        }

        if self.set.is_empty() && !self.shared.registry.retired_slots().is_empty() {
            self.flush_orphans();
        }
    }

    fn handle_crash(&mut self, slot: usize, worker: WorkerId, reason: String) {
        let shared = Arc::clone(&self.shared);
        let now = Instant::now();
        let Some(report) = shared.registry.mark_crashed(slot, now) else {
            return;
        };

        let mut ev = Event::new(EventKind::WorkerCrashed)
            .with_worker(worker)
            .with_reason(reason.as_str());
        if let Some(job) = &report.in_flight {
            ev = ev.with_task(job.id);
        }
        shared.bus.publish(ev);

        if shared.runtime_token.is_cancelled() {
            if let Some(job) = &report.in_flight {
                shared.exhaust(job, Some(worker), JobError::ShutdownTimeout);
            }
            let _ = shared.registry.mark_stopped(slot);
            return;
        }
        shared.record_crash();

        // (a) fate of the in-flight job
        let retry = match report.in_flight {
            Some(job) if job.is_resolved() => None,
            Some(mut job) if job.has_attempts_left() => {
                job.attempt += 1;
                Some(job)
            }
            Some(job) => {
                let attempts = job.attempts();
                shared.exhaust(
                    &job,
                    Some(worker),
                    JobError::Failed {
                        error: format!("worker crashed: {reason}"),
                        attempts,
                    },
                );
                None
            }
            None => None,
        };

        // (b) crash budget
        let exceeded = self.budget.record(now);

        // (c) respawn or retire
        if exceeded || shared.state() == PoolState::Degraded {
            if shared.degrade() {
                tracing::warn!(
                    budget = self.budget.budget(),
                    window = ?self.budget.window(),
                    "crash budget exceeded, pool degraded"
                );
                shared.bus.publish(
                    Event::new(EventKind::PoolDegraded)
                        .with_reason(shared.budget_error().to_string()),
                );
            }
            shared.registry.retire(slot);
            shared.record_retired();
            shared
                .bus
                .publish(Event::new(EventKind::WorkerRetired).with_worker(worker));
            if let Some(job) = retry {
                // Surviving workers take it; with none left `flush_orphans` resolves it.
                shared.queue.requeue(job);
            }
            return;
        }

        if retry.is_none() && shared.queue.is_closed() && shared.queue.len() == 0 {
            // Draining with nothing left to run: the slot stays empty.
            let _ = shared.registry.mark_stopped(slot);
            return;
        }

        let delay = shared
            .cfg
            .respawn_backoff
            .next(report.consecutive_crashes.saturating_sub(1));
        self.spawn_worker(slot, retry, delay);
    }

    /// Resolves every queued job once no worker is left to run it.
    fn flush_orphans(&self) {
        for job in self.shared.queue.drain() {
            self.shared.exhaust(&job, None, JobError::PoolDegraded);
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Recover(reply) => {
                let _ = reply.send(self.recover());
            }
        }
    }

    fn recover(&mut self) -> Result<(), PoolError> {
        {
            let mut state = self.shared.state.write();
            match *state {
                PoolState::Running => return Ok(()),
                PoolState::Draining | PoolState::Stopped => return Err(PoolError::Closed),
                PoolState::Degraded => *state = PoolState::Running,
            }
            *self.shared.fatal.lock() = None;
        }
        self.budget.reset();

        for slot in self.shared.registry.retired_slots() {
            self.spawn_worker(slot, None, Duration::ZERO);
        }
        self.shared.bus.publish(Event::new(EventKind::PoolRecovered));
        tracing::info!("pool recovered");
        Ok(())
    }

    fn check_stalls(&self) {
        let shared = &self.shared;
        let Some(timeout) = shared.cfg.timeout() else {
            return;
        };
        for stall in shared.registry.stalled(Instant::now(), stall_limit(timeout)) {
            let mut ev = Event::new(EventKind::WorkerStalled)
                .with_worker(stall.worker)
                .with_timeout(timeout);
            if let Some(job) = &stall.job {
                ev = ev.with_task(job.id);
            }
            shared.bus.publish(ev);
            tracing::warn!(worker = %stall.worker, ?timeout, "worker stalled, aborting");

            if let Some(job) = stall.job {
                let attempts = job.attempts();
                shared.exhaust(
                    &job,
                    Some(stall.worker),
                    JobError::TimedOut { timeout, attempts },
                );
            }
        }
    }
}

/// How long past the task timeout a busy worker may go before it counts as stalled.
fn stall_limit(timeout: Duration) -> Duration {
    timeout + (timeout / 2).max(Duration::from_millis(50))
}

fn watch_period(timeout: Duration) -> Duration {
    (timeout / 2).clamp(Duration::from_millis(10), Duration::from_secs(1))
}

async fn tick(watchdog: &mut Option<Interval>) {
    match watchdog {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}
