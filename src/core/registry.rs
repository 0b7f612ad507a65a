//! # Worker registry: one record per worker slot.
//!
//! The registry is the pool's only view of its workers. It holds, per slot:
//! - the public [`WorkerRecord`] (state, current task, crash counters),
//! - a clone of the in-flight job, so a crash never loses a task,
//! - the worker's [`AbortHandle`], used by `kill_worker`, the stall watchdog
//!   and forced shutdown.
//!
//! ## Who writes what
//! ```text
//! Supervisor ──► install / mark_crashed / mark_stopped / retire / stalled
//! Worker     ──► set_idle / set_busy / track / untrack / reset_crashes
//! Pool       ──► snapshot / counts / abort (read-mostly)
//! ```
//!
//! ## Rules
//! - A slot holds at most one worker incarnation; a respawn installs a new
//!   [`WorkerId`] only after the previous one has been joined.
//! - Worker-side updates carry the worker's id and are ignored if the slot has
//!   moved on to another incarnation.
//! - Crash counters survive respawns; they reset on the slot's next success.

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant};

use crate::jobs::{Job, TaskId, WorkerId};

/// Lifecycle state of a worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a task.
    Idle,
    /// Running a task.
    Busy,
    /// Crashed, not yet started, or waiting out its respawn backoff.
    Dead,
    /// Exited cleanly (queue drained or pool stopped).
    Stopped,
}

/// Snapshot of one worker slot.
#[derive(Clone, Debug)]
pub struct WorkerRecord {
    /// Current incarnation.
    pub id: WorkerId,
    /// Slot index in `0..size`.
    pub slot: usize,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Task being executed, if busy.
    pub current_task: Option<TaskId>,
    /// When the current attempt started.
    pub busy_since: Option<Instant>,
    /// Crashes since the slot last completed a task.
    pub consecutive_crashes: u32,
    /// Time of the most recent crash in this slot.
    pub last_crash_at: Option<Instant>,
    /// True once the slot was retired because the crash budget ran out.
    pub retired: bool,
}

struct Slot<P, R> {
    record: WorkerRecord,
    in_flight: Option<Job<P, R>>,
    abort: Option<AbortHandle>,
    stalled: bool,
}

/// What the supervisor learns when a worker crashes.
pub(crate) struct CrashReport<P, R> {
    pub consecutive_crashes: u32,
    pub in_flight: Option<Job<P, R>>,
}

/// A worker caught by the stall watchdog.
pub(crate) struct Stall<P, R> {
    pub worker: WorkerId,
    pub job: Option<Job<P, R>>,
}

pub(crate) struct Registry<P, R> {
    slots: Mutex<Vec<Slot<P, R>>>,
}

impl<P: Clone, R> Registry<P, R> {
    pub fn new(size: usize) -> Self {
        let slots = (0..size)
            .map(|slot| Slot {
                record: WorkerRecord {
                    id: WorkerId::new(0),
                    slot,
                    state: WorkerState::Dead,
                    current_task: None,
                    busy_since: None,
                    consecutive_crashes: 0,
                    last_crash_at: None,
                    retired: false,
                },
                in_flight: None,
                abort: None,
                stalled: false,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Installs a new worker incarnation into `slot`, optionally already owning `job`.
    pub fn install(&self, slot: usize, id: WorkerId, job: Option<&Job<P, R>>) {
        let mut slots = self.slots.lock();
        let Some(s) = slots.get_mut(slot) else { return };
        s.record.id = id;
        s.record.state = WorkerState::Dead;
        s.record.current_task = None;
        s.record.busy_since = None;
        s.record.retired = false;
        s.in_flight = job.cloned();
        s.abort = None;
        s.stalled = false;
    }

    pub fn set_abort(&self, slot: usize, id: WorkerId, abort: AbortHandle) {
        self.with_worker(slot, id, |s| s.abort = Some(abort));
    }

    pub fn set_idle(&self, slot: usize, id: WorkerId) {
        self.with_worker(slot, id, |s| {
            s.record.state = WorkerState::Idle;
            s.record.current_task = None;
            s.record.busy_since = None;
        });
    }

    pub fn set_busy(&self, slot: usize, id: WorkerId, task: TaskId, now: Instant) {
        self.with_worker(slot, id, |s| {
            s.record.state = WorkerState::Busy;
            s.record.current_task = Some(task);
            s.record.busy_since = Some(now);
        });
    }

    /// Busy between attempts: the worker owns `task` but is not running it.
    ///
    /// The stall watchdog ignores a slot in this state.
    pub fn set_waiting(&self, slot: usize, id: WorkerId, task: TaskId) {
        self.with_worker(slot, id, |s| {
            s.record.state = WorkerState::Busy;
            s.record.current_task = Some(task);
            s.record.busy_since = None;
        });
    }

    /// Remembers (a clone of) the job the worker is executing.
    pub fn track(&self, slot: usize, id: WorkerId, job: &Job<P, R>) {
        self.with_worker(slot, id, |s| s.in_flight = Some(job.clone()));
    }

    pub fn untrack(&self, slot: usize, id: WorkerId) {
        self.with_worker(slot, id, |s| s.in_flight = None);
    }

    pub fn reset_crashes(&self, slot: usize, id: WorkerId) {
        self.with_worker(slot, id, |s| s.record.consecutive_crashes = 0);
    }

    /// Marks the slot dead after a crash and hands back its in-flight job.
    pub fn mark_crashed(&self, slot: usize, now: Instant) -> Option<CrashReport<P, R>> {
        let mut slots = self.slots.lock();
        let s = slots.get_mut(slot)?;
        s.record.state = WorkerState::Dead;
        s.record.current_task = None;
        s.record.busy_since = None;
        s.record.consecutive_crashes = s.record.consecutive_crashes.saturating_add(1);
        s.record.last_crash_at = Some(now);
        s.abort = None;
        Some(CrashReport {
            consecutive_crashes: s.record.consecutive_crashes,
            in_flight: s.in_flight.take(),
        })
    }

    /// Marks the slot stopped after a clean exit; returns any job still tracked.
    pub fn mark_stopped(&self, slot: usize) -> Option<Job<P, R>> {
        let mut slots = self.slots.lock();
        let s = slots.get_mut(slot)?;
        s.record.state = WorkerState::Stopped;
        s.record.current_task = None;
        s.record.busy_since = None;
        s.abort = None;
        s.in_flight.take()
    }

    /// Marks the slot as permanently left empty.
    pub fn retire(&self, slot: usize) {
        if let Some(s) = self.slots.lock().get_mut(slot) {
            s.record.retired = true;
        }
    }

    /// Slots left empty by the crash budget.
    pub fn retired_slots(&self) -> Vec<usize> {
        self.slots
            .lock()
            .iter()
            .filter(|s| s.record.retired)
            .map(|s| s.record.slot)
            .collect()
    }

    /// Aborts the worker with `id`. Returns `false` if it is not running.
    pub fn abort(&self, id: WorkerId) -> bool {
        let slots = self.slots.lock();
        match slots
            .iter()
            .find(|s| s.record.id == id && s.abort.is_some())
        {
            Some(s) => {
                if let Some(h) = &s.abort {
                    h.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&self) {
        for s in self.slots.lock().iter() {
            if let Some(h) = &s.abort {
                h.abort();
            }
        }
    }

    /// Flags and aborts every worker busy on one attempt for longer than `limit`.
    ///
    /// Each stall is reported once per worker incarnation.
    pub fn stalled(&self, now: Instant, limit: Duration) -> Vec<Stall<P, R>> {
        let mut slots = self.slots.lock();
        let mut out = Vec::new();
        for s in slots.iter_mut() {
            let overdue = s.record.state == WorkerState::Busy
                && s.record
                    .busy_since
                    .is_some_and(|since| now.saturating_duration_since(since) > limit);
            if !overdue || s.stalled {
                continue;
            }
            s.stalled = true;
            if let Some(h) = &s.abort {
                h.abort();
            }
            out.push(Stall {
                worker: s.record.id,
                job: s.in_flight.clone(),
            });
        }
        out
    }

    /// Takes every in-flight job (forced shutdown).
    pub fn drain_in_flight(&self) -> Vec<Job<P, R>> {
        self.slots
            .lock()
            .iter_mut()
            .filter_map(|s| s.in_flight.take())
            .collect()
    }

    /// Marks every slot that is not already stopped as stopped.
    pub fn stop_all(&self) {
        for s in self.slots.lock().iter_mut() {
            if s.record.state != WorkerState::Stopped {
                s.record.state = WorkerState::Stopped;
                s.record.current_task = None;
                s.record.busy_since = None;
            }
            s.abort = None;
        }
    }

    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.slots.lock().iter().map(|s| s.record.clone()).collect()
    }

    /// `(busy, idle)` worker counts.
    pub fn counts(&self) -> (usize, usize) {
        let slots = self.slots.lock();
        slots.iter().fold((0, 0), |(busy, idle), s| match s.record.state {
            WorkerState::Busy => (busy + 1, idle),
            WorkerState::Idle => (busy, idle + 1),
            WorkerState::Dead | WorkerState::Stopped => (busy, idle),
        })
    }

    fn with_worker(&self, slot: usize, id: WorkerId, f: impl FnOnce(&mut Slot<P, R>)) {
        let mut slots = self.slots.lock();
        if let Some(s) = slots.get_mut(slot) {
            if s.record.id == id {
                f(s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::pending;

    fn job(id: u64) -> Job<u32, u32> {
        let (completer, _rx) = pending(TaskId::new(id));
        Job {
            id: TaskId::new(id),
            payload: 0,
            submitted_at: Instant::now(),
            deadline: None,
            attempt: 0,
            max_attempts: 2,
            completer,
        }
    }

    #[test]
    fn busy_idle_counts() {
        let reg = Registry::<u32, u32>::new(3);
        reg.install(0, WorkerId::new(1), None);
        reg.install(1, WorkerId::new(2), None);
        reg.set_idle(0, WorkerId::new(1));
        reg.set_busy(1, WorkerId::new(2), TaskId::new(9), Instant::now());
        assert_eq!(reg.counts(), (1, 1));
        assert_eq!(reg.snapshot().len(), 3);
    }

    #[test]
    fn stale_worker_updates_are_ignored() {
        let reg = Registry::<u32, u32>::new(1);
        reg.install(0, WorkerId::new(1), None);
        reg.install(0, WorkerId::new(2), None);
        reg.set_busy(0, WorkerId::new(1), TaskId::new(1), Instant::now());
        assert_eq!(reg.snapshot()[0].state, WorkerState::Dead);
    }

    #[test]
    fn crash_hands_back_job_and_counts() {
        let reg = Registry::<u32, u32>::new(1);
        let w = WorkerId::new(5);
        reg.install(0, w, None);
        reg.track(0, w, &job(42));

        let now = Instant::now();
        let report = reg.mark_crashed(0, now).unwrap();
        assert_eq!(report.consecutive_crashes, 1);
        assert_eq!(report.in_flight.map(|j| j.id), Some(TaskId::new(42)));

        // counters carry across a respawn
        reg.install(0, WorkerId::new(6), None);
        let again = reg.mark_crashed(0, now).unwrap();
        assert_eq!(again.consecutive_crashes, 2);
        assert!(again.in_flight.is_none());

        reg.install(0, WorkerId::new(7), None);
        reg.reset_crashes(0, WorkerId::new(7));
        assert_eq!(reg.snapshot()[0].consecutive_crashes, 0);
    }

    #[test]
    fn stall_reported_once() {
        let reg = Registry::<u32, u32>::new(1);
        let w = WorkerId::new(1);
        reg.install(0, w, None);
        let start = Instant::now();
        reg.set_busy(0, w, TaskId::new(3), start);
        reg.track(0, w, &job(3));

        let later = start + Duration::from_secs(2);
        assert!(reg.stalled(later, Duration::from_secs(5)).is_empty());

        let stalls = reg.stalled(later, Duration::from_secs(1));
        assert_eq!(stalls.len(), 1);
        assert_eq!(stalls[0].worker, w);
        assert_eq!(stalls[0].job.as_ref().map(|j| j.id), Some(TaskId::new(3)));
        assert!(reg.stalled(later, Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn abort_unknown_worker_is_false() {
        let reg = Registry::<u32, u32>::new(1);
        assert!(!reg.abort(WorkerId::new(99)));
    }
}
