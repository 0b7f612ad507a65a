//! # Bounded FIFO job queue.
//!
//! [`JobQueue`] is the pool's only buffer and its source of backpressure.
//!
//! ## Admission
//! A push is accepted while `len < capacity + parked`, where `parked` counts workers
//! currently waiting inside [`JobQueue::pop_claimed`]. Jobs admitted on a parked worker's
//! credit are hand-offs: that worker takes them as soon as it wakes, so they never
//! occupy the waiting room. With `capacity = 0` the queue is a pure rendezvous.
//!
//! ```text
//! push ──► [len < cap + parked?] ──yes──► VecDeque::push_back ──► notify_one
//!                 │ no
//!                 ▼
//!            QueueFull
//!
//! pop  ──► parked += 1 ──► pop_front? ──► Some(job)
//!                           │ empty & closed ──► None
//!                           └ empty ──► wait for notify ──► retry
//! ```
//!
//! ## Rules
//! - Strict FIFO; ties are insertion order.
//! - Never blocks the pusher.
//! - `close()` rejects pushes and wakes every parked worker; waiting jobs still drain.
//! - `requeue` bypasses admission: a crash retry is never refused.
//! - No lock is held across an `.await`.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::PoolError;

struct QueueState<T> {
    items: VecDeque<T>,
    parked: usize,
    closed: bool,
}

/// Bounded multi-producer multi-consumer FIFO with fail-fast admission.
pub(crate) struct JobQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> JobQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                parked: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends `item`, or fails with `QueueFull` / `Closed` handing the item back.
    pub fn push(&self, item: T) -> Result<(), (PoolError, T)> {
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err((PoolError::Closed, item));
            }
            if st.items.len() >= self.capacity + st.parked {
                return Err((
                    PoolError::QueueFull {
                        capacity: self.capacity,
                    },
                    item,
                ));
            }
            st.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Puts `item` back at the head of the queue, ignoring capacity and `close()`.
    ///
    /// Used for crash retries that must not be lost to backpressure.
    pub fn requeue(&self, item: T) {
        self.state.lock().items.push_front(item);
        self.notify.notify_one();
    }

    #[cfg(test)]
    pub async fn pop(&self) -> Option<T> {
        self.pop_claimed(|_| {}).await
    }

    /// Waits for the next item in FIFO order and runs `claim` on it before the
    /// queue lock is released.
    ///
    /// Returns `None` once the queue is closed and empty. Cancel-safe: dropping
    /// the future never loses an item.
    pub async fn pop_claimed(&self, claim: impl Fn(&T)) -> Option<T> {
        let _parked = Parked::enter(self);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.state.lock();
                if let Some(item) = st.items.pop_front() {
                    claim(&item);
                    return Some(item);
                }
                if st.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stops admission and wakes every parked worker.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Removes and returns every waiting item.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Counts a worker as parked for as long as it sits inside `pop_claimed`.
struct Parked<'a, T> {
    queue: &'a JobQueue<T>,
}

impl<'a, T> Parked<'a, T> {
    fn enter(queue: &'a JobQueue<T>) -> Self {
        queue.state.lock().parked += 1;
        Self { queue }
    }
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        let mut st = self.queue.state.lock();
        st.parked -= 1;
        // A hand-off admitted on this worker's credit may now be unclaimed;
        // let another parked worker have a look.
        if !st.items.is_empty() {
            drop(st);
            self.queue.notify.notify_one();
        }
    }
}
