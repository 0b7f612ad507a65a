use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PoolConfig,
    core::{pool::Pool, shared::Shared, supervisor::Supervisor},
    error::PoolError,
    events::{Bus, Event},
    jobs::HandlerRef,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Pool`] with optional event subscribers.
///
/// ```rust
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use poolvisor::{HandlerFn, HandlerRef, Pool, PoolConfig, Subscribe, TaskError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let handler: HandlerRef<u64, u64> = HandlerFn::arc("double", |n: u64, _ctx: CancellationToken| async move {
///     Ok::<_, TaskError>(n * 2)
/// });
/// let subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
/// let pool = Pool::builder(PoolConfig::with_size(2), handler)
///     .with_subscribers(subscribers)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.submit(21, None).unwrap().await, Ok(42));
/// pool.shutdown(None).await.unwrap();
/// # }
/// ```
pub struct PoolBuilder<P, R> {
    cfg: PoolConfig,
    handler: HandlerRef<P, R>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<P, R> PoolBuilder<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    /// Creates a builder for `handler` running under `cfg`.
    pub fn new(cfg: PoolConfig, handler: HandlerRef<P, R>) -> Self {
        Self {
            cfg,
            handler,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every pool event through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Validates the configuration and starts the pool.
    ///
    /// Spawns the supervisor (which spawns `size` workers) and, if any
    /// subscribers were given, the event listener.
    ///
    /// # Errors
    /// [`PoolError::InvalidConfig`] if the configuration is invalid or no tokio
    /// runtime is running.
    pub fn build(self) -> Result<Pool<P, R>, PoolError> {
        self.cfg.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(PoolError::InvalidConfig {
                reason: "a pool must be built inside a tokio runtime".into(),
            });
        }

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let stop = CancellationToken::new();
            let rx = bus.subscribe();
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            let handle = tokio::spawn(subscriber_listener(rx, set, stop.clone()));
            Some((handle, stop))
        };

        tracing::debug!(
            handler = self.handler.name(),
            size = self.cfg.size,
            queue_capacity = self.cfg.queue_capacity,
            "starting pool"
        );
        let shared = Arc::new(Shared::new(self.cfg, self.handler, bus));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Supervisor::new(Arc::clone(&shared), rx).run());

        Ok(Pool::from_parts(shared, tx, listener))
    }
}

/// Forwards bus events to the subscriber set until `stop`, then flushes and shuts it down.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = stop.cancelled() => {
                while let Ok(ev) = rx.try_recv() {
                    set.emit(&ev);
                }
                break;
            }
        }
    }
    set.shutdown().await;
}
