//! # Example: basic_pool
//!
//! Runs a pool of three workers over a flaky handler and logs every pool event
//! through [`LogWriter`] and `tracing-subscriber`.
//!
//! Every third payload fails once before succeeding, so the output shows
//! retries with backoff next to plain completions.
//!
//! ## Flow
//! ```text
//! submit(n) ─► TaskSubmitted
//!   worker ─► TaskStarting(attempt=0)
//!     ├─ n % 3 != 0 ─► TaskCompleted
//!     └─ n % 3 == 0 ─► TaskFailed ─► RetryScheduled ─► TaskStarting(attempt=1) ─► TaskCompleted
//! shutdown(2s) ─► ShutdownRequested ─► AllDrainedWithin
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=poolvisor=debug cargo run --example basic_pool --features logging
//! ```

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use poolvisor::{
    BackoffPolicy, HandlerFn, HandlerRef, JitterPolicy, LogWriter, Pool, PoolConfig, Subscribe,
    TaskError,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "poolvisor=info".into()))
        .init();

    // 1. Three workers, room for eight waiting tasks, 1s per attempt, one retry.
    let cfg = PoolConfig {
        size: 3,
        queue_capacity: 8,
        task_timeout: Duration::from_secs(1),
        max_retries: 1,
        retry_backoff: BackoffPolicy::exponential(Duration::from_millis(50), Duration::from_secs(1))
            .with_jitter(JitterPolicy::Equal),
        ..PoolConfig::default()
    };

    // 2. A handler that fails the first attempt of every third payload.
    let failed_once = Arc::new(Mutex::new(HashSet::new()));
    let handler: HandlerRef<u64, String> = HandlerFn::arc("flaky-square", move |n: u64, ctx: CancellationToken| {
        let failed_once = Arc::clone(&failed_once);
        async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(20 * n)) => {}
                _ = ctx.cancelled() => return Err(TaskError::Canceled),
            }
            let first_time = failed_once
                .lock()
                .map(|mut seen| n % 3 == 0 && seen.insert(n))
                .unwrap_or(false);
            if first_time {
                return Err(TaskError::Fail {
                    error: format!("{n} is unlucky"),
                });
            }
            Ok(format!("{n}² = {}", n * n))
        }
    });

    // 3. Build the pool with the logging subscriber.
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let pool = Pool::builder(cfg, handler).with_subscribers(subs).build()?;

    // 4. Submit; the queue is bounded, so keep the batch within capacity.
    let mut pending = Vec::new();
    for n in 1..=10 {
        pending.push(pool.submit(n, None)?);
    }
    for result in pending {
        match result.await {
            Ok(line) => println!("[main] {line}"),
            Err(err) => println!("[main] failed: {err}"),
        }
    }

    let stats = pool.stats();
    println!(
        "[main] state={:?} idle={} crashes={}",
        stats.state, stats.idle_workers, stats.crashes
    );

    // 5. Drain and stop.
    pool.shutdown(Some(Duration::from_secs(2))).await?;
    println!("[main] done.");
    Ok(())
}
