//! # Example: crash_recovery
//!
//! Shows the supervisor replacing crashed workers, the crash budget tripping
//! and an operator bringing the pool back with [`Pool::recover`].
//!
//! Workers are "crashed" with [`Pool::kill_worker`], which aborts the worker's
//! tokio task exactly like a fault outside the handler would.
//!
//! ## Flow
//! ```text
//! kill worker ─► WorkerCrashed ─► in-flight task retried on the replacement
//! kill again  ─► crash budget (1 per 10s) exceeded ─► PoolDegraded, slot retired
//! submit      ─► Err(CrashBudgetExceeded)
//! recover()   ─► PoolRecovered ─► submit works again
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example crash_recovery
//! ```

use std::time::Duration;

use poolvisor::{
    BackoffPolicy, EventKind, HandlerFn, HandlerRef, Pool, PoolConfig, PoolError, TaskError,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    // 1. One worker, so every crash hits the same slot.
    let cfg = PoolConfig {
        size: 1,
        max_retries: 3,
        crash_budget: 1,
        crash_window: Duration::from_secs(10),
        respawn_backoff: BackoffPolicy::exponential(Duration::from_millis(50), Duration::from_secs(1)),
        ..PoolConfig::default()
    };

    // 2. Slow work: long enough to kill the worker mid-task.
    let handler: HandlerRef<u32, u32> = HandlerFn::arc("slow-echo", |n: u32, ctx: CancellationToken| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(300)) => Ok(n),
            _ = ctx.cancelled() => Err(TaskError::Canceled),
        }
    });
    let pool = Pool::new(cfg, handler)?;

    // 3. Print crash-related events as they happen.
    let mut events = pool.subscribe_events();
    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            if matches!(
                ev.kind,
                EventKind::WorkerCrashed
                    | EventKind::WorkerSpawned
                    | EventKind::PoolDegraded
                    | EventKind::WorkerRetired
                    | EventKind::PoolRecovered
            ) {
                println!("[event] {:?} worker={:?} reason={:?}", ev.kind, ev.worker, ev.reason);
            }
        }
    });

    // 4. First crash: the task survives on the replacement worker.
    let survivor = pool.submit(1, None)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let victim = pool.workers()[0].id;
    println!("[main] killing {victim}: {}", pool.kill_worker(victim));
    println!("[main] task 1 -> {:?}", survivor.await);

    // 5. Second crash inside the window: the pool degrades.
    let doomed = pool.submit(2, None)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let victim = pool.workers()[0].id;
    println!("[main] killing {victim}: {}", pool.kill_worker(victim));
    println!("[main] task 2 -> {:?}", doomed.await);

    match pool.submit(3, None) {
        Err(err @ PoolError::CrashBudgetExceeded { .. }) => println!("[main] submit rejected: {err}"),
        other => println!("[main] unexpected: {other:?}"),
    }
    println!("[main] stats: {:?}", pool.stats());

    // 6. Operator intervention.
    pool.recover().await?;
    println!("[main] task 4 -> {:?}", pool.submit(4, None)?.await);

    pool.shutdown(None).await?;
    println!("[main] done.");
    Ok(())
}
