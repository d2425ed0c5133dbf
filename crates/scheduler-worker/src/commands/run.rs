//! The long-running service loop: recovery sweep, then the periodic
//! Scheduler tick (claim + watchdog reclaim) and a pool of Executor workers
//! draining the Work Queue, until the process receives a shutdown signal.

use anyhow::Result;
use scheduler_core::clock::{Clock, SystemClock};
use scheduler_core::executor::Executor;
use scheduler_core::queue::{InProcessQueue, WorkQueue};
use scheduler_core::repository::PgStore;
use scheduler_core::scheduler::Scheduler;
use scheduler_core::db;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info, instrument};

use crate::config::WorkerConfig;

pub async fn run(config: WorkerConfig) -> Result<()> {
    let pool = db::establish_connection(&config.database_url).await?;
    let engine_config = config.engine;
    let time_of_day = engine_config.delivery_time()?;

    let store = Arc::new(PgStore::new(pool, time_of_day));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue: Arc<InProcessQueue> = Arc::new(InProcessQueue::new(
        chrono::Duration::seconds(engine_config.queue_visibility_timeout_seconds as i64),
        engine_config.queue_max_receive_count,
        clock.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        queue.clone(),
        clock.clone(),
        engine_config.clone(),
    ));
    let executor = Arc::new(Executor::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        engine_config.clone(),
    ));

    let recovery = scheduler.recover().await?;
    info!(
        count = recovery.count,
        publish_failures = recovery.publish_failures,
        "startup recovery sweep complete"
    );

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(ticker_loop(
        scheduler.clone(),
        engine_config.poll_interval_seconds,
    )));

    for worker_id in 0..engine_config.executor_concurrency {
        tasks.push(tokio::spawn(executor_worker_loop(
            worker_id,
            queue.clone(),
            executor.clone(),
        )));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = futures_wait_any(tasks) => {
            error!("a worker task exited unexpectedly; shutting down");
        }
    }

    Ok(())
}

/// Waits for the first of a set of spawned tasks to finish, surfacing panics
/// as a log line rather than propagating them — one dead worker shouldn't
/// mask the others' in-flight deliveries.
async fn futures_wait_any(tasks: Vec<tokio::task::JoinHandle<()>>) {
    let (result, _index, _remaining) = futures_util::future::select_all(tasks).await;
    if let Err(e) = result {
        error!(error = %e, "worker task panicked");
    }
}

#[instrument(skip(scheduler))]
async fn ticker_loop<S>(scheduler: Arc<Scheduler<S>>, poll_interval_seconds: u64)
where
    S: scheduler_core::repository::EventStore + 'static,
{
    let mut interval = tokio::time::interval(StdDuration::from_secs(poll_interval_seconds));
    loop {
        interval.tick().await;
        if let Err(e) = scheduler.tick().await {
            error!(error = %e, "scheduler tick failed");
        }
        if let Err(e) = scheduler.reclaim_stale_processing().await {
            error!(error = %e, "stale PROCESSING reclaim failed");
        }
    }
}

async fn executor_worker_loop<S, O>(
    worker_id: usize,
    queue: Arc<InProcessQueue>,
    executor: Arc<Executor<S, O>>,
) where
    S: scheduler_core::repository::EventStore + 'static,
    O: scheduler_core::repository::OwnerRepository + 'static,
{
    loop {
        let batch = queue.receive(10).await;
        if batch.is_empty() {
            tokio::time::sleep(StdDuration::from_millis(250)).await;
            continue;
        }
        for (descriptor, receipt) in batch {
            match executor.process(&descriptor).await {
                Ok(true) => queue.acknowledge(receipt).await,
                Ok(false) => {
                    // Leave in-flight for the queue's own visibility-timeout
                    // redrive; no local retry (§4.5 step 4).
                }
                Err(e) => {
                    error!(worker_id, error = %e, "executor worker failed processing descriptor");
                }
            }
        }
    }
}
