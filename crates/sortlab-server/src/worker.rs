//! Worker pool for the durable job store.
//!
//! Each worker loops: sample queue depth, try to lease the oldest pending
//! job, run it under the server deadline with a per-job cancel token, and
//! write the terminal row. No automatic retries; execution is at-most-once.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::jobs::{JobStore, execute};
use crate::metrics::Metrics;
use crate::state::AppState;

/// Pause between lease attempts when the queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(100);
/// Backoff after a storage error before retrying the lease loop.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Spawns the configured number of workers. No-op in memory mode.
pub fn spawn_workers(state: &AppState) -> Vec<JoinHandle<()>> {
    if state.store.durable_ref().is_none() {
        return Vec::new();
    }
    (0..state.config.workers)
        .map(|index| {
            let state = state.clone();
            tokio::spawn(async move {
                worker_loop(index, state).await;
            })
        })
        .collect()
}

async fn worker_loop(index: usize, state: AppState) {
    let Some(store) = state.store.durable_ref() else {
        return;
    };
    tracing::info!(worker = index, "worker started");

    loop {
        if state.shutdown.is_cancelled() {
            break;
        }

        match store.queue_depth().await {
            Ok(depth) => Metrics::global().set_queue_depth(depth),
            Err(err) => tracing::warn!(worker = index, error = %err, "queue depth query failed"),
        }

        match store.lease().await {
            Ok(Some(leased)) => {
                let token = store.register_cancel(&leased.id);
                Metrics::global().worker_busy(true);
                tracing::info!(worker = index, job_id = %leased.id, "job leased");

                let call = JobStore::call_for(&leased.request);
                let outcome = execute(&state.engine, &call, state.config.timeout, &token).await;
                if let Err(err) = store.finish(&leased.id, &outcome).await {
                    tracing::error!(
                        worker = index,
                        job_id = %leased.id,
                        error = %err,
                        "failed to record job outcome"
                    );
                }

                store.clear_cancel(&leased.id);
                Metrics::global().worker_busy(false);
                tracing::info!(
                    worker = index,
                    job_id = %leased.id,
                    status = outcome.status.as_str(),
                    "job finished"
                );
            }
            Ok(None) => {
                tokio::select! {
                    () = tokio::time::sleep(IDLE_SLEEP) => {}
                    () = state.shutdown.cancelled() => break,
                }
            }
            Err(err) => {
                tracing::warn!(worker = index, error = %err, "lease failed, backing off");
                tokio::select! {
                    () = tokio::time::sleep(ERROR_BACKOFF) => {}
                    () = state.shutdown.cancelled() => break,
                }
            }
        }
    }

    tracing::info!(worker = index, "worker stopped");
}
