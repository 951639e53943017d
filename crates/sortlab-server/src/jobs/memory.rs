//! In-memory job store: a map guarded by a reader/writer lock, per-record
//! locks for the mutable fields, and one spawned task per job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::{JobRecord, JobStatus, execute};
use crate::engine::Engine;
use crate::validate::RunRequest;

/// One job's mutable state. Guarded by the slot lock so the worker task
/// and polling readers never see a half-written transition.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    error: Option<String>,
    result: Option<Vec<u8>>,
    created_at: chrono::DateTime<Utc>,
    started_at: Option<chrono::DateTime<Utc>>,
    finished_at: Option<chrono::DateTime<Utc>>,
    duration_ms: Option<i64>,
}

#[derive(Debug)]
struct JobSlot {
    cancel: CancellationToken,
    state: Mutex<JobState>,
}

/// Map-backed store running each job on its own tokio task.
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, Arc<JobSlot>>>,
    engine: Engine,
    timeout: Duration,
}

impl MemoryStore {
    pub fn new(engine: Engine, timeout: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            engine,
            timeout,
        }
    }

    /// Creates a pending record and spawns its runner task.
    pub fn enqueue(&self, request: RunRequest) -> String {
        let id = next_id();
        let slot = Arc::new(JobSlot {
            cancel: CancellationToken::new(),
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                error: None,
                result: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                duration_ms: None,
            }),
        });
        self.jobs
            .write()
            .expect("job map lock poisoned")
            .insert(id.clone(), Arc::clone(&slot));

        let engine = self.engine.clone();
        let timeout = self.timeout;
        let task_id = id.clone();
        tokio::spawn(async move {
            run_job(engine, timeout, task_id, slot, request).await;
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        let slot = Arc::clone(self.jobs.read().expect("job map lock poisoned").get(id)?);
        let state = slot.state.lock().expect("job state lock poisoned");
        Some(JobRecord {
            id: id.to_string(),
            status: state.status,
            error: state.error.clone(),
            result: state.result.clone(),
            created_at: state.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            duration_ms: state.duration_ms,
        })
    }

    /// Signals the job's cancel token. Returns `false` for unknown ids.
    /// Canceling a terminal job changes nothing.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(slot) = self
            .jobs
            .read()
            .expect("job map lock poisoned")
            .get(id)
            .map(Arc::clone)
        else {
            return false;
        };
        slot.cancel.cancel();
        true
    }

    /// Records in `{pending, running}`.
    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .expect("job map lock poisoned")
            .values()
            .filter(|slot| {
                !slot
                    .state
                    .lock()
                    .expect("job state lock poisoned")
                    .status
                    .is_terminal()
            })
            .count()
    }

    /// Signals every non-terminal record's cancel token.
    pub fn cancel_all(&self) {
        for slot in self.jobs.read().expect("job map lock poisoned").values() {
            let terminal = slot
                .state
                .lock()
                .expect("job state lock poisoned")
                .status
                .is_terminal();
            if !terminal {
                slot.cancel.cancel();
            }
        }
    }
}

async fn run_job(
    engine: Engine,
    timeout: Duration,
    id: String,
    slot: Arc<JobSlot>,
    request: RunRequest,
) {
    {
        let mut state = slot.state.lock().expect("job state lock poisoned");
        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
    }

    let call = super::JobStore::call_for(&request);
    let outcome = execute(&engine, &call, timeout, &slot.cancel).await;

    let mut state = slot.state.lock().expect("job state lock poisoned");
    if state.status.is_terminal() {
        return;
    }
    state.status = outcome.status;
    state.result = outcome.result;
    state.error = outcome.error;
    state.finished_at = Some(Utc::now());
    state.duration_ms = Some(outcome.elapsed.as_millis() as i64);
    tracing::info!(
        job_id = %id,
        status = outcome.status.as_str(),
        duration_ms = state.duration_ms,
        "job finished"
    );
}

/// Time-derived opaque id, unique enough for a single process.
fn next_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos}{seq:03}")
}
