//! Async job lifecycle: records, the store capability surface, and the
//! execution path shared by both store variants.
//!
//! A job moves `pending → running → {done, failed, canceled}`; terminal
//! states are sticky. The store is a capability surface
//! `{enqueue, get, cancel, active_count}` with two implementations behind
//! exhaustive enum dispatch; metrics hooks live here so both variants
//! record identically.

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::MemoryStore;

use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use sortlab_core::EngineError;

use crate::engine::Engine;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::validate::{EngineCall, RunRequest, build_engine_call};

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Canceled)
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            _ => Err(()),
        }
    }
}

/// Point-in-time snapshot of one job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Raw engine JSON, present iff `status == Done`.
    pub result: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Wire shape of a job record. The stored result bytes are embedded
/// verbatim so repeated polls of a terminal job are byte-identical.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl JobRecord {
    pub fn into_response(self) -> JobResponse {
        let result = self.result.and_then(|bytes| {
            String::from_utf8(bytes)
                .ok()
                .and_then(|s| RawValue::from_string(s).ok())
        });
        JobResponse {
            id: self.id,
            status: self.status.as_str(),
            error: self.error,
            result,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms,
        }
    }
}

/// Terminal outcome of executing one job.
#[derive(Debug)]
pub(crate) struct ExecOutcome {
    pub status: JobStatus,
    pub result: Option<Vec<u8>>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Runs the engine for one job and classifies the outcome.
///
/// Both store variants funnel through here, so the running gauge and the
/// completion counters stay consistent across them. Cancellation and the
/// deadline both classify as `canceled`, never `failed`.
pub(crate) async fn execute(
    engine: &Engine,
    call: &EngineCall,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ExecOutcome {
    let started = Instant::now();
    Metrics::global().job_started();
    let (status, result, error) = match engine.run(call, timeout, cancel).await {
        Ok(bytes) => (JobStatus::Done, Some(bytes), None),
        Err(EngineError::Canceled) => {
            (JobStatus::Canceled, None, Some("canceled".to_string()))
        }
        Err(err) => (JobStatus::Failed, None, Some(err.to_string())),
    };
    let elapsed = started.elapsed();
    Metrics::global().job_finished(status.as_str(), elapsed);
    ExecOutcome {
        status,
        result,
        error,
        elapsed,
    }
}

/// The job store: one capability surface, two implementations.
///
/// Callers must not reach behind this enum; everything they need is a
/// method here.
pub enum JobStore {
    Memory(MemoryStore),
    Durable(DurableStore),
}

impl JobStore {
    /// Accepts a validated request and returns the new job id.
    pub async fn enqueue(&self, request: RunRequest) -> Result<String, ApiError> {
        let id = match self {
            JobStore::Memory(store) => store.enqueue(request),
            JobStore::Durable(store) => store.enqueue(&request).await?,
        };
        Metrics::global().job_submitted();
        tracing::info!(job_id = %id, "job enqueued");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<JobRecord, ApiError> {
        match self {
            JobStore::Memory(store) => store.get(id).ok_or(ApiError::NotFound),
            JobStore::Durable(store) => store.get(id).await?.ok_or(ApiError::NotFound),
        }
    }

    /// Requests cancellation. Terminal jobs are a no-op; unknown ids fail
    /// with `NotFound`.
    pub async fn cancel(&self, id: &str) -> Result<(), ApiError> {
        let found = match self {
            JobStore::Memory(store) => store.cancel(id),
            JobStore::Durable(store) => store.cancel(id).await?,
        };
        if found {
            tracing::info!(job_id = %id, "cancel requested");
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }

    /// Jobs currently in `{pending, running}`.
    pub async fn active_count(&self) -> Result<usize, ApiError> {
        match self {
            JobStore::Memory(store) => Ok(store.active_count()),
            JobStore::Durable(store) => Ok(store.active_count().await? as usize),
        }
    }

    /// Broadcasts cancel to every job this process is executing. Durable
    /// `pending` rows are left for the next lease.
    pub async fn cancel_all(&self) {
        match self {
            JobStore::Memory(store) => store.cancel_all(),
            JobStore::Durable(store) => store.cancel_local_leases(),
        }
    }

    /// Durable-mode accessor for the worker pool.
    pub(crate) fn durable_ref(&self) -> Option<&DurableStore> {
        match self {
            JobStore::Memory(_) => None,
            JobStore::Durable(store) => Some(store),
        }
    }

    /// Builds the canonical engine call for a stored request.
    pub(crate) fn call_for(request: &RunRequest) -> EngineCall {
        build_engine_call(request)
    }
}
