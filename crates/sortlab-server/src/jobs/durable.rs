//! Durable job store backed by SQLite.
//!
//! Enqueue inserts a `pending` row; workers claim one row at a time with an
//! atomic `UPDATE … WHERE id = (SELECT … LIMIT 1) RETURNING …`, which under
//! SQLite's serialized writes hands each pending job to exactly one worker.
//! Cancel tokens for leased jobs live in a process-local map populated on
//! lease and cleared on completion; they are never persisted.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use tokio_util::sync::CancellationToken;

use super::{ExecOutcome, JobRecord, JobStatus};
use crate::validate::RunRequest;

/// A pending job claimed by this process.
pub(crate) struct LeasedJob {
    pub id: String,
    pub request: RunRequest,
}

/// SQLite-backed store with leased dispatch.
pub struct DurableStore {
    pool: SqlitePool,
    /// Cancel handles for jobs leased by this process, keyed by job id.
    /// Valid only while the job is leased.
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl DurableStore {
    /// Opens the pool (WAL, busy timeout) and applies migrations.
    pub async fn connect(url: &str, max_conns: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_conns)
            .connect_with(options)
            .await?;
        crate::migrate::run(&pool).await?;
        tracing::info!(url, max_conns, "durable job store opened");
        Ok(Self {
            pool,
            cancels: Mutex::new(HashMap::new()),
        })
    }

    /// Inserts a `pending` row and returns its id.
    pub async fn enqueue(&self, request: &RunRequest) -> Result<String, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let request_json =
            serde_json::to_string(request).expect("request serializes infallibly");
        sqlx::query(
            "INSERT INTO jobs (id, status, request_json, created_at, dist, elem_type, \
             repeats, threads, baseline, algos, mode) \
             VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, 'async')",
        )
        .bind(&id)
        .bind(request_json)
        .bind(Utc::now())
        .bind(&request.dist)
        .bind(&request.elem_type)
        .bind(request.repeats)
        .bind(request.threads)
        .bind(&request.baseline)
        .bind(request.algos.join(","))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<JobRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, status, error, result_json, created_at, started_at, \
             finished_at, duration_ms FROM jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(JobRecord {
            id: row.try_get("id")?,
            status: status.parse().unwrap_or(JobStatus::Failed),
            error: row.try_get("error")?,
            result: row
                .try_get::<Option<String>, _>("result_json")?
                .map(String::into_bytes),
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            duration_ms: row.try_get("duration_ms")?,
        }))
    }

    /// Requests cancellation; returns `false` when the id is unknown.
    ///
    /// A job leased by this process gets its token fired; in all cases a
    /// still-`pending` row transitions straight to `canceled`.
    pub async fn cancel(&self, id: &str) -> Result<bool, sqlx::Error> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }
        if let Some(token) = self
            .cancels
            .lock()
            .expect("cancel map lock poisoned")
            .get(id)
        {
            token.cancel();
        }
        sqlx::query(
            "UPDATE jobs SET status = 'canceled', error = '', finished_at = ?, \
             duration_ms = 0 WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    /// Jobs in `{pending, running}`.
    pub async fn active_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'running')",
        )
        .fetch_one(&self.pool)
        .await
    }

    /// Pending rows awaiting a worker.
    pub async fn queue_depth(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
    }

    /// Atomically claims the oldest pending job, transitioning it to
    /// `running`. Returns `None` when the queue is empty.
    pub(crate) async fn lease(&self) -> Result<Option<LeasedJob>, sqlx::Error> {
        let row = sqlx::query(
            "UPDATE jobs SET status = 'running', started_at = ? \
             WHERE id = (SELECT id FROM jobs WHERE status = 'pending' \
                         ORDER BY created_at ASC, id ASC LIMIT 1) \
             RETURNING id, request_json",
        )
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id")?;
        let request_json: String = row.try_get("request_json")?;
        let request: RunRequest = serde_json::from_str(&request_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Some(LeasedJob { id, request }))
    }

    /// Writes the terminal row for a job this process leased.
    pub(crate) async fn finish(
        &self,
        id: &str,
        outcome: &ExecOutcome,
    ) -> Result<(), sqlx::Error> {
        let result_json = outcome
            .result
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        sqlx::query(
            "UPDATE jobs SET status = ?, result_json = ?, error = ?, finished_at = ?, \
             duration_ms = ? WHERE id = ? AND status = 'running'",
        )
        .bind(outcome.status.as_str())
        .bind(result_json)
        .bind(&outcome.error)
        .bind(Utc::now())
        .bind(outcome.elapsed.as_millis() as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Installs the cancel handle for a freshly leased job.
    pub(crate) fn register_cancel(&self, id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancels
            .lock()
            .expect("cancel map lock poisoned")
            .insert(id.to_string(), token.clone());
        token
    }

    /// Drops the cancel handle once the job reached a terminal state.
    pub(crate) fn clear_cancel(&self, id: &str) {
        self.cancels
            .lock()
            .expect("cancel map lock poisoned")
            .remove(id);
    }

    /// Cancels every job currently leased by this process. Pending rows are
    /// left untouched for the next instance to lease.
    pub fn cancel_local_leases(&self) {
        for token in self
            .cancels
            .lock()
            .expect("cancel map lock poisoned")
            .values()
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn store() -> (DurableStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let store = DurableStore::connect(&url, 4).await.unwrap();
        (store, dir)
    }

    fn request() -> RunRequest {
        RunRequest {
            n: 256,
            dist: "runs".to_string(),
            elem_type: "i32".to_string(),
            repeats: 1,
            algos: vec!["std_sort".to_string()],
            ..RunRequest::default()
        }
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips() {
        let (store, _dir) = store().await;
        let id = store.enqueue(&request()).await.unwrap();
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.result.is_none());
        assert!(record.started_at.is_none());
        assert_eq!(store.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lease_claims_oldest_pending_exactly_once() {
        let (store, _dir) = store().await;
        let first = store.enqueue(&request()).await.unwrap();
        let second = store.enqueue(&request()).await.unwrap();

        let lease_a = store.lease().await.unwrap().unwrap();
        assert_eq!(lease_a.id, first);
        let lease_b = store.lease().await.unwrap().unwrap();
        assert_eq!(lease_b.id, second);
        assert!(store.lease().await.unwrap().is_none());

        let record = store.get(&first).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.started_at.is_some());
    }

    #[tokio::test]
    async fn finish_writes_terminal_row() {
        let (store, _dir) = store().await;
        let id = store.enqueue(&request()).await.unwrap();
        store.lease().await.unwrap().unwrap();

        let outcome = ExecOutcome {
            status: JobStatus::Done,
            result: Some(b"[]".to_vec()),
            error: None,
            elapsed: Duration::from_millis(42),
        };
        store.finish(&id, &outcome).await.unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.result.as_deref(), Some(b"[]".as_slice()));
        assert_eq!(record.duration_ms, Some(42));
        assert!(record.finished_at.is_some());
        assert_eq!(store.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_pending_job_skips_running() {
        let (store, _dir) = store().await;
        let id = store.enqueue(&request()).await.unwrap();
        assert!(store.cancel(&id).await.unwrap());

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Canceled);
        assert_eq!(record.error.as_deref(), Some(""));
        assert!(record.started_at.is_none());

        // A canceled row is no longer leaseable.
        assert!(store.lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_unknown_id_reports_not_found() {
        let (store, _dir) = store().await;
        assert!(!store.cancel("missing").await.unwrap());
    }

    #[tokio::test]
    async fn cancel_fires_registered_token() {
        let (store, _dir) = store().await;
        let id = store.enqueue(&request()).await.unwrap();
        store.lease().await.unwrap().unwrap();
        let token = store.register_cancel(&id);
        assert!(store.cancel(&id).await.unwrap());
        assert!(token.is_cancelled());

        // Running row was not flipped by the SQL path; the worker owns the
        // terminal write.
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Running);
        store.clear_cancel(&id);
    }

    #[tokio::test]
    async fn queue_depth_counts_pending_only() {
        let (store, _dir) = store().await;
        store.enqueue(&request()).await.unwrap();
        store.enqueue(&request()).await.unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 2);
        store.lease().await.unwrap().unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 1);
    }
}
