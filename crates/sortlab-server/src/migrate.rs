//! SQL migrations for the durable job store.
//!
//! One migration so far. Applied versions are tracked in
//! `schema_migrations`; applying is idempotent and safe to run on every
//! startup.

use sqlx::SqlitePool;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_001)];

const MIGRATION_001: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    status        TEXT NOT NULL,
    request_json  TEXT NOT NULL,
    result_json   TEXT,
    error         TEXT,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    finished_at   TEXT,
    duration_ms   INTEGER,
    dist          TEXT NOT NULL,
    elem_type     TEXT NOT NULL,
    repeats       INTEGER NOT NULL,
    threads       INTEGER NOT NULL,
    baseline      TEXT,
    algos         TEXT NOT NULL,
    mode          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status);
CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_status_created_at ON jobs (status, created_at);
"#;

/// Applies any migrations not yet recorded in `schema_migrations`.
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    for (version, sql) in MIGRATIONS {
        let applied: Option<i64> =
            sqlx::query_scalar("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(version)
                .fetch_optional(pool)
                .await?;
        if applied.is_some() {
            continue;
        }
        sqlx::raw_sql(sql).execute(pool).await?;
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now())
            .execute(pool)
            .await?;
        tracing::info!(version, "migration applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migration_creates_jobs_table() {
        let pool = pool().await;
        run(&pool).await.unwrap();
        sqlx::query("SELECT id, status FROM jobs LIMIT 1")
            .fetch_optional(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let pool = pool().await;
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();
        let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(versions, vec![1]);
    }

    #[tokio::test]
    async fn indexes_exist() {
        let pool = pool().await;
        run(&pool).await.unwrap();
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'jobs'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert!(names.contains(&"idx_jobs_status".to_string()));
        assert!(names.contains(&"idx_jobs_created_at".to_string()));
        assert!(names.contains(&"idx_jobs_status_created_at".to_string()));
    }
}
