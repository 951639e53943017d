//! Server configuration from environment variables.
//!
//! Every variable is optional; defaults are chosen for a single-node
//! deployment. Caps are parsed once at startup and immutable for the
//! process lifetime.

use std::time::Duration;

/// Effective caps and wiring for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind.
    pub port: u16,
    /// Largest accepted array size.
    pub max_n: u64,
    /// Largest accepted repeat count.
    pub max_repeats: u32,
    /// Largest accepted thread cap.
    pub max_threads: u32,
    /// Admission cap on jobs in `{pending, running}`.
    pub max_jobs: usize,
    /// Server-side run deadline; requests may shorten but never extend it.
    pub timeout: Duration,
    /// Worker tasks in durable mode.
    pub workers: usize,
    /// Token-bucket refill rate, tokens per minute.
    pub rate_limit_per_minute: f64,
    /// Token-bucket capacity (burst).
    pub rate_limit_burst: f64,
    /// Honor the first `X-Forwarded-For` entry for client identity.
    pub trust_xff: bool,
    /// Reject unknown algorithm/baseline names instead of tolerating them.
    pub strict_algos: bool,
    /// SQLite URL; presence enables the durable job store.
    pub database_url: Option<String>,
    /// Connection cap for the durable pool.
    pub db_max_conns: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_n: 10_000_000,
            max_repeats: 50,
            max_threads: 256,
            max_jobs: 16,
            timeout: Duration::from_millis(120_000),
            workers: 2,
            rate_limit_per_minute: 120.0,
            rate_limit_burst: 30.0,
            trust_xff: false,
            strict_algos: false,
            database_url: None,
            db_max_conns: 5,
        }
    }
}

impl ServerConfig {
    /// Reads configuration from the process environment.
    ///
    /// Unparseable values fall back to the default with a warning rather
    /// than aborting startup.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            port: env_parse("PORT", d.port),
            max_n: env_parse("MAX_N", d.max_n),
            max_repeats: env_parse("MAX_REPEATS", d.max_repeats),
            max_threads: env_parse("MAX_THREADS", d.max_threads),
            max_jobs: env_parse("MAX_JOBS", d.max_jobs),
            timeout: Duration::from_millis(env_parse(
                "TIMEOUT_MS",
                d.timeout.as_millis() as u64,
            )),
            workers: env_parse("WORKERS", d.workers).max(1),
            rate_limit_per_minute: env_parse("RATE_LIMIT_R", d.rate_limit_per_minute),
            rate_limit_burst: env_parse("RATE_LIMIT_B", d.rate_limit_burst),
            trust_xff: env_flag("TRUST_XFF"),
            strict_algos: env_flag("STRICT_ALGOS"),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            db_max_conns: env_parse("DB_MAX_CONNS", d.db_max_conns).max(1),
        }
    }

    /// Whether the durable job store is configured.
    pub fn durable(&self) -> bool {
        self.database_url.is_some()
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(name, value = raw, "unparseable env var, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_n, 10_000_000);
        assert_eq!(cfg.max_repeats, 50);
        assert_eq!(cfg.timeout, Duration::from_secs(120));
        assert!(!cfg.durable());
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        // Unset name: default.
        assert_eq!(env_parse::<u16>("SORTLAB_TEST_UNSET_PORT", 1234), 1234);
    }
}
