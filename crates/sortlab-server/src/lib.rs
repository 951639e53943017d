//! # sortlab-server: the benchmark engine as a networked service
//!
//! Clients describe a sort workload and receive timing statistics per
//! algorithm, either synchronously (`POST /run`) or through a polled job
//! (`POST /jobs`). The service layers API-key auth, per-client token-bucket
//! rate limiting, request validation, admission control, and Prometheus
//! metrics over the engine in `sortlab-core`.
//!
//! ## Job stores
//!
//! Two variants behind one capability surface:
//! - **memory**: a locked map, one tokio task per job. The default.
//! - **durable**: a SQLite table with leased dispatch and a worker pool,
//!   enabled by `DATABASE_URL`. Pending jobs survive restarts.
//!
//! ```text
//! sync:  client → auth → rate limit → validate → engine → JSON rows
//! async: client → enqueue (pending) → worker lease → engine → terminal row
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod migrate;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod validate;
pub mod worker;

#[cfg(test)]
mod tests;

pub use config::ServerConfig;
pub use routes::router;
pub use state::AppState;
