//! Shared application state.
//!
//! Built once at startup; everything inside is either immutable for the
//! process lifetime or guarded by its own synchronization.

use std::ops::Deref;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::ApiKeySet;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::jobs::{DurableStore, JobStore, MemoryStore};
use crate::ratelimit::RateLimiter;

pub struct Inner {
    pub config: ServerConfig,
    pub engine: Engine,
    pub keys: ApiKeySet,
    pub limiter: RateLimiter,
    pub store: JobStore,
    /// Fired once on shutdown; workers and in-flight jobs observe it.
    pub shutdown: CancellationToken,
}

/// Cheaply cloneable handle passed to every route and worker.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl Deref for AppState {
    type Target = Inner;

    fn deref(&self) -> &Inner {
        &self.0
    }
}

impl AppState {
    pub fn new(config: ServerConfig, engine: Engine, keys: ApiKeySet, store: JobStore) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_per_minute, config.rate_limit_burst);
        Self(Arc::new(Inner {
            config,
            engine,
            keys,
            limiter,
            store,
            shutdown: CancellationToken::new(),
        }))
    }

    /// Builds the full state from the environment: engine mode, API keys,
    /// and the job store variant (durable when `DATABASE_URL` is set).
    pub async fn from_env(config: ServerConfig) -> anyhow::Result<Self> {
        let engine = Engine::from_env();
        let keys = ApiKeySet::from_env();
        let store = match &config.database_url {
            Some(url) => {
                let durable = DurableStore::connect(url, config.db_max_conns).await?;
                JobStore::Durable(durable)
            }
            None => JobStore::Memory(MemoryStore::new(engine.clone(), config.timeout)),
        };
        Ok(Self::new(config, engine, keys, store))
    }
}
