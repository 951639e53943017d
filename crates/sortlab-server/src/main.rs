//! Server binary: startup, signal handling, graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use sortlab_server::{AppState, ServerConfig, router, worker};

/// Grace period for in-flight connections after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = ServerConfig::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::from_env(config)
        .await
        .context("failed to initialize server state")?;

    let workers = worker::spawn_workers(&state);
    if !workers.is_empty() {
        info!(count = workers.len(), "durable workers started");
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        mode = state.engine.mode().name(),
        durable = state.config.durable(),
        "sortlab server listening"
    );

    let app = router(state.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Logging per `LOG_LEVEL` (`debug|info|warn|error`), overridable with the
/// standard `RUST_LOG` directives.
fn init_logging() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

/// Resolves on the first interrupt or terminate signal, after broadcasting
/// cancel to every job this process is executing.
async fn shutdown_signal(state: AppState) {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received, shutting down"),
        () = terminate => info!("terminate received, shutting down"),
    }

    state.store.cancel_all().await;
    state.shutdown.cancel();

    // Bound the drain: if connections linger past the grace period, exit
    // anyway. Durable pending jobs are leased again on next start.
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        warn!("grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
