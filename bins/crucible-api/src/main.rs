mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use axum::Router;
use crucible_common::config::RunnerConfig;
use crucible_runner::Executor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct AppState {
    pub executor: Executor,
    /// Caps concurrent compile/execute pipelines
    pub permits: Semaphore,
}

impl AppState {
    pub fn new(executor: Executor) -> Self {
        let permits = Semaphore::new(executor.config().max_concurrent_runs.max(1));
        Self { executor, permits }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Crucible API booting...");

    let config = RunnerConfig::load_default().context("Failed to load runner configuration")?;

    info!(
        rustc = %config.rustc,
        edition = %config.edition,
        timeout_ms = config.timeout_ms,
        compile_timeout_ms = ?config.compile_timeout_ms,
        max_concurrent_runs = config.max_concurrent_runs,
        scratch_dir = %config.scratch_dir().display(),
        "Runner configured"
    );
    if config.compile_timeout_ms.is_none() {
        warn!("Compilation is not time-bounded; set compile_timeout_ms to bound it");
    }

    let state = Arc::new(AppState::new(Executor::from_config(config)));

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept code");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight runs...");
}
