//! flushmeter demo agent
//!
//! - loads `flushmeter.yaml` (or the path given as the first argument)
//! - serves `/`, `/healthz` and `/diagnostics`, each request instrumented
//! - flushes batches through `LogTransport`
//! - on Ctrl-C, drains in-flight requests and performs the final flush

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing_subscriber::{fmt, EnvFilter};

use flushmeter_agent::{
    config, detect_managed_host, track_requests, Diagnostics, LogTarget, LogTransport,
    RequestMetrics, Tracker,
};
use flushmeter_core::{FlushError, Result};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let managed = detect_managed_host();
    init_tracing(LogTarget::for_host(managed));

    match run(managed).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "flushmeter-agent failed");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(target: LogTarget) {
    let builder = fmt().with_env_filter(EnvFilter::from_default_env());
    match target {
        LogTarget::Stdout => builder.with_writer(std::io::stdout).init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).init(),
    }
}

async fn run(managed: bool) -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "flushmeter.yaml".into());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| FlushError::Config(format!("server.listen must be a valid SocketAddr: {e}")))?;

    let tracker = Tracker::from_config(&cfg, Arc::new(LogTransport));
    tracker.set_managed_host(managed);
    if tracker.is_enabled() {
        tracker.start()?;
    }
    let metrics = RequestMetrics::new(tracker.clone(), cfg.request_settings());

    let app = Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/diagnostics", get(diagnostics))
        .with_state(tracker.clone())
        .layer(axum::middleware::from_fn_with_state(metrics, track_requests));

    tracing::info!(%listen, config = %path, managed, "flushmeter-agent starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| FlushError::Internal(format!("bind {listen} failed: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| FlushError::Internal(format!("server failed: {e}")));

    tracker.stop().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn index() -> &'static str {
    "flushmeter-agent\n"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn diagnostics(State(tracker): State<Tracker>) -> Json<Diagnostics> {
    Json(tracker.diagnostics())
}
