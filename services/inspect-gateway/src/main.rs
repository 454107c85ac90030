//! Inspect-link resolution gateway
//!
//! Single-binary service that:
//! 1. Loads bot credentials and spawns one session per bot account
//! 2. Listens for HTTP inspect requests
//! 3. Resolves each link through the session pool
//! 4. Exposes pool health and Prometheus metrics

mod config;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bot_pool::{PoolStatus, Resolver, SessionPool, WaitMode};
use gc_auth::CredentialSet;
use inspect_core::ResolutionError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Bound on waiting for in-flight requests after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    resolver: Resolver,
    prometheus: PrometheusHandle,
    started_at: std::time::Instant,
    wait_mode: WaitMode,
    request_timeout: Duration,
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit layer bounds simultaneous requests; requests
/// beyond the pool's capacity are handled by the saturation policy,
/// not by the HTTP layer.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/inspect", post(inspect_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting inspect-gateway");

    // Install the recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.gateway.listen_addr,
        coordinator = %config.coordinator.addr,
        credentials_file = %config.credentials_file.display(),
        "configuration loaded"
    );

    let credentials = CredentialSet::load(&config.credentials_file)
        .await
        .context("failed to load bot credentials")?;
    if credentials.is_empty() {
        anyhow::bail!(
            "credential file {} contains no bot accounts",
            config.credentials_file.display()
        );
    }

    let pool = Arc::new(
        SessionPool::spawn(credentials.credentials(), config.session_config())
            .context("failed to spawn session pool")?,
    );
    let resolver = Resolver::new(Arc::clone(&pool));

    // Keep the capacity gauges current regardless of request traffic
    {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            loop {
                let health = pool.health();
                metrics::set_pool_gauges(health.ready, health.total);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    let state = AppState {
        resolver,
        prometheus,
        started_at: std::time::Instant::now(),
        wait_mode: config.gateway.on_saturation.wait_mode(),
        request_timeout: config.request_timeout(),
    };
    let app = build_router(state, config.gateway.max_connections);

    let listener = TcpListener::bind(config.gateway.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.gateway.listen_addr))?;

    info!(addr = %config.gateway.listen_addr, "accepting requests");

    // Graceful shutdown: stop accepting on SIGTERM/SIGINT, then race the
    // drain against DRAIN_TIMEOUT so a slow caller cannot block exit.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

#[derive(Deserialize)]
struct InspectBody {
    link: String,
}

/// POST /inspect — resolve one inspect link.
async fn inspect_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<InspectBody>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = std::time::Instant::now();
    let deadline = tokio::time::Instant::now() + state.request_timeout;

    match state
        .resolver
        .resolve_link(&body.link, state.wait_mode, deadline)
        .await
    {
        Ok(item) => {
            metrics::record_request("ok", started.elapsed().as_secs_f64());
            info!(
                request_id = %request_id,
                item = %item.display_name,
                wear = item.wear_float,
                "resolved inspect link"
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "request_id": request_id,
                    "item": item,
                })),
            )
                .into_response()
        }
        Err(err) => {
            let code = err.code();
            metrics::record_request(code, started.elapsed().as_secs_f64());
            metrics::record_error(code);
            warn!(request_id = %request_id, code, error = %err, "inspect request failed");

            let status = match &err {
                ResolutionError::InvalidLink(_) => StatusCode::BAD_REQUEST,
                ResolutionError::Busy => StatusCode::SERVICE_UNAVAILABLE,
                ResolutionError::TransientFailure(_) | ResolutionError::MalformedResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ResolutionError::ConfigurationFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                axum::Json(serde_json::json!({
                    "error": {
                        "type": code,
                        "message": err.to_string(),
                        "request_id": request_id,
                    }
                })),
            )
                .into_response()
        }
    }
}

/// GET /health — pool condition plus uptime. 200 while any session can
/// take a call, 503 once none can.
async fn health_handler(State(state): State<AppState>) -> Response {
    let health = state.resolver.pool().health();
    let status_code = match health.status {
        PoolStatus::Healthy | PoolStatus::Degraded => StatusCode::OK,
        PoolStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        axum::Json(serde_json::json!({
            "status": health.status,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "pool": health,
        })),
    )
        .into_response()
}

/// GET /metrics — Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
