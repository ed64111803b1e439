//! Stats HTTP endpoint
//!
//! Routes:
//!
//! - `GET /stats`: JSON snapshot of the running statistics
//! - `GET /metrics`: the same counters in Prometheus text format
//! - `GET /health`: liveness check

use crate::logs::{LogStats, StatsSnapshot};
use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Build the router over shared statistics
pub fn router(stats: Arc<LogStats>) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(stats)
}

/// Bind the stats listener on `0.0.0.0:port`
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind stats server to {}", addr))
}

/// Serve the router on an already bound listener until `shutdown` fires
pub async fn serve(
    stats: Arc<LogStats>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("Failed to read stats server address")?;
    info!("Starting stats server on http://{}", addr);

    axum::serve(listener, router(stats))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .context("Stats server failed")
}

pub async fn stats_handler(State(stats): State<Arc<LogStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

pub async fn metrics_handler(
    State(stats): State<Arc<LogStats>>,
) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&stats.registry().gather(), &mut buffer)
        .map_err(|e| {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn health_handler() -> &'static str {
    "ok"
}
