// ABOUTME: Prometheus metrics for relay traffic plus an optional /metrics and /health server
// ABOUTME: Recording is a no-op until a recorder is installed, so library code calls freely

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{config::MetricsConfig, connection::ConnectionHandle};

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub fn record_frame_received() {
    counter!("relay_frames_received_total").increment(1);
}

pub fn record_decode_error() {
    counter!("relay_decode_errors_total").increment(1);
}

pub fn record_event(kind: &'static str) {
    counter!("relay_events_total", "kind" => kind).increment(1);
}

pub fn record_command_sent() {
    counter!("relay_commands_sent_total").increment(1);
}

pub fn record_command_dropped() {
    counter!("relay_commands_dropped_total").increment(1);
}

pub fn record_local_command(command: &'static str) {
    counter!("relay_local_commands_total", "command" => command).increment(1);
}

pub fn record_webhook_forward(outcome: &'static str) {
    counter!("relay_webhook_forwards_total", "outcome" => outcome).increment(1);
}

pub fn record_reconnect() {
    counter!("relay_reconnects_total").increment(1);
}

pub fn set_connection_open(open: bool) {
    gauge!("relay_connection_open").set(if open { 1.0 } else { 0.0 });
}

#[derive(Clone)]
struct MetricsState {
    handle: PrometheusHandle,
    connection: ConnectionHandle,
}

/// Routes for `GET /metrics` and `GET /health`
pub fn metrics_router(handle: PrometheusHandle, connection: ConnectionHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(MetricsState { handle, connection }))
        .layer(TraceLayer::new_for_http())
}

/// Serve the metrics router until the process exits
pub async fn start_metrics_server(
    config: &MetricsConfig,
    port: u16,
    handle: PrometheusHandle,
    connection: ConnectionHandle,
) -> Result<()> {
    let addr = format!("{}:{}", config.bind_address, port);
    tracing::info!(addr = %addr, "Starting metrics server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
    axum::serve(listener, metrics_router(handle, connection)).await?;

    Ok(())
}

async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    state.handle.render()
}

async fn health_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connection": state.connection.state().as_str(),
    }))
}
