//! chia-exporter: HTTP surface for the Chia metrics.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of the current registry |
//! | GET | `/healthz` | Liveness probe |
//!
//! Scrapes only read the registry; they never trigger backend queries.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use chia_metrics::{MetricRegistry, render_prometheus};

/// Build the exporter router over a shared registry.
pub fn build_router(registry: MetricRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(registry)
}

async fn metrics(State(registry): State<MetricRegistry>) -> impl IntoResponse {
    let body = render_prometheus(&registry);
    (StatusCode::OK, [(CONTENT_TYPE, chia_metrics::CONTENT_TYPE)], body)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
