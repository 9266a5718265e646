//! Web server module for the ping exporter.
//!
//! Serves the Prometheus exposition of the shared registry plus a small info
//! page and a liveness probe.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use prometheus::{Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub metrics_path: String,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route(&metrics_path, get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Info page linking the metrics path.
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Ping Exporter (Version {version})</title></head>\n\
         <body>\n\
         <h1>Ping Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        version = env!("CARGO_PKG_VERSION"),
        path = state.metrics_path
    ))
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Prometheus exposition.
///
/// Gathering drains the probing engines under the collector lock, so it runs
/// on the blocking pool.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.registry.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let families = registry.gather();
        let mut buffer = String::new();
        TextEncoder::new()
            .encode_utf8(&families, &mut buffer)
            .map(|()| buffer)
    })
    .await;

    match rendered {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Metrics gathering task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
