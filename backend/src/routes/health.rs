use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Number of configured inference server profiles.
    profiles: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        profiles: state.config.profiles.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = format!(
        "# HELP llmcanvas_up Whether the service is up\n\
         # TYPE llmcanvas_up gauge\n\
         llmcanvas_up 1\n\
         # HELP llmcanvas_info Service information\n\
         # TYPE llmcanvas_info gauge\n\
         llmcanvas_info{{version=\"{}\"}} 1\n\
         # HELP llmcanvas_profiles Configured inference server profiles\n\
         # TYPE llmcanvas_profiles gauge\n\
         llmcanvas_profiles {}\n",
        env!("CARGO_PKG_VERSION"),
        state.config.profiles.len()
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
