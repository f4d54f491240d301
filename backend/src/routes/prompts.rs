use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::models::prompt::SystemPrompt;
use crate::AppState;

/// GET /system-prompts - stored prompts, most used first.
async fn list_prompts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SystemPrompt>>, ApiError> {
    state
        .call_logger
        .list_system_prompts()
        .map(Json)
        .map_err(|e| ApiError::Database(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncrementUsageRequest {
    prompt_id: i64,
}

/// POST /system-prompts/increment-usage - bump a prompt's usage counter.
async fn increment_usage(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IncrementUsageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .call_logger
        .increment_prompt_usage(request.prompt_id)
        .map_err(|e| ApiError::Database(e.to_string()))?;

    if !updated {
        return Err(ApiError::NotFound(format!(
            "system prompt {}",
            request.prompt_id
        )));
    }

    Ok(Json(json!({ "success": true })))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/system-prompts", get(list_prompts))
        .route("/system-prompts/increment-usage", post(increment_usage))
        .with_state(state)
}
