use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};

use llm_canvas_common::{CompletionRequest, CompletionResponse};

use super::resolve_profile;
use crate::error::ApiError;
use crate::AppState;

/// POST /completions - non-streaming text completion, relayed verbatim and
/// logged to the call table.
async fn completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompletionRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let profile = resolve_profile(&state, request.server.as_deref())?;

    let response = state.llm_client.completions(&profile, &request).await?;

    // Best-effort log; the response is already in hand.
    let output = serde_json::to_string(&response.choices).unwrap_or_default();
    if let Err(e) = state
        .call_logger
        .log_call(&response.model, &request.prompt, &output)
    {
        tracing::warn!(error = %e, "failed to log completion call");
    }

    Ok(Json(response))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/completions", post(completions))
        .with_state(state)
}
