use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use uuid::Uuid;

use llm_canvas_common::{BatchChatRequest, ChatRequest};

use super::resolve_profile;
use crate::error::ApiError;
use crate::llm::sse::DONE_MARKER;
use crate::llm::InferenceBackend;
use crate::relay::{BatchEvent, BatchRequest};
use crate::AppState;

/// POST /chat - relay one streaming generation.
///
/// Outbound frames carry `{"text": ...}`; the stream ends when the upstream
/// generation does.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let profile = resolve_profile(&state, request.server.as_deref())?;

    let tokens = state
        .llm_client
        .chat_stream(&profile, &request.messages, &request.params)
        .await?;

    let stream = tokens.map(|item| {
        let data = match item {
            Ok(text) => json!({ "text": text }).to_string(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        };
        Ok::<_, Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// POST /chat/batch - fan out `batchCount` concurrent generations onto one
/// SSE stream.
///
/// Frames are `{"index": i, "text": ...}` per delta, `{"index": i,
/// "error": ...}` for a failed slot, then a single `[DONE]` once every slot
/// has settled.
async fn chat_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let profile = resolve_profile(&state, request.server.as_deref())?;

    let batch = BatchRequest {
        request_id: Uuid::new_v4().to_string(),
        profile,
        messages: request.messages,
        params: request.params,
        batch_count: request.batch_count,
    };

    let events = state.multiplexer.start(batch)?;

    let stream = events.map(|event| {
        let data = match event {
            BatchEvent::Delta { index, text } => {
                json!({ "index": index, "text": text }).to_string()
            }
            BatchEvent::SlotError { index, message } => {
                json!({ "index": index, "error": message }).to_string()
            }
            BatchEvent::Done => DONE_MARKER.to_string(),
        };
        Ok::<_, Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/batch", post(chat_batch))
        .with_state(state)
}
