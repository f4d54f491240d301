//! Integration tests for the canvas backend HTTP API.
//!
//! The inference server is stood in by wiremock serving canned
//! `text/event-stream` bodies.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_canvas_backend::config::{
    Config, CorsConfig, DatabaseConfig, LoggingConfig, RelayConfig, ServerConfig, ServerProfile,
};
use llm_canvas_backend::test_util::mock_vllm;
use llm_canvas_backend::{app, AppState};

fn test_config(upstream_url: &str) -> Config {
    let mut profiles = HashMap::new();
    profiles.insert(
        "local".to_string(),
        ServerProfile {
            base_url: upstream_url.to_string(),
            model: "test-model".to_string(),
            stop: vec!["<|eot_id|>".to_string()],
        },
    );
    Config {
        server: ServerConfig::default(),
        cors: CorsConfig {
            origins: "*".to_string(),
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        relay: RelayConfig::default(),
        profiles,
        default_profile: "local".to_string(),
    }
}

fn test_app(upstream_url: &str) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config(upstream_url)).unwrap());
    (app(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> http::Response<axum::body::Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let request = builder
        .body(match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn body_string(response: http::Response<axum::body::Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Payloads of the `data:` frames in an SSE body, in order.
fn sse_frames(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Delta texts for one slot, in arrival order.
fn slot_texts(frames: &[String], index: usize) -> Vec<String> {
    frames
        .iter()
        .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
        .filter(|value| value["index"] == json!(index))
        .filter_map(|value| value["text"].as_str().map(str::to_string))
        .collect()
}

async fn mount_chat_stream(server: &MockServer, deltas: &[&str], expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(mock_vllm::sse_body(deltas), "text/event-stream"),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _state) = test_app("http://localhost:8000");

    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["profiles"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state) = test_app("http://localhost:8000");

    let response = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("llmcanvas_up 1"));
}

#[tokio::test]
async fn test_list_servers() {
    let (app, _state) = test_app("http://localhost:9999");

    let response = send(&app, Method::GET, "/servers", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["default"], "local");
    assert_eq!(body["servers"][0]["name"], "local");
    assert_eq!(body["servers"][0]["base_url"], "http://localhost:9999");
    assert_eq!(body["servers"][0]["model"], "test-model");
}

#[tokio::test]
async fn test_batch_chat_end_to_end() {
    let upstream = MockServer::start().await;
    mount_chat_stream(&upstream, &["Hel", "lo"], 3).await;

    let (app, state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/chat/batch",
        Some(json!({
            "messages": [{"role": "user", "content": "Say hello"}],
            "batchCount": 3,
            "temperature": 0.1
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_string(response).await;
    let frames = sse_frames(&body);

    // Exactly one terminal marker, and it is last.
    assert_eq!(frames.iter().filter(|f| f.as_str() == "[DONE]").count(), 1);
    assert_eq!(frames.last().unwrap(), "[DONE]");

    // Every slot streamed its deltas in order.
    for index in 0..3 {
        assert_eq!(slot_texts(&frames, index), vec!["Hel", "lo"]);
    }

    // The settled batch was recorded with the accumulated outputs.
    let calls = state.call_logger.recent_batch_calls(1).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, "test-model");
    assert_eq!(calls[0].input_prompt, "Say hello");
    assert_eq!(calls[0].outputs, vec!["Hello", "Hello", "Hello"]);
}

#[tokio::test]
async fn test_batch_chat_rejects_invalid_count_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let (app, state) = test_app(&upstream.uri());

    for batch_count in [0, 41] {
        let response = send(
            &app,
            Method::POST,
            "/chat/batch",
            Some(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "batchCount": batch_count
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert!(state.call_logger.recent_batch_calls(1).unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_chat_unknown_server_profile() {
    let (app, _state) = test_app("http://localhost:8000");

    let response = send(
        &app,
        Method::POST,
        "/chat/batch",
        Some(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "batchCount": 1,
            "server": "nonexistent"
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "unknown_profile");
}

#[tokio::test]
async fn test_batch_chat_slot_failure_is_isolated() {
    let upstream = MockServer::start().await;

    // First request gets a 500; the remaining two stream normally.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(mock_vllm::error_body("model exploded")),
        )
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    mount_chat_stream(&upstream, &["Hel", "lo"], 2).await;

    let (app, state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/chat/batch",
        Some(json!({
            "messages": [{"role": "user", "content": "Say hello"}],
            "batchCount": 3
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    let frames = sse_frames(&body);

    let error_frames: Vec<Value> = frames
        .iter()
        .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
        .filter(|value| value.get("error").is_some())
        .collect();
    assert_eq!(error_frames.len(), 1);
    assert_eq!(frames.last().unwrap(), "[DONE]");

    // Two slots finished untouched, the failed one kept no text.
    let outputs = &state.call_logger.recent_batch_calls(1).unwrap()[0].outputs;
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs.iter().filter(|o| o.as_str() == "Hello").count(), 2);
    assert_eq!(outputs.iter().filter(|o| o.is_empty()).count(), 1);
}

#[tokio::test]
async fn test_single_chat_relay() {
    let upstream = MockServer::start().await;
    mount_chat_stream(&upstream, &["Hel", "lo"], 1).await;

    let (app, _state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/chat",
        Some(json!({
            "messages": [{"role": "user", "content": "Say hello"}],
            "topP": 0.9
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    let frames = sse_frames(&body);
    assert_eq!(frames, vec![r#"{"text":"Hel"}"#, r#"{"text":"lo"}"#]);
}

#[tokio::test]
async fn test_single_chat_upstream_error_is_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(mock_vllm::error_body("model not loaded")),
        )
        .mount(&upstream)
        .await;

    let (app, _state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/chat",
        Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "upstream_error");
}

#[tokio::test]
async fn test_completions_relays_and_logs() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "prompt": "Once",
            "n": 2,
            "stream": false,
            "max_tokens": 4096
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_vllm::completion_body("test-model", &[" upon", " a time"])),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/completions",
        Some(json!({"prompt": "Once", "n": 2})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["choices"].as_array().unwrap().len(), 2);
    assert_eq!(body["choices"][0]["text"], " upon");

    assert_eq!(state.call_logger.call_count().unwrap(), 1);
}

#[tokio::test]
async fn test_system_prompts_flow() {
    let (app, state) = test_app("http://localhost:8000");

    let terse = state
        .call_logger
        .create_system_prompt("terse", "Answer in one sentence.")
        .unwrap();
    let pirate = state
        .call_logger
        .create_system_prompt("pirate", "Talk like a pirate.")
        .unwrap();
    state.call_logger.increment_prompt_usage(pirate).unwrap();

    let response = send(&app, Method::GET, "/system-prompts", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    let prompts = body.as_array().unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0]["name"], "pirate");

    let response = send(
        &app,
        Method::POST,
        "/system-prompts/increment-usage",
        Some(json!({"promptId": terse})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["success"], true);

    let response = send(
        &app,
        Method::POST,
        "/system-prompts/increment-usage",
        Some(json!({"promptId": 12345})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_stream_applies_profile_stop_tokens() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stop": ["<|eot_id|>"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(mock_vllm::sse_body(&["ok"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (app, _state) = test_app(&upstream.uri());

    let response = send(
        &app,
        Method::POST,
        "/chat",
        Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}
