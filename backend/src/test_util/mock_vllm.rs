//! Canned vLLM response bodies for tests.

use serde_json::json;

/// One SSE frame carrying a delta fragment.
pub fn delta_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
    )
}

/// A full streaming chat body: the given deltas followed by `[DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&delta_frame(delta));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A non-streaming completion response body.
pub fn completion_body(model: &str, texts: &[&str]) -> serde_json::Value {
    let choices: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            json!({"text": text, "index": i, "finish_reason": "stop"})
        })
        .collect();
    json!({
        "id": "cmpl-test",
        "object": "text_completion",
        "created": 1700000000,
        "model": model,
        "choices": choices,
        "usage": {"prompt_tokens": 4, "completion_tokens": 8, "total_tokens": 12}
    })
}

/// An error body in the shape vLLM returns.
pub fn error_body(message: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": "invalid_request_error"
        }
    })
}
