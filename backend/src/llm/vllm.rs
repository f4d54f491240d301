//! Client for vLLM-compatible inference servers.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;

use llm_canvas_common::{ChatMessage, CompletionRequest, CompletionResponse, SamplingParams};

use super::sse::{self, SseLine, SseLineBuffer};
use super::{InferenceBackend, TokenStream, UpstreamError};
use crate::config::ServerProfile;

/// `max_tokens` for the non-streaming completions endpoint.
const COMPLETION_MAX_TOKENS: u32 = 4096;

// Sampling defaults applied when the caller omits a parameter.
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_TOP_P: f32 = 0.7;
const DEFAULT_TOP_K: u32 = 50;

/// HTTP client for the `/v1/chat/completions` and `/v1/completions` APIs.
///
/// Carries no server address; the target profile is part of each request
/// context.
pub struct VllmClient {
    http_client: Client,
    max_completion_tokens: u32,
}

/// vLLM chat request format.
#[derive(Debug, Serialize)]
struct VllmChatRequest {
    model: String,
    messages: Vec<VllmMessage>,
    stream: bool,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize)]
struct VllmMessage {
    role: String,
    content: String,
}

/// vLLM text completion request format.
#[derive(Debug, Serialize)]
struct VllmCompletionRequest {
    model: String,
    prompt: String,
    max_tokens: u32,
    n: u32,
    stream: bool,
}

impl VllmClient {
    pub fn new(max_completion_tokens: u32) -> Self {
        Self {
            http_client: Client::new(),
            max_completion_tokens,
        }
    }

    fn chat_body(
        &self,
        profile: &ServerProfile,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> VllmChatRequest {
        VllmChatRequest {
            model: profile.model.clone(),
            messages: messages
                .iter()
                .map(|m| VllmMessage {
                    role: m.role.clone(),
                    content: m.content.clone().unwrap_or_default(),
                })
                .collect(),
            stream: true,
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: params.top_p.unwrap_or(DEFAULT_TOP_P),
            top_k: params.top_k.unwrap_or(DEFAULT_TOP_K),
            max_tokens: params.max_tokens.unwrap_or(self.max_completion_tokens),
            stop: profile.stop.clone(),
        }
    }

    /// Send a non-streaming text completion request.
    pub async fn completions(
        &self,
        profile: &ServerProfile,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        let body = VllmCompletionRequest {
            model: profile.model.clone(),
            prompt: request.prompt.clone(),
            max_tokens: COMPLETION_MAX_TOKENS,
            n: request.n,
            stream: false,
        };

        let url = format!("{}/v1/completions", profile.base_url.trim_end_matches('/'));

        tracing::debug!(%url, model = %body.model, n = body.n, "sending completion request");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl InferenceBackend for VllmClient {
    async fn chat_stream(
        &self,
        profile: &ServerProfile,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<TokenStream, UpstreamError> {
        let body = self.chat_body(profile, messages, params);
        let url = format!(
            "{}/v1/chat/completions",
            profile.base_url.trim_end_matches('/')
        );

        tracing::debug!(%url, model = %body.model, "starting streaming generation");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let err = if e.is_connect() || e.is_timeout() {
                            UpstreamError::Connection(e.to_string())
                        } else {
                            UpstreamError::Protocol(e.to_string())
                        };
                        yield Err(err);
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    match sse::parse_chat_line(&line) {
                        SseLine::Delta(text) => yield Ok(text),
                        SseLine::Done => break 'read,
                        SseLine::Ignored => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
