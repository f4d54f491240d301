//! Clients for vLLM-compatible inference servers.

pub mod sse;
pub mod vllm;

pub use vllm::VllmClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use llm_canvas_common::{ChatMessage, SamplingParams};

use crate::config::ServerProfile;

/// A lazy, finite, non-restartable sequence of generated text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connection to inference server failed: {0}")]
    Connection(String),
    #[error("inference server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed stream from inference server: {0}")]
    Protocol(String),
}

/// Capability consumed by the batch relay: one streaming chat generation.
///
/// An error from one call never affects other in-flight calls; the relay
/// treats each stream as an independent slot.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Start one streaming generation and return its token deltas.
    ///
    /// The returned stream ends when the server signals `[DONE]` or closes
    /// the response body.
    async fn chat_stream(
        &self,
        profile: &ServerProfile,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<TokenStream, UpstreamError>;
}
