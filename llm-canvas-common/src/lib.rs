//! Shared types for LLM Canvas.
//!
//! Wire-level request and response shapes used by the backend: chat
//! messages, sampling parameters, streaming chunk frames and text
//! completions.

pub mod chat;
pub mod completion;
pub mod stream;

pub use chat::{BatchChatRequest, ChatMessage, ChatRequest, SamplingParams};
pub use completion::{CompletionChoice, CompletionRequest, CompletionResponse, Usage};
pub use stream::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
