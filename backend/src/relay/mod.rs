//! Streaming batch relay.
//!
//! One inbound request fans out into `batch_count` concurrent upstream
//! generations; their token deltas are multiplexed onto a single outbound
//! event stream, tracked per slot, and closed with a single terminal event
//! once every generation has settled.

mod multiplexer;
mod slot;

pub use multiplexer::{BatchMultiplexer, BatchStream};
pub use slot::{GenerationSlot, SlotState};

use llm_canvas_common::{ChatMessage, SamplingParams};

use crate::config::ServerProfile;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid batch count {given}, must be between 1 and {max}")]
    InvalidBatchCount { given: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("batch record write failed: {0}")]
    Write(String),
}

/// One inbound batch generation request. Immutable after dispatch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub request_id: String,
    /// Inference server to use, resolved before dispatch.
    pub profile: ServerProfile,
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
    pub batch_count: usize,
}

impl BatchRequest {
    /// The user-facing prompt, for the call log.
    pub fn user_prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.as_deref())
            .unwrap_or("")
    }
}

/// Normalized event on the outbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A text fragment for one slot, forwarded in arrival order.
    Delta { index: usize, text: String },
    /// One slot failed; its siblings are unaffected.
    SlotError { index: usize, message: String },
    /// Every slot reached a terminal state. Emitted exactly once, last.
    Done,
}

/// Final outputs of a settled batch, handed to the persistence sink.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub request_id: String,
    pub model: String,
    pub input_prompt: String,
    /// Accumulated text per slot, indexed by slot; failed slots keep
    /// whatever partial text they produced.
    pub outputs: Vec<String>,
    pub params: SamplingParams,
}

/// Best-effort persistence for settled batches.
///
/// A write failure is the sink's own problem; the relay logs it and the
/// already-delivered stream is unaffected.
pub trait BatchSink: Send + Sync {
    fn record_batch(&self, record: &BatchRecord) -> Result<(), SinkError>;
}
