//! Incremental parsing of `text/event-stream` bodies.

/// Frame prefix for SSE data lines.
pub const DATA_PREFIX: &str = "data: ";
/// Sentinel payload marking end-of-stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Line assembler for SSE bodies arriving as arbitrary byte chunks.
///
/// Network chunks can cut a frame anywhere, including inside a multi-byte
/// UTF-8 scalar, so bytes are buffered until a newline completes the line.
/// Only complete lines are ever handed out.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every line it completed.
    ///
    /// Blank lines (frame separators) are skipped. Lines that are not valid
    /// UTF-8 are dropped with a warning; a complete SSE line is always valid
    /// UTF-8 on a well-behaved upstream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            match String::from_utf8(line) {
                Ok(text) => lines.push(text),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping non-UTF-8 stream line");
                }
            }
        }
        lines
    }

    /// Bytes still waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// What a single SSE data line means for a chat stream.
#[derive(Debug, PartialEq)]
pub enum SseLine {
    /// A text fragment from the generation.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Anything else: comments, other fields, unparseable or empty frames.
    Ignored,
}

/// Interpret one complete line of a streaming chat-completion body.
///
/// Frames that fail to parse are logged and ignored, never fatal.
pub fn parse_chat_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return SseLine::Done;
    }
    match serde_json::from_str::<llm_canvas_common::ChatCompletionChunk>(payload) {
        Ok(chunk) => match chunk.delta_content() {
            Some(text) if !text.is_empty() => SseLine::Delta(text.to_string()),
            _ => SseLine::Ignored,
        },
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed stream frame");
            SseLine::Ignored
        }
    }
}
