use serde::Serialize;

/// A reusable system prompt stored alongside the call log.
#[derive(Debug, Clone, Serialize)]
pub struct SystemPrompt {
    pub id: i64,
    pub name: String,
    pub prompt_text: String,
}
