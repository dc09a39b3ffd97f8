use async_trait::async_trait;
use clawby_core::{ConversationTurn, Part, Role, ToolCallRequest, ToolDeclaration};
use thiserror::Error;

/// One function-calling request: the system instruction, the conversation so
/// far and every tool the model may call.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub system_instruction: &'a str,
    pub history: &'a [ConversationTurn],
    pub tools: &'a [ToolDeclaration],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub parts: Vec<Part>,
}

impl Completion {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect::<Vec<_>>().join("")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.parts.iter().filter_map(Part::as_tool_call).collect()
    }

    pub fn into_turn(self) -> ConversationTurn {
        ConversationTurn::new(Role::Model, self.parts)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model overloaded: {0}")]
    Overloaded(String),
    #[error("model returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Rate limits and overload are worth retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Overloaded(_))
    }

    /// Maps a failed HTTP exchange onto the error taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lowered = body.to_ascii_lowercase();
        let message = truncate(body, 300);
        if status == 429 {
            Self::RateLimited(message)
        } else if status == 503 || lowered.contains("overloaded") || lowered.contains("high demand")
        {
            Self::Overloaded(message)
        } else {
            Self::Http { status, message }
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError>;
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
