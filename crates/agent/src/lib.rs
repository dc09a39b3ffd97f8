//! Agent runtime for Clawby.
//!
//! A request runs as a bounded loop: the model gets the persona, the
//! operational rules, any recalled memory and the merged tool list; every
//! tool call it returns is dispatched concurrently and the results go back
//! as one batch. The loop ends when the model answers in plain text or the
//! iteration cap is reached.
//!
//! - `llm` / `gemini`: the function-calling model seam and its Gemini client
//! - `retry`: backoff for rate-limited and overloaded model calls
//! - `tools` / `builtin` / `image`: the in-process tool registry and its tools
//! - `catalog`: local and remote tools merged behind one cached list
//! - `runtime`: the loop itself

pub mod builtin;
pub mod catalog;
pub mod gemini;
pub mod image;
pub mod llm;
pub mod persona;
pub mod retry;
pub mod runtime;
pub mod tools;

pub use builtin::{GetCurrentTime, RecallMemories, SaveMemory};
pub use catalog::ToolCatalog;
pub use gemini::GeminiClient;
pub use image::GenerateImage;
pub use llm::{Completion, CompletionRequest, LlmClient, LlmError};
pub use persona::{load_persona, system_instruction, DEFAULT_PERSONA, OPERATIONAL_RULES};
pub use retry::RetryPolicy;
pub use runtime::{AgentError, AgentReply, AgentRuntime, AgentSettings, FALLBACK_REPLY};
pub use tools::{Tool, ToolRegistry};
