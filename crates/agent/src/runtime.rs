use std::sync::Arc;

use clawby_core::{ApplicationError, Artifact, ConversationTurn, Part, Role, ToolCallRequest};
use clawby_memory::{MemoryService, DEFAULT_TOP_K};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::persona::{system_instruction, DEFAULT_PERSONA};
use crate::retry::RetryPolicy;

pub const FALLBACK_REPLY: &str = "I couldn't generate a response.";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Model(#[from] LlmError),
}

impl From<AgentError> for ApplicationError {
    fn from(value: AgentError) -> Self {
        match value {
            AgentError::EmptyMessage => Self::InvalidInput("message must not be empty".to_string()),
            AgentError::Model(error) => Self::Model(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub tool_calls: usize,
    pub artifacts: Vec<Artifact>,
    pub model_calls: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub memory_top_k: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS, memory_top_k: DEFAULT_TOP_K }
    }
}

/// The request loop: model call, tool batch, model call, until the model
/// answers without tool calls or the iteration cap is hit.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    catalog: ToolCatalog,
    memory: Option<Arc<MemoryService>>,
    retry: RetryPolicy,
    persona: String,
    settings: AgentSettings,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: ToolCatalog) -> Self {
        Self {
            llm,
            catalog,
            memory: None,
            retry: RetryPolicy::default(),
            persona: DEFAULT_PERSONA.to_string(),
            settings: AgentSettings::default(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = AgentSettings { max_iterations: settings.max_iterations.max(1), ..settings };
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn memory(&self) -> Option<&Arc<MemoryService>> {
        self.memory.as_ref()
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    pub async fn run(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<AgentReply, AgentError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let memory_context = self.memory_context(message).await;
        let instruction = system_instruction(&self.persona, memory_context.as_deref());
        let tools = self.catalog.declarations().await;

        let mut conversation = history.to_vec();
        conversation.push(ConversationTurn::user(message));

        let mut reply = AgentReply::default();
        let mut best_text = String::new();

        while reply.model_calls < self.settings.max_iterations {
            let request = CompletionRequest {
                system_instruction: &instruction,
                history: &conversation,
                tools: &tools,
            };
            let label = if reply.model_calls == 0 { "initial" } else { "tool-response" };
            let completion = self.retry.run(label, || self.llm.complete(request)).await?;
            reply.model_calls += 1;

            let text = completion.text();
            if !text.trim().is_empty() {
                best_text = text;
            }

            let calls: Vec<ToolCallRequest> = completion.tool_calls().into_iter().cloned().collect();
            conversation.push(completion.into_turn());
            if calls.is_empty() {
                break;
            }
            if reply.model_calls >= self.settings.max_iterations {
                warn!(
                    event_name = "agent.loop.cap_reached",
                    max_iterations = self.settings.max_iterations,
                    pending_calls = calls.len(),
                    "iteration cap reached with tool calls pending"
                );
                break;
            }

            let outputs = join_all(calls.iter().map(|call| self.catalog.dispatch(call))).await;
            reply.tool_calls += calls.len();

            let mut results = Vec::with_capacity(calls.len());
            for (call, output) in calls.iter().zip(outputs) {
                results.push(Part::tool_result(call.name.clone(), output.model_payload()));
                if let Some(artifact) = output.into_artifact() {
                    debug!(
                        event_name = "agent.artifact.extracted",
                        tool = %call.name,
                        mime_type = %artifact.mime_type,
                        "artifact moved out of model context"
                    );
                    reply.artifacts.push(artifact);
                }
            }
            conversation.push(ConversationTurn::new(Role::Tool, results));
        }

        reply.text = if best_text.trim().is_empty() { FALLBACK_REPLY.to_string() } else { best_text };
        info!(
            event_name = "agent.loop.completed",
            model_calls = reply.model_calls,
            tool_calls = reply.tool_calls,
            artifacts = reply.artifacts.len(),
            "request completed"
        );
        Ok(reply)
    }

    /// Memory failures degrade the turn to no memory context.
    async fn memory_context(&self, message: &str) -> Option<String> {
        let memory = self.memory.as_ref()?;
        match memory.memory_context(message, self.settings.memory_top_k).await {
            Ok(context) if !context.trim().is_empty() => Some(context),
            Ok(_) => None,
            Err(error) => {
                warn!(event_name = "agent.memory.recall_failed", error = %error, "continuing without memory");
                None
            }
        }
    }

    /// Reconnects the remote gateway and drops the cached declarations.
    /// Returns the number of connected servers.
    pub async fn reconnect_remote(&self) -> usize {
        let connected = match self.catalog.gateway() {
            Some(gateway) => gateway.reconnect().await,
            None => 0,
        };
        self.catalog.invalidate().await;
        connected
    }

    pub async fn invalidate_tool_cache(&self) {
        self.catalog.invalidate().await;
    }

    pub async fn shutdown(&self) {
        if let Some(gateway) = self.catalog.gateway() {
            gateway.shutdown().await;
        }
    }
}
