use std::sync::Arc;
use std::time::Duration;

use clawby_agent::{
    load_persona, AgentRuntime, AgentSettings, GeminiClient, GenerateImage, GetCurrentTime,
    LlmError, RecallMemories, RetryPolicy, SaveMemory, ToolCatalog, ToolRegistry,
};
use clawby_core::config::{AppConfig, ConfigError, LoadOptions};
use clawby_core::ApplicationError;
use clawby_mcp::{RemoteGateway, StdioConnector};
use clawby_memory::{Embedder, GeminiEmbedder, HashEmbedder, MemoryError, MemoryService};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("model client setup failed: {0}")]
    Model(#[from] LlmError),
    #[error("memory setup failed: {0}")]
    Memory(#[from] MemoryError),
    #[error("tool setup failed: {0}")]
    Tool(#[source] anyhow::Error),
    #[error("memory is disabled (memory.enabled = false)")]
    MemoryDisabled,
}

impl From<BootstrapError> for ApplicationError {
    fn from(value: BootstrapError) -> Self {
        match value {
            BootstrapError::Config(_) | BootstrapError::MemoryDisabled => {
                Self::Configuration(value.to_string())
            }
            BootstrapError::Model(_) => Self::Model(value.to_string()),
            BootstrapError::Memory(_) => Self::Memory(value.to_string()),
            BootstrapError::Tool(_) => Self::Integration(value.to_string()),
        }
    }
}

pub fn load_config(options: &LoadOptions) -> Result<AppConfig, BootstrapError> {
    Ok(AppConfig::load(options.clone())?)
}

/// Memory service for `config`, or `None` when memory is disabled. Mock
/// embeddings need no API key.
pub fn build_memory(config: &AppConfig) -> Result<Option<Arc<MemoryService>>, BootstrapError> {
    if !config.memory.enabled {
        return Ok(None);
    }

    let embedder: Arc<dyn Embedder> = if config.memory.mock_embeddings {
        Arc::new(HashEmbedder::default())
    } else {
        Arc::new(GeminiEmbedder::new(
            &config.llm.base_url,
            &config.llm.embedding_model,
            config.require_llm_api_key()?.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )?)
    };

    info!(
        event_name = "system.bootstrap.memory_ready",
        dir = %config.memory.dir.display(),
        mock_embeddings = config.memory.mock_embeddings,
        "memory subsystem ready"
    );
    Ok(Some(Arc::new(MemoryService::new(config.memory.dir.clone(), embedder))))
}

pub fn require_memory(config: &AppConfig) -> Result<Arc<MemoryService>, BootstrapError> {
    build_memory(config)?.ok_or(BootstrapError::MemoryDisabled)
}

/// Builds the full agent: model client, local tools, memory, and the remote
/// gateway when enabled. Remote servers are started before returning.
pub async fn bootstrap(options: &LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = load_config(options)?;
    let api_key = config.require_llm_api_key()?.clone();
    let timeout = Duration::from_secs(config.llm.timeout_secs);

    let llm = GeminiClient::new(&config.llm.base_url, &config.llm.model, api_key.clone(), timeout)?;
    let memory = build_memory(&config)?;

    let mut registry = ToolRegistry::default();
    registry.register(GetCurrentTime);
    registry.register(
        GenerateImage::new(&config.llm.base_url, &config.llm.image_model, api_key, timeout)
            .map_err(BootstrapError::Tool)?,
    );
    if let Some(memory) = &memory {
        registry.register(SaveMemory::new(Arc::clone(memory)));
        registry.register(RecallMemories::new(Arc::clone(memory), config.memory.top_k));
    }

    let gateway = if config.mcp.enabled {
        let gateway = Arc::new(RemoteGateway::from_servers_file(
            &config.mcp.servers_path,
            Arc::new(StdioConnector),
            config.guardrails(),
        ));
        let connected = gateway.start().await;
        info!(
            event_name = "system.bootstrap.remote_connected",
            connected,
            configured = gateway.configured_count(),
            "remote tool servers connected"
        );
        Some(gateway)
    } else {
        None
    };

    let mut runtime = AgentRuntime::new(Arc::new(llm), ToolCatalog::new(registry, gateway))
        .with_persona(load_persona(&config.agent.soul_path))
        .with_retry(RetryPolicy::new(
            config.llm.max_attempts,
            Duration::from_millis(config.llm.retry_base_ms),
        ))
        .with_settings(AgentSettings {
            max_iterations: config.agent.max_iterations,
            memory_top_k: config.memory.top_k,
        });
    if let Some(memory) = memory {
        runtime = runtime.with_memory(memory);
    }

    info!(
        event_name = "system.bootstrap.ready",
        model = %config.llm.model,
        local_tools = runtime.catalog().registry().len(),
        "application ready"
    );
    Ok(Application { config, runtime })
}
