use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guardrails::{Guardrails, SecretSet, ToolAllowlist};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub mcp: McpConfig,
    pub guardrails: GuardrailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub image_model: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub soul_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub mock_embeddings: bool,
    pub dir: PathBuf,
    pub top_k: usize,
}

#[derive(Clone, Debug)]
pub struct McpConfig {
    pub enabled: bool,
    pub servers_path: PathBuf,
    pub allowed_tools: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct GuardrailConfig {
    /// Environment variables whose values are tracked as secrets.
    pub secret_env_vars: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
    pub memory_enabled: Option<bool>,
    pub memory_mock_embeddings: Option<bool>,
    pub memory_dir: Option<PathBuf>,
    pub mcp_enabled: Option<bool>,
    pub mcp_servers_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_SECRET_ENV_VARS: &[&str] = &[
    "TELEGRAM_BOT_TOKEN",
    "MODEL_API_KEY",
    "TRANSCRIPTION_API_KEY",
    "TTS_API_KEY",
    "GOOGLE_CLIENT_ID",
    "GOOGLE_CLIENT_SECRET",
];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-2.5-flash".to_string(),
                embedding_model: "gemini-embedding-001".to_string(),
                image_model: "gemini-2.5-flash-image".to_string(),
                timeout_secs: 60,
                max_attempts: 3,
                retry_base_ms: 2_000,
            },
            agent: AgentConfig { max_iterations: 10, soul_path: PathBuf::from("memory/soul.md") },
            memory: MemoryConfig {
                enabled: true,
                mock_embeddings: false,
                dir: PathBuf::from("memory"),
                top_k: 3,
            },
            mcp: McpConfig {
                enabled: false,
                servers_path: PathBuf::from("mcp.config.json"),
                allowed_tools: Vec::new(),
            },
            guardrails: GuardrailConfig {
                secret_env_vars: DEFAULT_SECRET_ENV_VARS.iter().map(|var| var.to_string()).collect(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("clawby.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The chat model cannot run without a key; memory-only commands can.
    pub fn require_llm_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.llm
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Validation(
                    "llm.api_key is required (set CLAWBY_LLM_API_KEY or MODEL_API_KEY)".to_string(),
                )
            })
    }

    /// Guardrails built once at startup: the remote-tool allowlist plus every
    /// secret value this process knows about.
    pub fn guardrails(&self) -> Guardrails {
        let mut secrets: Vec<SecretString> = self.llm.api_key.iter().cloned().collect();
        secrets.extend(self.guardrails.secret_env_vars.iter().filter_map(|var| read_env(var)).map(secret_value));

        Guardrails::new(
            ToolAllowlist::new(self.mcp.allowed_tools.iter().cloned()),
            SecretSet::new(secrets),
        )
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(embedding_model) = llm.embedding_model {
                self.llm.embedding_model = embedding_model;
            }
            if let Some(image_model) = llm.image_model {
                self.llm.image_model = image_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = llm.max_attempts {
                self.llm.max_attempts = max_attempts;
            }
            if let Some(retry_base_ms) = llm.retry_base_ms {
                self.llm.retry_base_ms = retry_base_ms;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(soul_path) = agent.soul_path {
                self.agent.soul_path = soul_path;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(enabled) = memory.enabled {
                self.memory.enabled = enabled;
            }
            if let Some(mock_embeddings) = memory.mock_embeddings {
                self.memory.mock_embeddings = mock_embeddings;
            }
            if let Some(dir) = memory.dir {
                self.memory.dir = dir;
            }
            if let Some(top_k) = memory.top_k {
                self.memory.top_k = top_k;
            }
        }

        if let Some(mcp) = patch.mcp {
            if let Some(enabled) = mcp.enabled {
                self.mcp.enabled = enabled;
            }
            if let Some(servers_path) = mcp.servers_path {
                self.mcp.servers_path = servers_path;
            }
            if let Some(allowed_tools) = mcp.allowed_tools {
                self.mcp.allowed_tools = allowed_tools;
            }
        }

        if let Some(guardrails) = patch.guardrails {
            if let Some(secret_env_vars) = guardrails.secret_env_vars {
                self.guardrails.secret_env_vars = secret_env_vars;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key = read_env("CLAWBY_LLM_API_KEY").or_else(|| read_env("MODEL_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLAWBY_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("CLAWBY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CLAWBY_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = value;
        }
        if let Some(value) = read_env("CLAWBY_LLM_IMAGE_MODEL") {
            self.llm.image_model = value;
        }
        if let Some(value) = read_env("CLAWBY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CLAWBY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CLAWBY_LLM_MAX_ATTEMPTS") {
            self.llm.max_attempts = parse_u32("CLAWBY_LLM_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CLAWBY_LLM_RETRY_BASE_MS") {
            self.llm.retry_base_ms = parse_u64("CLAWBY_LLM_RETRY_BASE_MS", &value)?;
        }

        if let Some(value) = read_env("CLAWBY_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("CLAWBY_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("CLAWBY_AGENT_SOUL_PATH") {
            self.agent.soul_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("CLAWBY_MEMORY_ENABLED") {
            self.memory.enabled = parse_bool("CLAWBY_MEMORY_ENABLED", &value)?;
        }
        let mock = read_env("CLAWBY_MEMORY_MOCK").or_else(|| read_env("MEMORY_MOCK"));
        if let Some(value) = mock {
            self.memory.mock_embeddings = parse_bool("CLAWBY_MEMORY_MOCK", &value)?;
        }
        if let Some(value) = read_env("CLAWBY_MEMORY_DIR") {
            self.memory.dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("CLAWBY_MEMORY_TOP_K") {
            self.memory.top_k = parse_usize("CLAWBY_MEMORY_TOP_K", &value)?;
        }

        if let Some(value) = read_env("CLAWBY_MCP_ENABLED") {
            self.mcp.enabled = parse_bool("CLAWBY_MCP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CLAWBY_MCP_SERVERS_PATH") {
            self.mcp.servers_path = PathBuf::from(value);
        }
        let allowed =
            read_env("CLAWBY_MCP_ALLOWED_TOOLS").or_else(|| read_env("MCP_ALLOWED_TOOLS"));
        if let Some(value) = allowed {
            self.mcp.allowed_tools = split_list(&value);
        }

        if let Some(value) = read_env("CLAWBY_GUARDRAILS_SECRET_ENV_VARS") {
            self.guardrails.secret_env_vars = split_list(&value);
        }

        let log_level = read_env("CLAWBY_LOGGING_LEVEL").or_else(|| read_env("CLAWBY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLAWBY_LOGGING_FORMAT").or_else(|| read_env("CLAWBY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.memory_enabled {
            self.memory.enabled = enabled;
        }
        if let Some(mock_embeddings) = overrides.memory_mock_embeddings {
            self.memory.mock_embeddings = mock_embeddings;
        }
        if let Some(dir) = overrides.memory_dir {
            self.memory.dir = dir;
        }
        if let Some(enabled) = overrides.mcp_enabled {
            self.mcp.enabled = enabled;
        }
        if let Some(servers_path) = overrides.mcp_servers_path {
            self.mcp.servers_path = servers_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_memory(&self.memory)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `AppConfig::load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("clawby.toml"), PathBuf::from("config/clawby.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_attempts == 0 || llm.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "llm.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 50 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=50".to_string(),
        ));
    }
    Ok(())
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if memory.top_k == 0 || memory.top_k > 20 {
        return Err(ConfigError::Validation("memory.top_k must be in range 1..=20".to_string()));
    }
    if memory.dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("memory.dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    memory: Option<MemoryPatch>,
    mcp: Option<McpPatch>,
    guardrails: Option<GuardrailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    image_model: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_base_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
    soul_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    enabled: Option<bool>,
    mock_embeddings: Option<bool>,
    dir: Option<PathBuf>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct McpPatch {
    enabled: Option<bool>,
    servers_path: Option<PathBuf>,
    allowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailPatch {
    secret_env_vars: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
