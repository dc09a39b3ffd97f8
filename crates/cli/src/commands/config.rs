use std::env;
use std::fs;
use std::path::Path;

use clawby_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// `(key path, env var, legacy alias)`
type FieldSource = (&'static str, &'static str, Option<&'static str>);

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = config_file_path.as_deref().and_then(load_config_file_doc);
    let source = |field: FieldSource| {
        field_source(field, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: overrides > env > file > default):".to_string()];
    let mut push = |field: FieldSource, value: String| {
        lines.push(render_line(field.0, &value, source(field)));
    };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push(("llm.api_key", "CLAWBY_LLM_API_KEY", Some("MODEL_API_KEY")), api_key.to_string());
    push(("llm.base_url", "CLAWBY_LLM_BASE_URL", None), config.llm.base_url.clone());
    push(("llm.model", "CLAWBY_LLM_MODEL", None), config.llm.model.clone());
    push(("llm.embedding_model", "CLAWBY_LLM_EMBEDDING_MODEL", None), config.llm.embedding_model.clone());
    push(("llm.image_model", "CLAWBY_LLM_IMAGE_MODEL", None), config.llm.image_model.clone());
    push(("llm.timeout_secs", "CLAWBY_LLM_TIMEOUT_SECS", None), config.llm.timeout_secs.to_string());
    push(("llm.max_attempts", "CLAWBY_LLM_MAX_ATTEMPTS", None), config.llm.max_attempts.to_string());
    push(("llm.retry_base_ms", "CLAWBY_LLM_RETRY_BASE_MS", None), config.llm.retry_base_ms.to_string());

    push(
        ("agent.max_iterations", "CLAWBY_AGENT_MAX_ITERATIONS", None),
        config.agent.max_iterations.to_string(),
    );
    push(("agent.soul_path", "CLAWBY_AGENT_SOUL_PATH", None), config.agent.soul_path.display().to_string());

    push(("memory.enabled", "CLAWBY_MEMORY_ENABLED", None), config.memory.enabled.to_string());
    push(
        ("memory.mock_embeddings", "CLAWBY_MEMORY_MOCK", Some("MEMORY_MOCK")),
        config.memory.mock_embeddings.to_string(),
    );
    push(("memory.dir", "CLAWBY_MEMORY_DIR", None), config.memory.dir.display().to_string());
    push(("memory.top_k", "CLAWBY_MEMORY_TOP_K", None), config.memory.top_k.to_string());

    push(("mcp.enabled", "CLAWBY_MCP_ENABLED", None), config.mcp.enabled.to_string());
    push(("mcp.servers_path", "CLAWBY_MCP_SERVERS_PATH", None), config.mcp.servers_path.display().to_string());
    push(
        ("mcp.allowed_tools", "CLAWBY_MCP_ALLOWED_TOOLS", Some("MCP_ALLOWED_TOOLS")),
        render_list(&config.mcp.allowed_tools, "<all>"),
    );

    push(
        ("guardrails.secret_env_vars", "CLAWBY_GUARDRAILS_SECRET_ENV_VARS", None),
        render_list(&config.guardrails.secret_env_vars, "<none>"),
    );
    push(
        ("guardrails.tracked_secrets", "", None),
        config.guardrails().tracked_secret_count().to_string(),
    );

    push(("logging.level", "CLAWBY_LOGGING_LEVEL", Some("CLAWBY_LOG_LEVEL")), config.logging.level.clone());
    push(
        ("logging.format", "CLAWBY_LOGGING_FORMAT", Some("CLAWBY_LOG_FORMAT")),
        format!("{:?}", config.logging.format).to_ascii_lowercase(),
    );

    CommandResult::text(lines.join("\n"))
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    (key_path, env_key, alias): FieldSource,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for key in [Some(env_key), alias].into_iter().flatten().filter(|key| !key.is_empty()) {
        if env::var(key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    if env_key.is_empty() {
        "derived".to_string()
    } else {
        "default".to_string()
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_list(values: &[String], empty: &str) -> String {
    if values.is_empty() {
        empty.to_string()
    } else {
        values.join(",")
    }
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
