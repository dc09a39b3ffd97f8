pub mod chat;
pub mod config;
pub mod core_memory;
pub mod doctor;
pub mod recall;
pub mod remember;
pub mod tools;

use std::future::Future;

use clawby_core::ApplicationError;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_BAD_INPUT: u8 = 3;
pub const EXIT_UNAVAILABLE: u8 = 4;
pub const EXIT_INTERNAL: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Logs the full error under a fresh correlation id and reports only the
    /// user-safe message.
    pub fn from_error(command: &str, failure: impl Into<ApplicationError>) -> Self {
        let failure = failure.into();
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            event_name = "cli.command.failed",
            command,
            correlation_id = %correlation_id,
            error = %failure,
            "command failed"
        );

        let (error_class, exit_code) = match &failure {
            ApplicationError::InvalidInput(_) => ("invalid_input", EXIT_BAD_INPUT),
            ApplicationError::Model(_) => ("model_unavailable", EXIT_UNAVAILABLE),
            ApplicationError::Memory(_) => ("memory_unavailable", EXIT_UNAVAILABLE),
            ApplicationError::Integration(_) => ("integration_unavailable", EXIT_UNAVAILABLE),
            ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
        };
        let interface = failure.into_interface(correlation_id);
        Self::failure(
            command,
            error_class,
            format!("{} (ref: {})", interface.user_message(), interface.correlation_id()),
            exit_code,
        )
    }
}

/// Drives `future` on a single-threaded runtime, the way every command runs.
pub fn block_on<F, T>(command: &str, future: F) -> Result<T, CommandResult>
where
    F: Future<Output = T>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|runtime| runtime.block_on(future))
        .map_err(|error| {
            CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_INTERNAL,
            )
        })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use clawby_core::ApplicationError;
    use serde_json::Value;

    use super::{CommandResult, EXIT_CONFIG, EXIT_UNAVAILABLE};

    #[test]
    fn failures_show_only_user_safe_text() {
        let result = CommandResult::from_error(
            "chat",
            ApplicationError::Model("HTTP 400 x-goog-api-key=AIza-leaked".to_string()),
        );

        assert_eq!(result.exit_code, EXIT_UNAVAILABLE);
        assert!(!result.output.contains("AIza-leaked"));
        let payload: Value = serde_json::from_str(&result.output).expect("json output");
        assert_eq!(payload["error_class"], "model_unavailable");
        assert!(payload["message"].as_str().unwrap_or_default().contains("(ref: "));
    }

    #[test]
    fn configuration_failures_use_config_exit_code() {
        let result = CommandResult::from_error(
            "tools",
            ApplicationError::Configuration("llm.api_key is required".to_string()),
        );
        assert_eq!(result.exit_code, EXIT_CONFIG);
    }
}
