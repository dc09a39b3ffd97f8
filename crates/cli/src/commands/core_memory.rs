use clawby_core::config::LoadOptions;
use clawby_core::ApplicationError;

use crate::bootstrap::{load_config, require_memory};
use crate::commands::{block_on, CommandResult};

/// Prints the core memory block, or replaces it when `set` is given.
pub fn run(options: &LoadOptions, set: Option<&str>) -> CommandResult {
    let memory = match load_config(options).and_then(|config| require_memory(&config)) {
        Ok(memory) => memory,
        Err(error) => return CommandResult::from_error("core", error),
    };

    block_on("core", async {
        let Some(text) = set else {
            let current = memory.core_memory().await;
            return CommandResult::text(if current.is_empty() { "<empty>".to_string() } else { current });
        };

        match memory.set_core_memory(text).await {
            Ok(()) if text.trim().is_empty() => CommandResult::success("core", "core memory cleared"),
            Ok(()) => CommandResult::success("core", "core memory updated"),
            Err(error) => CommandResult::from_error("core", ApplicationError::Memory(error.to_string())),
        }
    })
    .unwrap_or_else(|failure| failure)
}
