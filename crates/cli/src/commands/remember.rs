use clawby_core::config::LoadOptions;
use clawby_core::ApplicationError;
use clawby_memory::MemorySource;

use crate::bootstrap::{load_config, require_memory};
use crate::commands::{block_on, CommandResult};

pub fn run(options: &LoadOptions, text: &str) -> CommandResult {
    let memory = match load_config(options).and_then(|config| require_memory(&config)) {
        Ok(memory) => memory,
        Err(error) => return CommandResult::from_error("remember", error),
    };

    block_on("remember", async {
        match memory.store_memory(text, MemorySource::User).await {
            Ok(entry) => CommandResult::success("remember", format!("stored {}", entry.id)),
            Err(error) => {
                CommandResult::from_error("remember", ApplicationError::Memory(error.to_string()))
            }
        }
    })
    .unwrap_or_else(|failure| failure)
}
