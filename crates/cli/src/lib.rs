pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use clawby_core::config::{AppConfig, ConfigOverrides, LoadOptions, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "clawby",
    about = "Clawby personal assistant CLI",
    long_about = "Chat with the Clawby agent, curate its memory, and inspect tools and configuration.",
    after_help = "Examples:\n  clawby chat \"what time is it in +09:00?\"\n  clawby remember \"I prefer aisle seats\"\n  clawby recall \"seating\" --top-k 5\n  clawby doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: clawby.toml, then config/clawby.toml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Use the deterministic offline embedder for memory")]
    mock_embeddings: bool,

    #[arg(long, global = true, value_name = "LEVEL", help = "Override logging.level")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send one message, or start an interactive session when MESSAGE is omitted")]
    Chat { message: Option<String> },
    #[command(about = "Store a memory with source `user`")]
    Remember { text: String },
    #[command(about = "Recall the memories most similar to QUERY")]
    Recall {
        query: String,
        #[arg(long, help = "Maximum number of memories to return")]
        top_k: Option<usize>,
    },
    #[command(about = "Show the core memory block, or replace it with --set")]
    Core {
        #[arg(long, value_name = "TEXT")]
        set: Option<String>,
    },
    #[command(about = "List local and remote tools visible to the model")]
    Tools,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, API key, memory store and remote server definitions")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                memory_mock_embeddings: self.mock_embeddings.then_some(true),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| LoggingConfig {
            level: cli.log_level.clone().unwrap_or_else(|| "warn".to_string()),
            format: clawby_core::config::LogFormat::Compact,
        });
    logging::init_logging(&logging);

    let result = match cli.command {
        Command::Chat { message } => commands::chat::run(&options, message),
        Command::Remember { text } => commands::remember::run(&options, &text),
        Command::Recall { query, top_k } => commands::recall::run(&options, &query, top_k),
        Command::Core { set } => commands::core_memory::run(&options, set.as_deref()),
        Command::Tools => commands::tools::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn global_flags_become_load_options() {
        let cli = Cli::try_parse_from([
            "clawby",
            "recall",
            "seats",
            "--top-k",
            "5",
            "--mock-embeddings",
            "--config",
            "custom.toml",
        ])
        .expect("parse");

        let options = cli.load_options();
        assert!(options.require_file);
        assert_eq!(options.overrides.memory_mock_embeddings, Some(true));
        assert_eq!(options.config_path.as_deref(), Some(std::path::Path::new("custom.toml")));
    }

    #[test]
    fn chat_message_is_optional() {
        assert!(Cli::try_parse_from(["clawby", "chat"]).is_ok());
        assert!(Cli::try_parse_from(["clawby", "chat", "hello"]).is_ok());
        assert!(Cli::try_parse_from(["clawby", "remember"]).is_err());
    }
}
