use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clawby_agent::{AgentReply, AgentRuntime};
use clawby_core::config::LoadOptions;
use clawby_core::{ApplicationError, Artifact, ConversationTurn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::bootstrap;
use crate::commands::{block_on, CommandResult};

pub const ARTIFACT_DIR: &str = "artifacts";

pub fn run(options: &LoadOptions, message: Option<String>) -> CommandResult {
    block_on("chat", async {
        let app = match bootstrap(options).await {
            Ok(app) => app,
            Err(error) => return CommandResult::from_error("chat", error),
        };

        let result = match message {
            Some(message) => one_shot(&app.runtime, &message).await,
            None => repl(&app.runtime).await,
        };
        app.runtime.shutdown().await;
        result
    })
    .unwrap_or_else(|failure| failure)
}

async fn one_shot(runtime: &AgentRuntime, message: &str) -> CommandResult {
    match runtime.run(message, &[]).await {
        Ok(reply) => CommandResult::text(render_reply(&reply, Path::new(ARTIFACT_DIR))),
        Err(error) => CommandResult::from_error("chat", error),
    }
}

/// Reads one message per line. History keeps the user turns and the final
/// model answers, not the tool traffic in between.
async fn repl(runtime: &AgentRuntime) -> CommandResult {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ConversationTurn> = Vec::new();
    println!("clawby chat. /reset clears history, /reconnect restarts remote tools, /exit quits.");

    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(event_name = "cli.chat.stdin_failed", error = %error, "stdin read failed");
                break;
            }
        };

        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                history.clear();
                println!("history cleared");
                continue;
            }
            "/reconnect" => {
                let connected = runtime.reconnect_remote().await;
                println!("remote servers connected: {connected}");
                continue;
            }
            _ => {}
        }

        match runtime.run(&line, &history).await {
            Ok(reply) => {
                println!("clawby> {}", render_reply(&reply, Path::new(ARTIFACT_DIR)));
                history.push(ConversationTurn::user(line.trim()));
                history.push(ConversationTurn::model(reply.text));
            }
            Err(error) => {
                let failure = CommandResult::from_error("chat", ApplicationError::from(error));
                println!("{}", failure.output);
            }
        }
    }

    CommandResult::text("bye")
}

fn render_reply(reply: &AgentReply, artifact_dir: &Path) -> String {
    let mut output = reply.text.clone();
    for path in save_artifacts(artifact_dir, &reply.artifacts) {
        output.push_str(&format!("\n[artifact saved: {}]", path.display()));
    }
    output
}

/// Decodes each artifact into `dir`. Artifacts that fail to decode or write
/// are logged and skipped.
pub fn save_artifacts(dir: &Path, artifacts: &[Artifact]) -> Vec<PathBuf> {
    if artifacts.is_empty() {
        return Vec::new();
    }
    if let Err(error) = std::fs::create_dir_all(dir) {
        warn!(event_name = "cli.artifact.dir_failed", dir = %dir.display(), error = %error, "artifact dir unavailable");
        return Vec::new();
    }

    let mut saved = Vec::new();
    for artifact in artifacts {
        let bytes = match STANDARD.decode(artifact.data.trim()) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(event_name = "cli.artifact.decode_failed", error = %error, "artifact skipped");
                continue;
            }
        };

        let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension_for(&artifact.mime_type)));
        match std::fs::write(&path, &bytes) {
            Ok(()) => {
                info!(
                    event_name = "cli.artifact.saved",
                    path = %path.display(),
                    bytes = bytes.len(),
                    "artifact saved"
                );
                saved.push(path);
            }
            Err(error) => {
                warn!(event_name = "cli.artifact.write_failed", path = %path.display(), error = %error, "artifact skipped");
            }
        }
    }
    saved
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}
