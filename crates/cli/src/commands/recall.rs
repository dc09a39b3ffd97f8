use chrono::SecondsFormat;
use clawby_core::config::LoadOptions;
use clawby_core::ApplicationError;
use clawby_memory::RecalledMemory;

use crate::bootstrap::{load_config, require_memory};
use crate::commands::{block_on, CommandResult};

pub fn run(options: &LoadOptions, query: &str, top_k: Option<usize>) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::from_error("recall", error),
    };
    let memory = match require_memory(&config) {
        Ok(memory) => memory,
        Err(error) => return CommandResult::from_error("recall", error),
    };
    let top_k = top_k.unwrap_or(config.memory.top_k).max(1);

    block_on("recall", async {
        match memory.recall_memories(query, top_k).await {
            Ok(recalled) => CommandResult::text(render(&recalled)),
            Err(error) => {
                CommandResult::from_error("recall", ApplicationError::Memory(error.to_string()))
            }
        }
    })
    .unwrap_or_else(|failure| failure)
}

fn render(recalled: &[RecalledMemory]) -> String {
    if recalled.is_empty() {
        return "no relevant memories".to_string();
    }

    recalled
        .iter()
        .enumerate()
        .map(|(index, memory)| {
            format!(
                "{}. [{:.3}] {} ({})",
                index + 1,
                memory.score,
                memory.text,
                memory.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use clawby_memory::RecalledMemory;

    use super::render;

    #[test]
    fn renders_numbered_lines_with_scores() {
        let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).single().expect("time");
        let output = render(&[
            RecalledMemory { text: "Likes oat milk".to_string(), score: 0.9123, timestamp },
            RecalledMemory { text: "Allergic to peanuts".to_string(), score: 0.41, timestamp },
        ]);

        assert_eq!(
            output,
            "1. [0.912] Likes oat milk (2026-05-04T08:00:00Z)\n2. [0.410] Allergic to peanuts (2026-05-04T08:00:00Z)"
        );
        assert_eq!(render(&[]), "no relevant memories");
    }
}
