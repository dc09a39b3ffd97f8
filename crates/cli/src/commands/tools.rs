use clawby_core::config::LoadOptions;

use crate::bootstrap::bootstrap;
use crate::commands::{block_on, CommandResult};

/// Lists the merged tool declarations and the connected remote servers.
pub fn run(options: &LoadOptions) -> CommandResult {
    block_on("tools", async {
        let app = match bootstrap(options).await {
            Ok(app) => app,
            Err(error) => return CommandResult::from_error("tools", error),
        };

        let catalog = app.runtime.catalog();
        let declarations = catalog.declarations().await;
        let mut lines = vec![format!("tools ({}):", declarations.len())];
        for declaration in declarations.iter() {
            let origin = if catalog.registry().contains(&declaration.name) { "local" } else { "remote" };
            lines.push(format!("- {} [{origin}]: {}", declaration.name, first_line(&declaration.description)));
        }

        if let Some(gateway) = catalog.gateway() {
            let servers = gateway.server_summaries().await;
            lines.push(format!("remote servers ({}/{} connected):", servers.len(), gateway.configured_count()));
            for server in servers {
                lines.push(format!("- {}: {}", server.name, server.tools.join(", ")));
            }
        } else {
            lines.push("remote servers: disabled".to_string());
        }

        app.runtime.shutdown().await;
        CommandResult::text(lines.join("\n"))
    })
    .unwrap_or_else(|failure| failure)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}
