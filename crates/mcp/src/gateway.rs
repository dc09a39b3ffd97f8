use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use clawby_core::guardrails::Guardrails;
use clawby_core::{error_payload, ToolDeclaration};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::client::{RemoteTool, RemoteToolClient, ServerConnector};
use crate::config::{load_server_definitions, ServerDefinition};

const RESULT_LOG_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSummary {
    pub name: String,
    pub tools: Vec<String>,
}

struct ConnectedServer {
    name: String,
    client: Box<dyn RemoteToolClient>,
    tools: Vec<RemoteTool>,
    call_lock: Mutex<()>,
}

impl ConnectedServer {
    fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }
}

/// The set of connected remote tool servers. Servers are kept in name order,
/// and when two servers expose the same tool name the first one owns it.
pub struct RemoteGateway {
    connector: Arc<dyn ServerConnector>,
    definitions: BTreeMap<String, ServerDefinition>,
    guardrails: Guardrails,
    servers: RwLock<Vec<Arc<ConnectedServer>>>,
}

impl RemoteGateway {
    pub fn new(
        connector: Arc<dyn ServerConnector>,
        definitions: BTreeMap<String, ServerDefinition>,
        guardrails: Guardrails,
    ) -> Self {
        Self { connector, definitions, guardrails, servers: RwLock::new(Vec::new()) }
    }

    /// Reads definitions from `path`. An unreadable or invalid file is logged
    /// and yields a gateway with no servers.
    pub fn from_servers_file(
        path: &Path,
        connector: Arc<dyn ServerConnector>,
        guardrails: Guardrails,
    ) -> Self {
        let definitions = load_server_definitions(path).unwrap_or_else(|load_error| {
            error!(
                event_name = "mcp.config.load_failed",
                path = %path.display(),
                error = %load_error,
                "server definitions ignored"
            );
            BTreeMap::new()
        });
        Self::new(connector, definitions, guardrails)
    }

    pub fn guardrails(&self) -> &Guardrails {
        &self.guardrails
    }

    pub fn configured_count(&self) -> usize {
        self.definitions.len()
    }

    /// Connects every configured server that is not connected yet. Failures
    /// are logged and the server is left out. Returns the connected count.
    pub async fn start(&self) -> usize {
        let mut servers = self.servers.write().await;

        for (name, definition) in &self.definitions {
            if servers.iter().any(|server| &server.name == name) {
                continue;
            }
            match self.connect_one(name, definition).await {
                Ok(server) => servers.push(Arc::new(server)),
                Err(message) => error!(
                    event_name = "mcp.server.connect_failed",
                    server = %name,
                    error = %message,
                    "remote server unavailable, continuing without it"
                ),
            }
        }

        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers.len()
    }

    async fn connect_one(
        &self,
        name: &str,
        definition: &ServerDefinition,
    ) -> Result<ConnectedServer, String> {
        let resolved = definition.resolved();
        let client = self.connector.connect(name, &resolved).await.map_err(|e| e.to_string())?;

        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(list_error) => {
                if let Err(close_error) = client.close().await {
                    debug!(server = %name, error = %close_error, "close after failed discovery");
                }
                return Err(list_error.to_string());
            }
        };

        info!(
            event_name = "mcp.server.connected",
            server = %name,
            tool_count = tools.len(),
            tools = %tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>().join(", "),
            "remote server connected"
        );

        Ok(ConnectedServer { name: name.to_string(), client, tools, call_lock: Mutex::new(()) })
    }

    /// Disconnects every server. Individual close failures are ignored.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<ConnectedServer>> = self.servers.write().await.drain(..).collect();

        for server in drained {
            match server.client.close().await {
                Ok(()) => info!(
                    event_name = "mcp.server.disconnected",
                    server = %server.name,
                    "remote server disconnected"
                ),
                Err(close_error) => debug!(
                    event_name = "mcp.server.disconnect_failed",
                    server = %server.name,
                    error = %close_error,
                    "ignoring disconnect failure"
                ),
            }
        }
    }

    pub async fn reconnect(&self) -> usize {
        self.shutdown().await;
        self.start().await
    }

    pub async fn connected_count(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn server_summaries(&self) -> Vec<ServerSummary> {
        self.servers
            .read()
            .await
            .iter()
            .map(|server| ServerSummary {
                name: server.name.clone(),
                tools: server.tools.iter().map(|tool| tool.name.clone()).collect(),
            })
            .collect()
    }

    pub async fn owns_tool(&self, name: &str) -> bool {
        self.servers.read().await.iter().any(|server| server.has_tool(name))
    }

    /// Allowlisted remote tools, one declaration per name.
    pub async fn declarations(&self) -> Vec<ToolDeclaration> {
        let servers = self.servers.read().await;
        let mut seen = BTreeSet::new();
        let mut declarations = Vec::new();

        for server in servers.iter() {
            for tool in &server.tools {
                if !self.guardrails.is_tool_allowed(&tool.name) {
                    continue;
                }
                if !seen.insert(tool.name.clone()) {
                    warn!(
                        event_name = "mcp.tool.shadowed",
                        tool = %tool.name,
                        server = %server.name,
                        "tool name already provided by an earlier server"
                    );
                    continue;
                }
                declarations.push(declaration_for(&server.name, tool));
            }
        }

        declarations
    }

    /// Runs guardrails, then proxies the call to the owning server. Always
    /// returns a payload string; failures become `{"error": ...}`.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> String {
        if let Err(violation) = self.guardrails.evaluate_call(name, &arguments) {
            error!(
                event_name = "mcp.guardrail.blocked",
                tool = %name,
                reason_code = violation.reason_code(),
                field_path = violation.field_path().unwrap_or(""),
                "remote tool call blocked"
            );
            return error_payload(violation.to_string()).to_string();
        }

        let owner = self.servers.read().await.iter().find(|server| server.has_tool(name)).cloned();
        let Some(server) = owner else {
            return error_payload(format!("No remote server provides tool \"{name}\"")).to_string();
        };

        let redacted = self.guardrails.redact_for_log(&Value::Object(arguments.clone()));
        info!(
            event_name = "mcp.tool.call_started",
            tool = %name,
            server = %server.name,
            arguments = %redacted,
            "remote tool call"
        );

        let result = if server.client.multiplexed() {
            server.client.call_tool(name, arguments).await
        } else {
            let _guard = server.call_lock.lock().await;
            server.client.call_tool(name, arguments).await
        };

        match result {
            Ok(reply) => {
                let logged = self.guardrails.redact_for_log(&reply.to_json()).to_string();
                info!(
                    event_name = "mcp.tool.call_completed",
                    tool = %name,
                    server = %server.name,
                    is_error = reply.is_error,
                    result = %truncate(&logged, RESULT_LOG_CHARS),
                    "remote tool result"
                );

                let text = reply.joined_text();
                if reply.is_error {
                    error_payload(text).to_string()
                } else {
                    text
                }
            }
            Err(call_error) => {
                error!(
                    event_name = "mcp.tool.call_failed",
                    tool = %name,
                    server = %server.name,
                    error = %call_error,
                    "remote tool call failed"
                );
                error_payload(format!("Remote tool \"{name}\" failed: {call_error}")).to_string()
            }
        }
    }
}

fn declaration_for(server: &str, tool: &RemoteTool) -> ToolDeclaration {
    let description = tool
        .description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Remote tool from {server}"));

    let declaration = ToolDeclaration::new(&tool.name, description);
    match normalize_schema(&tool.input_schema) {
        Some(parameters) => declaration.with_parameters(parameters),
        None => declaration,
    }
}

/// Reduces a JSON schema to `{type: "object", properties, required}`. Schemas
/// without `properties` advertise no parameters.
pub fn normalize_schema(schema: &Value) -> Option<Value> {
    let properties = schema.get("properties").filter(|properties| properties.is_object())?;
    let required: Vec<Value> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|item| item.is_string()).cloned().collect())
        .unwrap_or_default();

    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
