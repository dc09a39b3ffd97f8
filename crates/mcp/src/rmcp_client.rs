//! Stdio child-process transport over `rmcp`.

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content, RawContent};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{ContentPart, RemoteTool, RemoteToolClient, ServerConnector, ToolCallReply};
use crate::config::ServerDefinition;
use crate::McpError;

/// Launches each server as a child process speaking MCP over stdin/stdout.
#[derive(Clone, Debug, Default)]
pub struct StdioConnector;

#[async_trait]
impl ServerConnector for StdioConnector {
    async fn connect(
        &self,
        name: &str,
        definition: &ServerDefinition,
    ) -> Result<Box<dyn RemoteToolClient>, McpError> {
        let mut command = Command::new(&definition.command);
        command.args(&definition.args).envs(&definition.env);

        let transport = TokioChildProcess::new(command).map_err(|error| McpError::Launch {
            server: name.to_string(),
            message: error.to_string(),
        })?;

        let service = ().serve(transport).await.map_err(|error| McpError::Launch {
            server: name.to_string(),
            message: format!("initialize handshake failed: {error}"),
        })?;

        info!(
            event_name = "mcp.server.handshake_completed",
            server = %name,
            command = %definition.command,
            "remote server initialized"
        );

        Ok(Box::new(RmcpClient {
            server: name.to_string(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }))
    }
}

struct RmcpClient {
    server: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl RmcpClient {
    fn request_error(&self, message: impl Into<String>) -> McpError {
        McpError::Request { server: self.server.clone(), message: message.into() }
    }
}

#[async_trait]
impl RemoteToolClient for RmcpClient {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|error| self.request_error(format!("tools/list failed: {error}")))?;

        Ok(tools
            .into_iter()
            .map(|tool| RemoteTool {
                name: tool.name.to_string(),
                description: tool.description.map(|description| description.to_string()),
                input_schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallReply, McpError> {
        let result = self
            .peer
            .call_tool(CallToolRequestParam { name: name.to_string().into(), arguments: Some(arguments) })
            .await
            .map_err(|error| self.request_error(format!("tools/call failed: {error}")))?;

        Ok(map_call_result(result))
    }

    async fn close(&self) -> Result<(), McpError> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        let reason = service
            .cancel()
            .await
            .map_err(|error| self.request_error(format!("shutdown failed: {error}")))?;
        debug!(event_name = "mcp.server.closed", server = %self.server, reason = ?reason, "transport closed");
        Ok(())
    }

    fn multiplexed(&self) -> bool {
        true
    }
}

fn map_call_result(result: CallToolResult) -> ToolCallReply {
    let mut content: Vec<ContentPart> = result.content.into_iter().map(map_content).collect();

    if content.is_empty() {
        if let Some(structured) = result.structured_content {
            content.push(ContentPart::Other(structured));
        }
    }

    ToolCallReply { content, is_error: result.is_error.unwrap_or(false) }
}

fn map_content(content: Content) -> ContentPart {
    if let RawContent::Text(text) = &content.raw {
        return ContentPart::Text(text.text.clone());
    }
    match serde_json::to_value(&content) {
        Ok(value) => ContentPart::Other(value),
        Err(error) => ContentPart::Other(Value::String(format!("[unserializable content: {error}]"))),
    }
}
