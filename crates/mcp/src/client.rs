use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::ServerDefinition;
use crate::McpError;

/// A tool as a remote server advertises it.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentPart {
    Text(String),
    Other(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallReply {
    pub content: Vec<ContentPart>,
    pub is_error: bool,
}

impl ToolCallReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: vec![ContentPart::Text(text.into())], is_error: false }
    }

    /// Text parts verbatim, other parts as JSON, one per line.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => text.clone(),
                ContentPart::Other(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.content
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => serde_json::json!({"type": "text", "text": text}),
                    ContentPart::Other(value) => value.clone(),
                })
                .collect(),
        )
    }
}

/// Connection to one remote tool server, after the initialize handshake.
#[async_trait]
pub trait RemoteToolClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallReply, McpError>;

    async fn close(&self) -> Result<(), McpError>;

    /// Whether concurrent calls may share the channel. Clients that return
    /// `false` get one call at a time.
    fn multiplexed(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait ServerConnector: Send + Sync {
    /// `definition` arrives with its env placeholders already resolved.
    async fn connect(
        &self,
        name: &str,
        definition: &ServerDefinition,
    ) -> Result<Box<dyn RemoteToolClient>, McpError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContentPart, ToolCallReply};

    #[test]
    fn text_parts_join_and_other_parts_serialize() {
        let reply = ToolCallReply {
            content: vec![
                ContentPart::Text("first".to_string()),
                ContentPart::Other(json!({"mimeType": "image/png"})),
                ContentPart::Text("last".to_string()),
            ],
            is_error: false,
        };

        assert_eq!(
            reply.joined_text(),
            "first\n{\"mimeType\":\"image/png\"}\nlast"
        );
    }
}
