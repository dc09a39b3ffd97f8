use serde::{Deserialize, Serialize};

use crate::domain::tool::ToolCallRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall { call: ToolCallRequest },
    ToolResult { name: String, payload: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::ToolResult { name: name.into(), payload: payload.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallRequest> {
        match self {
            Self::ToolCall { call } => Some(call),
            _ => None,
        }
    }
}

/// One entry of conversation history. Turns are never edited after they are
/// appended; the orchestrator only pushes new ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// Concatenated text parts, empty when the turn holds only tool traffic.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect::<Vec<_>>().join("")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.parts.iter().filter_map(Part::as_tool_call).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{ConversationTurn, Part, Role};
    use crate::domain::tool::ToolCallRequest;

    #[test]
    fn text_joins_only_text_parts() {
        let turn = ConversationTurn::new(
            Role::Model,
            vec![
                Part::text("Looking that up"),
                Part::ToolCall { call: ToolCallRequest::new("get_current_time", Map::new()) },
                Part::text(" now."),
            ],
        );

        assert_eq!(turn.text(), "Looking that up now.");
        assert_eq!(turn.tool_calls().len(), 1);
        assert_eq!(turn.tool_calls()[0].name, "get_current_time");
    }

    #[test]
    fn parts_serialize_with_kind_tag() {
        let part = Part::tool_result("get_current_time", "{\"iso\":\"x\"}");
        let value = serde_json::to_value(&part).expect("serialize part");
        assert_eq!(
            value,
            json!({"kind": "tool_result", "name": "get_current_time", "payload": "{\"iso\":\"x\"}"})
        );
    }
}
