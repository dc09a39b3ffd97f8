use std::time::Duration;

use async_trait::async_trait;
use clawby_core::{ConversationTurn, Part, Role, ToolCallRequest, ToolDeclaration};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};

/// Function-calling chat client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(format!("http client setup failed: {error}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/models/{model}:generateContent", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTools<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTools<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Model => "model",
        // functionResponse parts travel in a user turn
        Role::User | Role::Tool => "user",
    }
}

fn wire_part(part: &Part) -> WirePart {
    match part {
        Part::Text { text } => WirePart { text: Some(text.clone()), ..WirePart::default() },
        Part::ToolCall { call } => WirePart {
            function_call: Some(WireFunctionCall {
                name: call.name.clone(),
                args: Some(call.arguments.clone()),
            }),
            ..WirePart::default()
        },
        Part::ToolResult { name, payload } => WirePart {
            function_response: Some(WireFunctionResponse {
                name: name.clone(),
                response: json!({ "result": payload }),
            }),
            ..WirePart::default()
        },
    }
}

fn wire_contents(history: &[ConversationTurn]) -> Vec<WireContent> {
    history
        .iter()
        .filter(|turn| !turn.parts.is_empty())
        .map(|turn| WireContent {
            role: Some(wire_role(turn.role).to_string()),
            parts: turn.parts.iter().map(wire_part).collect(),
        })
        .collect()
}

fn request_body(request: CompletionRequest<'_>) -> Result<Value, LlmError> {
    let body = GenerateContentRequest {
        system_instruction: WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(request.system_instruction.to_string()),
                ..WirePart::default()
            }],
        },
        contents: wire_contents(request.history),
        tools: if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTools { function_declarations: request.tools }]
        },
    };

    serde_json::to_value(body)
        .map_err(|error| LlmError::InvalidResponse(format!("request serialization failed: {error}")))
}

/// Only the first candidate is read. Thought summaries are skipped.
fn parse_completion(body: Value) -> Result<Completion, LlmError> {
    let response: GenerateContentResponse = serde_json::from_value(body)
        .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        debug!(
            event_name = "agent.model.empty_candidates",
            prompt_feedback = ?response.prompt_feedback,
            "model returned no candidates"
        );
        return Ok(Completion::default());
    };

    let mut parts = Vec::new();
    for part in candidate.content.map(|content| content.parts).unwrap_or_default() {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(call) = part.function_call {
            parts.push(Part::ToolCall {
                call: ToolCallRequest::new(call.name, call.args.unwrap_or_default()),
            });
        } else if let Some(text) = part.text {
            parts.push(Part::text(text));
        }
    }

    if parts.is_empty() {
        debug!(
            event_name = "agent.model.empty_content",
            finish_reason = ?candidate.finish_reason,
            "candidate carried no usable parts"
        );
    }

    Ok(Completion::new(parts))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        let body = request_body(request)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| LlmError::InvalidResponse(error.without_url().to_string()))?;

        parse_completion(body)
    }
}

#[cfg(test)]
mod tests {
    use clawby_core::{ConversationTurn, Part, Role, ToolCallRequest, ToolDeclaration};
    use serde_json::{json, Map};

    use super::{parse_completion, request_body};
    use crate::llm::CompletionRequest;

    #[test]
    fn request_maps_roles_tools_and_results() {
        let mut args = Map::new();
        args.insert("timezone".to_string(), json!("+03:00"));
        let history = vec![
            ConversationTurn::user("what time is it?"),
            ConversationTurn::new(
                Role::Model,
                vec![Part::ToolCall { call: ToolCallRequest::new("get_current_time", args) }],
            ),
            ConversationTurn::new(
                Role::Tool,
                vec![Part::tool_result("get_current_time", "{\"iso\":\"2026-01-01T00:00:00Z\"}")],
            ),
        ];
        let tools = vec![ToolDeclaration::new("get_current_time", "Current time")
            .with_parameters(json!({"type": "object", "properties": {}}))];

        let body = request_body(CompletionRequest {
            system_instruction: "be brief",
            history: &history,
            tools: &tools,
        })
        .expect("request body");

        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "be brief"}]}));
        assert_eq!(body["contents"][0], json!({"role": "user", "parts": [{"text": "what time is it?"}]}));
        assert_eq!(
            body["contents"][1]["parts"][0]["functionCall"],
            json!({"name": "get_current_time", "args": {"timezone": "+03:00"}})
        );
        assert_eq!(body["contents"][2]["role"], json!("user"));
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"],
            json!({
                "name": "get_current_time",
                "response": {"result": "{\"iso\":\"2026-01-01T00:00:00Z\"}"}
            })
        );
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], json!("get_current_time"));
    }

    #[test]
    fn tools_are_omitted_when_none_are_declared() {
        let history = vec![ConversationTurn::user("hi")];
        let body = request_body(CompletionRequest {
            system_instruction: "x",
            history: &history,
            tools: &[],
        })
        .expect("request body");

        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_parts_become_text_and_calls() {
        let completion = parse_completion(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking out loud", "thought": true},
                        {"text": "Let me check."},
                        {"functionCall": {"name": "recall_memories", "args": {"query": "coffee"}}},
                        {"functionCall": {"name": "get_current_time"}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .expect("parse");

        assert_eq!(completion.text(), "Let me check.");
        let calls = completion.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "recall_memories");
        assert_eq!(calls[0].arguments["query"], json!("coffee"));
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn blocked_prompt_yields_empty_completion() {
        let completion =
            parse_completion(json!({"promptFeedback": {"blockReason": "SAFETY"}})).expect("parse");
        assert!(completion.parts.is_empty());
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        assert!(parse_completion(json!({"candidates": "nope"})).is_err());
    }
}
