use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Name, description and parameter schema advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), parameters: None }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { name: name.into(), arguments }
    }
}

/// Binary payload produced by a tool that must travel out of band, never
/// through the model context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Base64 encoded bytes.
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    WithArtifact { payload: Value, artifact: Artifact },
}

impl ToolOutput {
    pub fn json(value: &Value) -> Self {
        Self::Text(value.to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::json(&error_payload(message))
    }

    /// Payload for the model. Artifact bytes are replaced by a short summary.
    pub fn model_payload(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::WithArtifact { payload, artifact } => {
                let mut summary = match payload {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        let mut map = Map::new();
                        map.insert("result".to_string(), other.clone());
                        map
                    }
                };
                summary.entry("success").or_insert(Value::Bool(true));
                summary.insert("image_generated".to_string(), Value::Bool(true));
                summary.insert("mime_type".to_string(), json!(artifact.mime_type));
                if let Some(caption) = &artifact.caption {
                    summary.entry("caption").or_insert_with(|| json!(caption));
                }
                Value::Object(summary).to_string()
            }
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Text(_) => None,
            Self::WithArtifact { artifact, .. } => Some(artifact),
        }
    }

    pub fn into_artifact(self) -> Option<Artifact> {
        match self {
            Self::Text(_) => None,
            Self::WithArtifact { artifact, .. } => Some(artifact),
        }
    }
}

pub fn error_payload(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{Artifact, ToolOutput};

    #[test]
    fn error_output_is_structured_json() {
        let output = ToolOutput::error("Unknown tool: nope");
        let parsed: Value = serde_json::from_str(&output.model_payload()).expect("valid json");
        assert_eq!(parsed, json!({"error": "Unknown tool: nope"}));
        assert!(output.artifact().is_none());
    }

    #[test]
    fn artifact_payload_for_model_omits_bytes() {
        let output = ToolOutput::WithArtifact {
            payload: json!({"status": "ok"}),
            artifact: Artifact {
                data: "aGVsbG8gd29ybGQ=".to_string(),
                mime_type: "image/png".to_string(),
                caption: Some("a lighthouse at dusk".to_string()),
            },
        };

        let payload = output.model_payload();
        assert!(!payload.contains("aGVsbG8gd29ybGQ="));
        let parsed: Value = serde_json::from_str(&payload).expect("valid json");
        assert_eq!(parsed["image_generated"], json!(true));
        assert_eq!(parsed["caption"], json!("a lighthouse at dusk"));
    }
}
