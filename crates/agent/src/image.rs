use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clawby_core::{Artifact, ToolDeclaration, ToolOutput};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::tools::{required_str, Tool};

const ERROR_BODY_CHARS: usize = 200;

/// Generates an image with the Gemini image model. The bytes leave as an
/// artifact and the model only sees a summary.
pub struct GenerateImage {
    client: Client,
    api_key: SecretString,
    endpoint: String,
}

impl GenerateImage {
    pub fn new(base_url: &str, model: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().context("http client setup failed")?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/models/{model}:generateContent", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Tool for GenerateImage {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "generate_image",
            "Generate an image from a text description. The image is delivered to the user \
             separately. Use this when the user asks to create, draw, generate, or visualize an image.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Detailed description of the image: style, colors, composition and subject."
                }
            },
            "required": ["prompt"]
        }))
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let prompt = required_str(&arguments, "prompt")?;
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("image request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_CHARS).collect();
            error!(
                event_name = "agent.image.request_failed",
                status = status.as_u16(),
                body = %preview,
                "image generation failed"
            );
            return Ok(ToolOutput::error(format!("Image generation failed: {}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("image response was not JSON")?;
        let output = parse_image_response(&body, prompt);
        if let Some(artifact) = output.artifact() {
            info!(event_name = "agent.image.generated", mime_type = %artifact.mime_type, "image generated");
        }
        Ok(output)
    }
}

/// Reads the first candidate: the first `inlineData` part is the image and
/// the first text part is the caption, falling back to the prompt.
pub fn parse_image_response(body: &Value, prompt: &str) -> ToolOutput {
    let Some(parts) = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return ToolOutput::error("No image generated");
    };

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .find(|text| !text.trim().is_empty());
    let image = parts.iter().find_map(|part| {
        let inline = part.get("inlineData")?;
        let data = inline.get("data").and_then(Value::as_str)?;
        let mime_type = inline.get("mimeType").and_then(Value::as_str).unwrap_or("image/png");
        Some((data, mime_type))
    });

    match image {
        Some((data, mime_type)) => ToolOutput::WithArtifact {
            payload: json!({ "prompt": prompt }),
            artifact: Artifact {
                data: data.to_string(),
                mime_type: mime_type.to_string(),
                caption: Some(text.unwrap_or(prompt).to_string()),
            },
        },
        None => ToolOutput::json(&json!({ "error": "Model did not return an image", "text": text })),
    }
}
