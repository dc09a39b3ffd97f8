use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use chrono_tz::Tz;
use clawby_core::{ToolDeclaration, ToolOutput};
use clawby_memory::{MemoryService, MemorySource};
use serde_json::{json, Map, Value};

use crate::tools::{optional_str, required_str, Tool};

pub struct GetCurrentTime;

#[async_trait]
impl Tool for GetCurrentTime {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "get_current_time",
            "Returns the current date and time in ISO 8601 format. Use this when the user asks \
             what time it is, the current date, or anything time-related.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "Optional IANA timezone such as \"Europe/Istanbul\", or a fixed UTC offset such as \"+03:00\". Defaults to UTC."
                }
            }
        }))
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput> {
        Ok(ToolOutput::json(&describe_time(Utc::now(), optional_str(&arguments, "timezone"))))
    }
}

pub fn describe_time(now: DateTime<Utc>, timezone: Option<&str>) -> Value {
    let utc = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let Some(timezone) = timezone else {
        return json!({ "iso": utc, "timestamp": now.timestamp_millis() });
    };

    match local_iso(now, timezone) {
        Some(iso) => json!({ "timezone": timezone, "iso": iso, "utc": utc }),
        None => json!({ "error": format!("Invalid timezone: {timezone}"), "utc": utc }),
    }
}

/// IANA names first, then fixed offsets.
fn local_iso(now: DateTime<Utc>, timezone: &str) -> Option<String> {
    let timezone = timezone.trim();
    if let Ok(zone) = timezone.parse::<Tz>() {
        return Some(now.with_timezone(&zone).to_rfc3339_opts(SecondsFormat::Secs, false));
    }
    parse_offset(timezone)
        .map(|offset| now.with_timezone(&offset).to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// Accepts `UTC`, `GMT`, `Z`, and offsets like `+03:00`, `-0530`, `+3` or
/// `UTC+02:00`.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    if matches!(upper.as_str(), "UTC" | "GMT" | "Z") {
        return FixedOffset::east_opt(0);
    }

    let rest = upper.strip_prefix("UTC").or_else(|| upper.strip_prefix("GMT")).unwrap_or(&upper);
    let (sign, digits) = match *rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    if !digits.is_ascii() {
        return None;
    }

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || minutes.is_empty() || minutes.len() > 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
}

pub struct SaveMemory {
    memory: Arc<MemoryService>,
}

impl SaveMemory {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SaveMemory {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "save_memory",
            "Save a fact or preference about the user to long-term memory. Use this when the \
             user shares something worth remembering across conversations.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "The fact to remember, as one short sentence."}
            },
            "required": ["text"]
        }))
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let text = required_str(&arguments, "text")?;
        let entry = self.memory.store_memory(text, MemorySource::Auto).await?;
        Ok(ToolOutput::json(&json!({ "success": true, "id": entry.id, "stored": entry.text })))
    }
}

pub struct RecallMemories {
    memory: Arc<MemoryService>,
    default_top_k: usize,
}

impl RecallMemories {
    pub fn new(memory: Arc<MemoryService>, default_top_k: usize) -> Self {
        Self { memory, default_top_k }
    }
}

#[async_trait]
impl Tool for RecallMemories {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "recall_memories",
            "Search long-term memory for facts related to a query. Returns the most similar \
             stored memories with their similarity scores.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look for."},
                "top_k": {"type": "integer", "description": "Maximum number of memories to return."}
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let query = required_str(&arguments, "query")?;
        let top_k = arguments
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|value| value.clamp(1, 20) as usize)
            .unwrap_or(self.default_top_k);

        let recalled = self.memory.recall_memories(query, top_k).await?;
        let memories: Vec<Value> = recalled
            .iter()
            .map(|memory| {
                json!({
                    "text": memory.text,
                    "score": (memory.score * 1000.0).round() / 1000.0,
                    "timestamp": memory.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                })
            })
            .collect();

        Ok(ToolOutput::json(&json!({ "count": memories.len(), "memories": memories })))
    }
}
