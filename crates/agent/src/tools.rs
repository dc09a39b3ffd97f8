use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clawby_core::{ToolDeclaration, ToolOutput};
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{error, warn};

/// An in-process capability. The tool decides the shape of its own output,
/// including whether it carries an artifact.
#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;
    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(event_name = "agent.tool.replaced", tool = %name, "tool registered twice");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|tool| tool.declaration()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Never fails: errors and panics inside the tool come back as an
    /// `{"error": ...}` payload.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };

        match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(failure)) => {
                error!(event_name = "agent.tool.failed", tool = %name, error = %failure, "local tool failed");
                ToolOutput::error(format!("Tool \"{name}\" failed: {failure}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(event_name = "agent.tool.panicked", tool = %name, panic = %message, "local tool panicked");
                ToolOutput::error(format!("Tool \"{name}\" failed: {message}"))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

/// Reads a required, non-blank string argument.
pub fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument `{key}`"))
}

pub fn optional_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use clawby_core::{ToolDeclaration, ToolOutput};
    use serde_json::{json, Map, Value};

    use super::{required_str, Tool, ToolRegistry};

    struct Echo;
    struct Failing;
    struct Panicking;

    #[async_trait]
    impl Tool for Echo {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("echo", "Echo the text argument")
        }

        async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolOutput> {
            Ok(ToolOutput::json(&json!({"echo": required_str(&arguments, "text")?})))
        }
    }

    #[async_trait]
    impl Tool for Failing {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("failing", "Always fails")
        }

        async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolOutput> {
            bail!("upstream returned 502")
        }
    }

    #[async_trait]
    impl Tool for Panicking {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("panicking", "Always panics")
        }

        async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolOutput> {
            panic!("index out of bounds")
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(Panicking);
        registry.register(Echo);
        registry.register(Failing);
        registry
    }

    fn payload(output: &ToolOutput) -> Value {
        serde_json::from_str(&output.model_payload()).unwrap_or(Value::Null)
    }

    #[test]
    fn declarations_are_sorted_by_name() {
        let names: Vec<String> = registry().declarations().into_iter().map(|decl| decl.name).collect();
        assert_eq!(names, vec!["echo", "failing", "panicking"]);
    }

    #[tokio::test]
    async fn success_passes_output_through() {
        let mut arguments = Map::new();
        arguments.insert("text".to_string(), json!("hi"));
        let output = registry().execute("echo", arguments).await;
        assert_eq!(payload(&output), json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn errors_and_panics_become_error_payloads() {
        let registry = registry();

        let failed = registry.execute("failing", Map::new()).await;
        assert_eq!(payload(&failed), json!({"error": "Tool \"failing\" failed: upstream returned 502"}));

        let missing_arg = registry.execute("echo", Map::new()).await;
        assert_eq!(
            payload(&missing_arg),
            json!({"error": "Tool \"echo\" failed: missing required argument `text`"})
        );

        let panicked = registry.execute("panicking", Map::new()).await;
        assert_eq!(payload(&panicked), json!({"error": "Tool \"panicking\" failed: index out of bounds"}));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let output = registry().execute("nope", Map::new()).await;
        assert_eq!(payload(&output), json!({"error": "Unknown tool: nope"}));
    }
}
