use std::collections::BTreeSet;
use std::sync::Arc;

use clawby_core::{ToolCallRequest, ToolDeclaration, ToolOutput};
use clawby_mcp::RemoteGateway;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;

/// Every tool the model can see: the local registry plus whatever the remote
/// gateway advertises. Local names win over remote ones.
///
/// The merged declaration list is computed on first use and kept until
/// [`ToolCatalog::invalidate`] is called.
pub struct ToolCatalog {
    registry: ToolRegistry,
    gateway: Option<Arc<RemoteGateway>>,
    cache: RwLock<Option<Arc<Vec<ToolDeclaration>>>>,
}

impl ToolCatalog {
    pub fn new(registry: ToolRegistry, gateway: Option<Arc<RemoteGateway>>) -> Self {
        Self { registry, gateway, cache: RwLock::new(None) }
    }

    pub fn local_only(registry: ToolRegistry) -> Self {
        Self::new(registry, None)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> Option<&Arc<RemoteGateway>> {
        self.gateway.as_ref()
    }

    pub async fn declarations(&self) -> Arc<Vec<ToolDeclaration>> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Arc::clone(cached);
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            return Arc::clone(cached);
        }

        let merged = Arc::new(self.merge().await);
        debug!(event_name = "agent.tools.cached", count = merged.len(), "tool declarations cached");
        *cache = Some(Arc::clone(&merged));
        merged
    }

    pub async fn is_cached(&self) -> bool {
        self.cache.read().await.is_some()
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!(event_name = "agent.tools.invalidated", "tool declaration cache cleared");
    }

    async fn merge(&self) -> Vec<ToolDeclaration> {
        let mut declarations = self.registry.declarations();
        let Some(gateway) = &self.gateway else {
            return declarations;
        };

        let local: BTreeSet<String> = declarations.iter().map(|decl| decl.name.clone()).collect();
        for remote in gateway.declarations().await {
            if local.contains(&remote.name) {
                warn!(
                    event_name = "agent.tools.shadowed",
                    tool = %remote.name,
                    "remote tool hidden by a local tool with the same name"
                );
                continue;
            }
            declarations.push(remote);
        }
        declarations
    }

    /// Routes one call to the local registry or the gateway. Never fails.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolOutput {
        if self.registry.contains(&call.name) {
            info!(event_name = "agent.tool.dispatched", tool = %call.name, origin = "local", "tool call");
            return self.registry.execute(&call.name, call.arguments.clone()).await;
        }

        if let Some(gateway) = &self.gateway {
            if gateway.owns_tool(&call.name).await {
                info!(event_name = "agent.tool.dispatched", tool = %call.name, origin = "remote", "tool call");
                return ToolOutput::Text(gateway.execute(&call.name, call.arguments.clone()).await);
            }
        }

        warn!(event_name = "agent.tool.unknown", tool = %call.name, "model called an unknown tool");
        ToolOutput::error(format!("Unknown tool: {}", call.name))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use clawby_core::{ToolCallRequest, ToolDeclaration, ToolOutput};
    use serde_json::{json, Map, Value};

    use super::ToolCatalog;
    use crate::tools::{Tool, ToolRegistry};

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new(self.0, "test tool")
        }

        async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolOutput> {
            Ok(ToolOutput::json(&json!({"tool": self.0})))
        }
    }

    #[tokio::test]
    async fn declarations_are_cached_until_invalidated() {
        let mut registry = ToolRegistry::default();
        registry.register(Named("b"));
        registry.register(Named("a"));
        let catalog = ToolCatalog::local_only(registry);

        assert!(!catalog.is_cached().await);
        let first = catalog.declarations().await;
        assert!(catalog.is_cached().await);
        let names: Vec<&str> = first.iter().map(|decl| decl.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        catalog.invalidate().await;
        assert!(!catalog.is_cached().await);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_payload() {
        let catalog = ToolCatalog::local_only(ToolRegistry::default());
        let output = catalog.dispatch(&ToolCallRequest::new("missing", Map::new())).await;
        assert_eq!(output.model_payload(), json!({"error": "Unknown tool: missing"}).to_string());
    }
}
