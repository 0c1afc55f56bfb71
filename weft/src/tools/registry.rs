//! [`ToolRegistry`]: ordered Name → Tool mapping with deterministic schema
//! export.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::ToolError;
use crate::tools::{Tool, ToolContext};

/// Ordered mapping Name → Tool. Wrapped in `tokio::sync::RwLock` so it is
/// `Send + Sync` and safe for concurrent use, matching the async-end-to-end
/// `Execute` path.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

struct Inner {
    order: Vec<String>,
    tools: HashMap<String, Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                order: Vec::new(),
                tools: HashMap::new(),
            }),
        }
    }

    /// Replaces any tool of the same name; preserves insertion order on
    /// first insert. There is no partial state visible mid-registration:
    /// the write lock is held for the whole operation.
    pub async fn register(&self, tool: Tool) {
        let mut inner = self.inner.write().await;
        if !inner.tools.contains_key(&tool.name) {
            inner.order.push(tool.name.clone());
        }
        inner.tools.insert(tool.name.clone(), tool);
    }

    pub async fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.tools.remove(name).is_some() {
            inner.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.tools.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clones the tool descriptor out, so schema export and execution don't
    /// hold the registry lock across an async handler call.
    pub async fn get(&self, name: &str) -> Option<Tool> {
        self.inner.read().await.tools.get(name).cloned()
    }

    /// Resolves `name`, applies declared defaults, validates required
    /// arguments, and invokes the handler. Any handler error is propagated
    /// verbatim.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Map<String, serde_json::Value>,
        ctx: ToolContext,
    ) -> Result<crate::tools::AnyValue, ToolError> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(ctx, args).await
    }

    /// All tool descriptors in insertion order.
    pub async fn all(&self) -> Vec<Tool> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| inner.tools.get(name).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AnyValue, ParamType, ToolParam};

    fn noop_tool(name: &str) -> Tool {
        Tool::new(name.to_string(), "desc", |_ctx, _args| async { Ok(AnyValue::String("ok".into())) })
    }

    #[tokio::test]
    async fn register_preserves_insertion_order_and_replaces_same_name() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("a")).await;
        registry.register(noop_tool("b")).await;
        registry.register(noop_tool("a")).await;
        assert_eq!(registry.names().await, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn execute_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::Map::new(), ToolContext::new("missing", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn execute_missing_required_argument_fails() {
        let registry = ToolRegistry::new();
        let tool = Tool::new("t", "d", |_ctx, _args| async { Ok(AnyValue::String("ok".into())) })
            .with_param(ToolParam::new("x", ParamType::String).required());
        registry.register(tool).await;
        let err = registry
            .execute("t", serde_json::Map::new(), ToolContext::new("t", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument(name) if name == "x"));
    }
}
