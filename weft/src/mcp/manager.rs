//! [`McpManager`]: owns one [`Transport`] per configured MCP server and
//! injects its tools into a [`ToolRegistry`] under a `mcp.<server>.<tool>`
//! name, idempotently — re-injecting a server removes its previously
//! injected tools first so a refreshed `tools/list` never leaves stale
//! entries behind.

use std::collections::HashMap;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, ToolError};
use crate::mcp::protocol::{parse_tools_call_result, parse_tools_list};
use crate::mcp::transport::{HttpTransport, StdioTransport, Transport};
use crate::tools::{AnyValue, Tool, ToolRegistry};

/// How a configured server is reached.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    Http {
        url: String,
        headers: Vec<(String, String)>,
    },
}

/// One MCP server registration (spec §6): transport, tool-name filters, and
/// an optional cap on how many of its tools get injected.
#[derive(Debug, Clone)]
pub struct MCPServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    /// Glob patterns matched against the server's *original* (unprefixed)
    /// tool names. Empty means "allow everything not blocked".
    pub allow: Vec<String>,
    /// Glob patterns that exclude a tool even if `allow` matches it.
    pub block: Vec<String>,
    /// Caps how many of the server's tools get injected, in `tools/list`
    /// order. `None` means uncapped.
    pub max_tools: Option<usize>,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, McpError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| McpError::Other(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| McpError::Other(e.to_string()))
}

fn passes_filters(original_name: &str, allow: &GlobSet, allow_is_empty: bool, block: &GlobSet) -> bool {
    if block.is_match(original_name) {
        return false;
    }
    allow_is_empty || allow.is_match(original_name)
}

struct ServerConnection {
    transport: Arc<dyn Transport>,
    injected_tool_names: Vec<String>,
}

/// Prefix applied to every tool injected from server `server_name`.
pub fn prefixed_tool_name(server_name: &str, tool_name: &str) -> String {
    format!("mcp.{server_name}.{tool_name}")
}

/// Owns server connections and mediates between them and a [`ToolRegistry`].
pub struct McpManager {
    registry: Arc<ToolRegistry>,
    servers: RwLock<HashMap<String, ServerConnection>>,
}

impl McpManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Connects to `config`'s server (spawning a process for stdio, nothing
    /// for HTTP) and performs the `initialize` handshake.
    pub async fn connect(&self, config: &MCPServerConfig) -> Result<(), McpError> {
        let cancel = CancellationToken::new();
        let transport: Arc<dyn Transport> = match &config.transport {
            TransportConfig::Stdio { command, args, env } => Arc::new(StdioTransport::spawn(command, args, env)?),
            TransportConfig::Http { url, headers } => Arc::new(HttpTransport::new(url.clone(), headers.clone())),
        };
        transport.call("initialize", crate::mcp::protocol::JsonRpcRequest::initialize(0).params, &cancel).await?;
        transport.notify("notifications/initialized", serde_json::json!({})).await?;

        self.servers.write().await.insert(
            config.name.clone(),
            ServerConnection {
                transport,
                injected_tool_names: Vec::new(),
            },
        );
        Ok(())
    }

    /// Fetches the server's current `tools/list`, filters by `allow`/`block`
    /// and `max_tools`, and (re-)injects the resulting tools into the
    /// registry under `mcp.<server>.<tool>`. Idempotent: a second call with
    /// an unchanged remote tool list leaves the registry in the same state.
    pub async fn inject_tools(&self, config: &MCPServerConfig) -> Result<Vec<String>, McpError> {
        let cancel = CancellationToken::new();
        let transport = {
            let servers = self.servers.read().await;
            let conn = servers.get(&config.name).ok_or_else(|| McpError::ServerNotFound(config.name.clone()))?;
            Arc::clone(&conn.transport)
        };

        let result = transport.call("tools/list", serde_json::json!({}), &cancel).await?;
        let specs = parse_tools_list(result)?;

        let allow = build_globset(&config.allow)?;
        let block = build_globset(&config.block)?;
        let allow_is_empty = config.allow.is_empty();
        let mut filtered: Vec<_> = specs.into_iter().filter(|t| passes_filters(&t.name, &allow, allow_is_empty, &block)).collect();
        if let Some(max) = config.max_tools {
            filtered.truncate(max);
        }

        let previous_names = {
            let mut servers = self.servers.write().await;
            let conn = servers.get_mut(&config.name).ok_or_else(|| McpError::ServerNotFound(config.name.clone()))?;
            std::mem::take(&mut conn.injected_tool_names)
        };
        for name in &previous_names {
            self.registry.remove(name).await;
        }

        let mut new_names = Vec::with_capacity(filtered.len());
        for spec in filtered {
            let qualified = prefixed_tool_name(&config.name, &spec.name);
            let server_transport = Arc::clone(&transport);
            let original_name = spec.name.clone();
            let tool = Tool::new(qualified.clone(), spec.description.clone().unwrap_or_default(), move |ctx, args| {
                let transport = Arc::clone(&server_transport);
                let original_name = original_name.clone();
                async move {
                    let cancel = ctx.cancellation.clone();
                    let result = transport
                        .call("tools/call", serde_json::json!({"name": original_name, "arguments": Value::Object(args)}), &cancel)
                        .await
                        .map_err(|e| ToolError::Handler(e.to_string()))?;
                    Ok(AnyValue::String(parse_tools_call_result(result)))
                }
            })
            .with_raw_schema(spec.input_schema);
            self.registry.register(tool).await;
            new_names.push(qualified);
        }

        let mut servers = self.servers.write().await;
        if let Some(conn) = servers.get_mut(&config.name) {
            conn.injected_tool_names = new_names.clone();
        }
        Ok(new_names)
    }

    /// Removes a server's injected tools from the registry and closes its
    /// transport.
    pub async fn disconnect(&self, name: &str) -> Result<(), McpError> {
        let conn = self.servers.write().await.remove(name);
        let Some(conn) = conn else { return Ok(()) };
        for tool_name in &conn.injected_tool_names {
            self.registry.remove(tool_name).await;
        }
        conn.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_takes_precedence_over_allow() {
        let allow = build_globset(&["fs.*".to_string()]).unwrap();
        let block = build_globset(&["fs.delete_*".to_string()]).unwrap();
        assert!(passes_filters("fs.read_file", &allow, false, &block));
        assert!(!passes_filters("fs.delete_file", &allow, false, &block));
    }

    #[test]
    fn empty_allow_list_permits_everything_not_blocked() {
        let allow = build_globset(&[]).unwrap();
        let block = build_globset(&["danger_*".to_string()]).unwrap();
        assert!(passes_filters("anything", &allow, true, &block));
        assert!(!passes_filters("danger_delete", &allow, true, &block));
    }

    #[test]
    fn prefixed_tool_name_is_server_scoped() {
        assert_eq!(prefixed_tool_name("fs", "read_file"), "mcp.fs.read_file");
    }
}
