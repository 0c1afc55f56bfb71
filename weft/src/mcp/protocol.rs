//! JSON-RPC 2.0 message shapes and request builders for MCP (spec §6),
//! plus lenient parsing of `tools/list`/`tools/call` results — some servers
//! wrap results in `{"tools": [...]}`, others answer with a bare array.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{McpError, ProtocolError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Per-connection monotonic id source. One `McpManager` owns one of these per
/// server connection (not a process-global counter), so two independent
/// managers — or two servers in the same manager — never need to coordinate
/// ids with each other.
#[derive(Debug, Default)]
pub struct RequestIdGenerator(AtomicU64);

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }

    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "clientInfo": {"name": "weft", "version": env!("CARGO_PKG_VERSION")},
            }),
        )
    }

    pub fn tools_list(id: u64) -> Self {
        Self::new(id, "tools/list", json!({}))
    }

    pub fn tools_call(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(id, "tools/call", json!({"name": name, "arguments": arguments}))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::Protocol(ProtocolError {
                code: err.code,
                message: err.message,
            }));
        }
        self.result.ok_or_else(|| McpError::Protocol(ProtocolError {
            code: 0,
            message: "response has neither result nor error".to_string(),
        }))
    }
}

/// One MCP tool description as returned by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Accepts either `{"tools": [...]}` or a bare `[...]` array.
pub fn parse_tools_list(value: Value) -> Result<Vec<McpToolSpec>, McpError> {
    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => obj
            .remove("tools")
            .and_then(|v| v.as_array().cloned())
            .ok_or_else(|| McpError::Protocol(ProtocolError { code: 0, message: "tools/list result missing \"tools\" array".into() }))?,
        other => {
            return Err(McpError::Protocol(ProtocolError {
                code: 0,
                message: format!("tools/list result must be an array or object, got {other}"),
            }))
        }
    };
    array
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| McpError::Protocol(ProtocolError { code: 0, message: e.to_string() })))
        .collect()
}

/// Normalizes a `tools/call` result into tool output text: joins `content`
/// text blocks, falling back to a JSON-encoded `structuredContent`, and
/// prefixes "Error: " when `isError` is set.
pub fn parse_tools_call_result(value: Value) -> String {
    let is_error = value.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let mut text = value
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    if text.is_empty() {
        if let Some(structured) = value.get("structuredContent") {
            text = serde_json::to_string(structured).unwrap_or_default();
        }
    }
    if is_error {
        format!("Error: {text}")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_is_monotonic_and_scoped_to_the_instance() {
        let a = RequestIdGenerator::new();
        let b = RequestIdGenerator::new();
        assert_eq!(a.next(), 1);
        assert_eq!(a.next(), 2);
        assert_eq!(b.next(), 1);
    }

    #[test]
    fn parse_tools_list_accepts_wrapped_object() {
        let v = json!({"tools": [{"name": "a", "inputSchema": {"type": "object"}}]});
        let tools = parse_tools_list(v).unwrap();
        assert_eq!(tools[0].name, "a");
    }

    #[test]
    fn parse_tools_list_accepts_bare_array() {
        let v = json!([{"name": "a"}]);
        let tools = parse_tools_list(v).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, None);
    }

    #[test]
    fn parse_tools_call_result_joins_text_blocks() {
        let v = json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        assert_eq!(parse_tools_call_result(v), "a\nb");
    }

    #[test]
    fn parse_tools_call_result_prefixes_error_text() {
        let v = json!({"isError": true, "content": [{"type": "text", "text": "boom"}]});
        assert_eq!(parse_tools_call_result(v), "Error: boom");
    }

    #[test]
    fn parse_tools_call_result_falls_back_to_structured_content() {
        let v = json!({"structuredContent": {"ok": true}});
        assert_eq!(parse_tools_call_result(v), "{\"ok\":true}");
    }
}
