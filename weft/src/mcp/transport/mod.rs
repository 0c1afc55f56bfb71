//! Transport contract MCP server connections are built over: a started
//! connection can `call` a JSON-RPC method and eventually `close`.

pub mod http;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::McpError;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// A live connection to an MCP server, over stdio or HTTP.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `method`/`params` and returns the raw JSON-RPC `result` value
    /// (errors already unwrapped to [`McpError::Protocol`]).
    async fn call(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value, McpError>;

    /// Sends a one-way JSON-RPC notification (no response expected). Default
    /// no-op: HTTP servers that don't require `notifications/initialized`
    /// simply ignore it.
    async fn notify(&self, _method: &str, _params: Value) -> Result<(), McpError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

/// `100 * 2^(n-1)` ms exponential backoff, `n` starting at 1 for the first retry.
pub fn backoff_delay(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(100u64 * 2u64.pow(attempt.saturating_sub(1)))
}
