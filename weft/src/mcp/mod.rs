//! MCP bridge (C6): connects to Model Context Protocol servers over stdio
//! or Streamable HTTP and injects their tools into a
//! [`crate::tools::ToolRegistry`] under a `mcp.<server>.<tool>` name.
//!
//! [`protocol`] has the JSON-RPC 2.0 message shapes, [`transport`] the
//! stdio/HTTP connection implementations, and [`manager`] the
//! per-server bookkeeping (allow/block filtering, tool-count caps,
//! idempotent injection).

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{prefixed_tool_name, MCPServerConfig, McpManager, TransportConfig};
pub use transport::Transport;
