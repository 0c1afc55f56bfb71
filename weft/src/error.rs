//! Per-subsystem error types.
//!
//! Each subsystem gets its own `thiserror`-derived enum rather than one
//! monolithic error type, mirroring `StoreError` / `ToolSourceError` in the
//! teacher crate this one grew out of. [`RunError`] is the top-level error a
//! caller of [`crate::agent::AgentLoop::run`] sees; other subsystem errors
//! convert into it with `#[from]` where a failure there can terminate a run.

use thiserror::Error;

/// Errors raised by [`crate::tools::ToolRegistry`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("tool handler error: {0}")]
    Handler(String),
}

/// Errors raised by the MCP transport layer (HTTP or stdio).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mcp: transport io error: {0}")]
    Io(String),

    #[error("mcp: http status {status}: {body_preview}")]
    HttpStatus { status: u16, body_preview: String },

    #[error("mcp: process exited")]
    ProcessExited,

    #[error("mcp: cancelled")]
    Cancelled,
}

impl TransportError {
    /// Per spec: 5xx and 429 are retryable, everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::HttpStatus { status, .. } if *status >= 500 || *status == 429)
    }
}

/// JSON-RPC level errors, distinct from transport-level failures.
#[derive(Debug, Error)]
#[error("mcp: protocol error {code}: {message}")]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// Errors raised by the MCP subsystem as a whole (transport + protocol + manager).
#[derive(Debug, Error)]
pub enum McpError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("mcp: server not found: {0}")]
    ServerNotFound(String),

    #[error("mcp: {0}")]
    Other(String),
}

/// Errors raised by [`crate::memory::store::MemoryStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("memory: serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("memory: storage error: {0}")]
    Storage(String),

    #[error("memory: not found: {0}")]
    NotFound(String),
}

/// Errors raised by the guardrail manager.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("input guardrail '{name}' triggered: {reason}")]
    InputGuardrailTriggered { name: String, reason: String },

    #[error("output guardrail '{name}' triggered: {reason}")]
    OutputGuardrailTriggered { name: String, reason: String },
}

/// Fixed handoff error code set from the handoff contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HandoffErrorCode {
    NotFound,
    NotAllowed,
    SafetyBlock,
    LoopDetected,
    Timeout,
    Internal,
}

/// Errors raised by the handoff engine.
#[derive(Debug, Error)]
#[error("handoff: {code:?}: {message}")]
pub struct HandoffError {
    pub code: HandoffErrorCode,
    pub message: String,
}

impl HandoffError {
    pub fn new(code: HandoffErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors the LLM callable boundary can raise.
#[derive(Debug, Error)]
#[error("llm: {0}")]
pub struct LlmError(pub String);

impl LlmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Terminal errors for an [`crate::agent::AgentLoop::run`] invocation.
///
/// Most loop outcomes (guardrail block, loop detection, max turns, cancellation)
/// are structural [`crate::agent::StoppedReason`] values rather than `Err`
/// variants here; `RunError` is reserved for failures that abort the run
/// because the loop itself could not keep going (an LLM call failing).
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}
