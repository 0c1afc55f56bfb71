//! Weft: the core runtime for ReAct agents — a bounded Agent Loop over a
//! tool registry, layered memory, an MCP bridge, guardrails, inter-agent
//! handoff, and a group-chat coordinator.
//!
//! The five interlocking subsystems live in their own top-level modules:
//! [`agent`] (the loop itself plus the agent card/runtime-config data
//! model), [`tools`], [`memory`], [`handoff`], and [`group_chat`]. Everything
//! else — [`mcp`], [`guardrail`], [`loop_detector`], [`trace`],
//! [`conversation`], [`scheduler`], [`config`] — supports one or more of
//! those five.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod group_chat;
pub mod guardrail;
pub mod handoff;
pub mod llm;
pub mod loop_detector;
pub mod mcp;
pub mod memory;
pub mod message;
pub mod scheduler;
pub mod tools;
pub mod trace;

pub use agent::{AgentCardPublic, AgentLoop, AgentRuntimeConfig, RunResult, StoppedReason};
pub use error::{GuardrailError, HandoffError, HandoffErrorCode, LlmError, McpError, RunError, StoreError, ToolError};
pub use handoff::{AgentRegistry, HandoffEngine, HandoffMode, HandoffRequest, HandoffResult};
pub use message::{Message, ToolCallRequest};
