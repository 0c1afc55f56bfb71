//! The external LLM callable boundary (spec §6): `(messages, tools?) ->
//! {content, tool_calls[]}`, plus a cancellation-aware variant the Agent
//! Loop prefers when a concrete client overrides it.

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::message::{Message, ToolCallRequest};
use crate::tools::ToolDefinitionView;

pub use mock::MockLlmClient;
pub use openai::OpenAiLlmClient;

/// Usage accounting an `LlmClient` may report back for tracing/cost
/// attribution; entirely optional.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One LLM turn's output.
#[derive(Debug, Clone, Default)]
#[allow(clippy::derivable_impls)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<LlmUsage>,
}

/// Caller-supplied LLM callable. Implementations are free to be thin wrappers
/// over any provider; [`OpenAiLlmClient`] is the bundled OpenAI-compatible
/// one and [`MockLlmClient`] is the deterministic test double.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinitionView]>,
    ) -> Result<LlmResponse, LlmError>;

    /// Cancellation-aware variant. The default forwards to [`Self::invoke`]
    /// ignoring the token; the Agent Loop calls this one and relies on
    /// implementations that actually support cancellation to override it.
    async fn invoke_cancellable(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinitionView]>,
        _cancellation: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        self.invoke(messages, tools).await
    }
}
