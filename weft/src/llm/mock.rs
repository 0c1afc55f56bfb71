//! Deterministic [`LlmClient`] test double: returns a fixed queue of
//! responses in order, one per call.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::LlmError;
use crate::llm::{LlmClient, LlmResponse};
use crate::message::Message;
use crate::tools::ToolDefinitionView;

/// Replays a scripted sequence of responses; panics (via an error) once the
/// script runs out, so tests immediately notice an unexpected extra call.
pub struct MockLlmClient {
    responses: Mutex<std::collections::VecDeque<LlmResponse>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Convenience constructor for a client that always returns the same
    /// single tool-call-free response.
    pub fn always(content: impl Into<String>) -> Self {
        Self::new(vec![LlmResponse {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
        }])
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolDefinitionView]>,
    ) -> Result<LlmResponse, LlmError> {
        let mut queue = self.responses.lock().await;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else if let Some(last) = queue.front() {
            Ok(last.clone())
        } else {
            Err(LlmError::new("mock llm client: response queue exhausted"))
        }
    }
}

impl Clone for LlmResponse {
    fn clone(&self) -> Self {
        Self {
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            usage: self.usage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_responses_in_order_then_repeats_the_last() {
        let client = MockLlmClient::new(vec![
            LlmResponse {
                content: "first".into(),
                tool_calls: Vec::new(),
                usage: None,
            },
            LlmResponse {
                content: "second".into(),
                tool_calls: Vec::new(),
                usage: None,
            },
        ]);
        assert_eq!(client.invoke(&[], None).await.unwrap().content, "first");
        assert_eq!(client.invoke(&[], None).await.unwrap().content, "second");
        assert_eq!(client.invoke(&[], None).await.unwrap().content, "second");
    }
}
