//! OpenAI-compatible [`LlmClient`] implementation (C10 external boundary).
//!
//! Translates the crate's [`Message`]/[`ToolDefinitionView`] types to and from
//! `async-openai`'s chat-completion request/response types. Tool calls
//! returned by the API are passed through verbatim as [`ToolCallRequest`]s;
//! the Agent Loop is responsible for parsing `arguments_json`.

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestToolMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequestArgs,
    FunctionObject, ToolChoiceOptions,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{LlmClient, LlmResponse, LlmUsage};
use crate::message::{Message, ToolCallRequest};
use crate::tools::ToolDefinitionView;

/// OpenAI Chat Completions client. Reads `OPENAI_API_KEY` from the
/// environment by default via [`OpenAIConfig::default`]; use
/// [`OpenAiLlmClient::with_config`] for a custom base URL or key.
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn to_request_messages(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System { content } => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(content.as_str()),
                ),
                Message::User { content } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(content.as_str()),
                ),
                Message::Assistant { content, .. } => {
                    ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessage::from(content.as_str()),
                    )
                }
                Message::Tool {
                    tool_call_id,
                    content,
                    ..
                } => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                    content: content.as_str().into(),
                    tool_call_id: tool_call_id.clone(),
                }),
            })
            .collect()
    }

    fn to_chat_tools(tools: &[ToolDefinitionView]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.parameters.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinitionView]>,
    ) -> Result<LlmResponse, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::to_request_messages(messages));
        if let Some(tools) = tools {
            if !tools.is_empty() {
                args.tools(Self::to_chat_tools(tools));
                args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
            }
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::new(format!("building chat request: {e}")))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::new(format!("openai chat error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::new("openai returned no choices"))?;
        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(ToolCallRequest {
                    id: f.id,
                    name: f.function.name,
                    arguments_json: f.function.arguments,
                }),
            })
            .collect();
        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_model_and_temperature() {
        let config = OpenAIConfig::new().with_api_key("test-key");
        let client = OpenAiLlmClient::with_config(config, "gpt-4o-mini").with_temperature(0.2);
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.temperature, Some(0.2));
    }

    #[tokio::test]
    async fn invoke_against_unreachable_base_returns_error() {
        let config = OpenAIConfig::new()
            .with_api_key("test-key")
            .with_api_base("https://127.0.0.1:1");
        let client = OpenAiLlmClient::with_config(config, "gpt-4o-mini");
        let err = client.invoke(&[Message::user("hi")], None).await;
        assert!(err.is_err());
    }
}
