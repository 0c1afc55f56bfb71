//! Conversation message types shared by the Agent Loop, memory layers, and
//! the `LlmClient` boundary.

use serde::{Deserialize, Serialize};

/// A single requested tool invocation as emitted by an LLM turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw arguments exactly as the model produced them (a JSON-encoded string,
    /// matching the external LLM callable contract in spec §6). Parsed lazily
    /// by the loop, not eagerly here, so a malformed payload never fails
    /// construction of the message itself.
    pub arguments_json: String,
}

/// One turn of conversation. `Tool` carries the call id it answers so a
/// reader can reconstruct which request produced which response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Text content of this message, for token estimation and logging previews.
    pub fn text(&self) -> &str {
        match self {
            Message::System { content } => content,
            Message::User { content } => content,
            Message::Assistant { content, .. } => content,
            Message::Tool { content, .. } => content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let msgs = vec![
            Message::system("be helpful"),
            Message::user("hi"),
            Message::assistant_with_calls(
                "",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "get_weather".into(),
                    arguments_json: "{\"city\":\"Shanghai\"}".into(),
                }],
            ),
            Message::tool("call_1", "get_weather", "Shanghai: 25\u{b0}C"),
        ];
        for m in msgs {
            let s = serde_json::to_string(&m).unwrap();
            let back: Message = serde_json::from_str(&s).unwrap();
            assert_eq!(m, back);
        }
    }

    #[test]
    fn text_extracts_content_for_every_variant() {
        assert_eq!(Message::user("x").text(), "x");
        assert_eq!(Message::tool("1", "t", "y").text(), "y");
    }
}
