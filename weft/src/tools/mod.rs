//! Tool subsystem: typed tool catalog, JSON-schema export, and argument
//! validation (C5).
//!
//! A [`Tool`] is a passive descriptor plus a boxed handler, not a trait a
//! caller implements per tool — this keeps registration a plain value
//! (`registry.register(Tool::new(...).with_handler(...))`) rather than one
//! struct definition per tool, matching the "uniform handler signature"
//! re-architecture note for dynamic per-tool signatures.

pub mod registry;
pub mod schema;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

pub use registry::ToolRegistry;
pub use schema::{ToolDefinitionView, ToOpenAISchema};

/// The declared type tag of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// The JSON Schema `type` keyword this tag maps to.
    pub fn json_schema_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// One declared parameter of a [`Tool`].
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
}

impl ToolParam {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A handler's return value. Strings pass through verbatim when serialized
/// for the model; any other shape is JSON-encoded, per the "arbitrary-shape
/// tool result" re-architecture note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyValue {
    String(String),
    Json(serde_json::Value),
}

impl AnyValue {
    /// Renders this value as text suitable to hand back to the model.
    pub fn into_text(self) -> String {
        match self {
            AnyValue::String(s) => s,
            AnyValue::Json(v) => v.to_string(),
        }
    }
}

impl From<String> for AnyValue {
    fn from(s: String) -> Self {
        AnyValue::String(s)
    }
}

impl From<serde_json::Value> for AnyValue {
    fn from(v: serde_json::Value) -> Self {
        AnyValue::Json(v)
    }
}

/// Ephemeral per-invocation record passed as the first argument to every
/// tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_name: String,
    pub call_id: String,
    pub cancellation: CancellationToken,
    attachments: HashMap<String, serde_json::Value>,
}

impl ToolContext {
    pub fn new(tool_name: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            cancellation: CancellationToken::new(),
            attachments: HashMap::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Typed read from the free-form attachment map.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.attachments
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed write into the free-form attachment map.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.attachments.insert(key.into(), v);
        }
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_name", &self.tool_name)
            .field("call_id", &self.call_id)
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish()
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The uniform handler signature every tool implements.
pub type ToolHandler = Arc<
    dyn Fn(ToolContext, serde_json::Map<String, serde_json::Value>) -> BoxFuture<'static, Result<AnyValue, ToolError>>
        + Send
        + Sync,
>;

/// A named, typed, side-effecting operation exposed to the model.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
    /// When set, used verbatim for `parameters` during schema export instead
    /// of a schema derived from `params` — used to faithfully relay remote
    /// MCP tool schemas.
    pub raw_schema: Option<serde_json::Value>,
    handler: ToolHandler,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params.iter().map(|p| &p.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Tool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolContext, serde_json::Map<String, serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AnyValue, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            raw_schema: None,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    pub fn with_param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_raw_schema(mut self, schema: serde_json::Value) -> Self {
        self.raw_schema = Some(schema);
        self
    }

    /// Applies declared defaults for missing non-required parameters, then
    /// validates every required parameter is present, then invokes the
    /// handler.
    pub async fn execute(
        &self,
        ctx: ToolContext,
        mut args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<AnyValue, ToolError> {
        for param in &self.params {
            if !args.contains_key(&param.name) {
                if let Some(default) = &param.default {
                    args.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(ToolError::MissingArgument(param.name.clone()));
                }
            }
        }
        for param in &self.params {
            if param.required && !args.contains_key(&param.name) {
                return Err(ToolError::MissingArgument(param.name.clone()));
            }
        }
        (self.handler)(ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> Tool {
        Tool::new("get_weather", "returns weather for a city", |_ctx, args| async move {
            let city = args
                .get("city")
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string();
            Ok(AnyValue::String(format!("{city}: 25\u{b0}C")))
        })
        .with_param(ToolParam::new("city", ParamType::String).required())
    }

    #[tokio::test]
    async fn applies_defaults_then_validates_required() {
        let tool = sample_tool();
        let ctx = ToolContext::new("get_weather", "call1");
        let mut args = serde_json::Map::new();
        args.insert("city".into(), serde_json::json!("Shanghai"));
        let result = tool.execute(ctx.clone(), args).await.unwrap();
        assert_eq!(result.into_text(), "Shanghai: 25\u{b0}C");

        let err = tool.execute(ctx, serde_json::Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument(name) if name == "city"));
    }

    #[test]
    fn any_value_renders_strings_verbatim_and_json_otherwise() {
        assert_eq!(AnyValue::String("hi".into()).into_text(), "hi");
        assert_eq!(AnyValue::Json(serde_json::json!({"a":1})).into_text(), "{\"a\":1}");
    }
}
