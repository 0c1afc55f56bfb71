//! JSON schema / OpenAI function-calling schema export for a [`ToolRegistry`].

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolRegistry};

/// An intermediate schema view handed to a concrete `LlmClient`
/// implementation, decoupling the registry's own schema representation from
/// whatever wire shape a specific LLM provider wants.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinitionView {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn derive_parameters(tool: &Tool) -> Value {
    if let Some(raw) = &tool.raw_schema {
        return raw.clone();
    }
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &tool.params {
        let mut prop = json!({ "type": param.param_type.json_schema_type() });
        if let Some(description) = &param.description {
            prop["description"] = json!(description);
        }
        if let Some(default) = &param.default {
            prop["default"] = default.clone();
        }
        properties.insert(param.name.clone(), prop);
        if param.required {
            required.push(param.name.clone());
        }
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

/// Builds the `ToolDefinitionView` list for every registered tool, in
/// insertion order.
pub async fn to_tool_definitions(registry: &ToolRegistry) -> Vec<ToolDefinitionView> {
    registry
        .all()
        .await
        .iter()
        .map(|tool| ToolDefinitionView {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: derive_parameters(tool),
        })
        .collect()
}

/// Marker trait for schema-export flavors a caller can pick between; kept as
/// a trait (rather than a bare enum) so a downstream crate can add further
/// wire shapes without touching this one.
pub trait ToOpenAISchema {
    fn to_openai_schema(&self) -> Value;
}

impl ToOpenAISchema for ToolDefinitionView {
    fn to_openai_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Emits the plain JSON schema document for the whole registry: `{name:
/// {description, parameters}}` ordered as `Names()`.
pub async fn to_json_schema(registry: &ToolRegistry) -> Value {
    let mut out = Vec::new();
    for def in to_tool_definitions(registry).await {
        out.push(json!({
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        }));
    }
    Value::Array(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AnyValue, ParamType, ToolParam};

    #[tokio::test]
    async fn schema_round_trip_matches_registration_order_and_required_set() {
        let registry = ToolRegistry::new();
        registry
            .register(
                Tool::new("get_weather", "weather lookup", |_ctx, _args| async {
                    Ok(AnyValue::String("ok".into()))
                })
                .with_param(ToolParam::new("city", ParamType::String).required())
                .with_param(ToolParam::new("unit", ParamType::String)),
            )
            .await;
        registry
            .register(Tool::new("ping", "pings", |_ctx, _args| async {
                Ok(AnyValue::String("pong".into()))
            }))
            .await;

        let defs = to_tool_definitions(&registry).await;
        assert_eq!(defs.iter().map(|d| d.name.clone()).collect::<Vec<_>>(), registry.names().await);

        let weather = defs.iter().find(|d| d.name == "get_weather").unwrap();
        let required = weather.parameters["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("city")]);
    }

    #[tokio::test]
    async fn raw_schema_replaces_derived_parameters() {
        let registry = ToolRegistry::new();
        let raw = json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]});
        registry
            .register(
                Tool::new("search", "search", |_ctx, _args| async { Ok(AnyValue::String("".into())) })
                    .with_raw_schema(raw.clone()),
            )
            .await;
        let defs = to_tool_definitions(&registry).await;
        assert_eq!(defs[0].parameters, raw);
    }
}
