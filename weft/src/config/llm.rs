//! LLM config block for run config summary. No teacher file exists for this
//! one (the retrieval pack's `mod.rs` names it but the file was not
//! retrieved); authored fresh in the same idiom as the sibling sections.

use super::ConfigSection;

/// LLM configuration summary: model, api_base, temperature, tool_choice.
/// Never includes an api_key.
pub struct LlmConfigSummary {
    pub model: String,
    pub api_base: String,
    pub temperature: Option<f32>,
    pub tool_choice: Option<String>,
}

impl ConfigSection for LlmConfigSummary {
    fn section_name(&self) -> &str {
        "LLM config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("model", self.model.clone()), ("api_base", self.api_base.clone())];
        if let Some(t) = self.temperature {
            out.push(("temperature", t.to_string()));
        }
        if let Some(ref tc) = self.tool_choice {
            out.push(("tool_choice", tc.clone()));
        }
        out
    }
}
