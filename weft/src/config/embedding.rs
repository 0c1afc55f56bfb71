//! Embedding config block for run config summary. Carried over from the
//! teacher near-verbatim; does not include api_key.

use super::ConfigSection;

pub struct EmbeddingConfigSummary {
    pub model: String,
    pub api_base: String,
}

impl ConfigSection for EmbeddingConfigSummary {
    fn section_name(&self) -> &str {
        "Embedding"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![("model", self.model.clone()), ("api_base", self.api_base.clone())]
    }
}
