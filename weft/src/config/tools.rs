//! Tools config block for run config summary. No teacher file exists for
//! this one either; authored fresh alongside [`super::LlmConfigSummary`].

use super::ConfigSection;

/// Tools configuration summary: the ordered list of tool sources
/// (`"local"`, `"mcp:<server>"`, ...) wired into this run's registry.
pub struct ToolConfigSummary {
    pub sources: Vec<String>,
}

impl ConfigSection for ToolConfigSummary {
    fn section_name(&self) -> &str {
        "Tools"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![("sources", self.sources.join(","))]
    }
}
