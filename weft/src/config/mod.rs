//! Run config summary (C0, ambient): a `[section_name] k=v ...` best-effort
//! stderr line per subsystem, for verbose-mode introspection — not used for
//! anything functional.
//!
//! [`ConfigSection`]/[`RunConfigSummary`] are carried over near-verbatim from
//! the teacher's `config/summary/mod.rs`; `LlmConfigSummary` and
//! `ToolConfigSummary` are authored fresh in the same idiom (the teacher's
//! retrieval pack names these two in its `mod` declarations but does not
//! include the files), and `GuardrailConfigSummary`/`HandoffConfigSummary`
//! are new sections this crate's subsystems need that the teacher never had.

use std::io::Write;

mod embedding;
mod guardrail;
mod handoff;
mod llm;
mod memory;
mod tools;

pub use embedding::EmbeddingConfigSummary;
pub use guardrail::GuardrailConfigSummary;
pub use handoff::HandoffConfigSummary;
pub use llm::LlmConfigSummary;
pub use memory::MemoryConfigSummary;
pub use tools::ToolConfigSummary;

/// One block of run config for display and printing.
pub trait ConfigSection: Send + Sync {
    /// Section label, e.g. `"LLM config"`, `"Memory config"`.
    fn section_name(&self) -> &str;
    /// Key-value pairs (no secrets).
    fn entries(&self) -> Vec<(&'static str, String)>;
    /// Print one line to stderr in the form `[section_name] k1=v1 k2=v2 ...`. Best-effort.
    fn print_to_stderr(&self) {
        let entries: Vec<String> = self.entries().into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        let _ = writeln!(std::io::stderr(), "[{}] {}", self.section_name(), entries.join(" "));
        let _ = std::io::stderr().flush();
    }
}

/// Aggregated run config summary; built via [`with_section`](RunConfigSummary::with_section).
pub struct RunConfigSummary {
    sections: Vec<Box<dyn ConfigSection>>,
}

impl RunConfigSummary {
    pub fn new() -> Self {
        Self { sections: vec![] }
    }

    pub fn with_section(mut self, s: Box<dyn ConfigSection>) -> Self {
        self.sections.push(s);
        self
    }

    pub fn sections(&self) -> &[Box<dyn ConfigSection>] {
        self.sections.as_slice()
    }

    pub fn print_to_stderr(&self) {
        for s in &self.sections {
            s.print_to_stderr();
        }
    }
}

impl Default for RunConfigSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of the config sections used to build a [`RunConfigSummary`].
/// Implement this for a crate's own run-config type.
pub trait RunConfigSummarySource: Send + Sync {
    fn llm_section(&self) -> LlmConfigSummary;
    fn memory_section(&self) -> MemoryConfigSummary;
    fn tools_section(&self) -> ToolConfigSummary;
    fn embedding_section(&self) -> EmbeddingConfigSummary;
    fn guardrail_section(&self) -> GuardrailConfigSummary;
    fn handoff_section(&self) -> HandoffConfigSummary;
}

pub fn build_config_summary(source: &impl RunConfigSummarySource) -> RunConfigSummary {
    RunConfigSummary::new()
        .with_section(Box::new(source.llm_section()))
        .with_section(Box::new(source.memory_section()))
        .with_section(Box::new(source.tools_section()))
        .with_section(Box::new(source.embedding_section()))
        .with_section(Box::new(source.guardrail_section()))
        .with_section(Box::new(source.handoff_section()))
}
