//! Guardrail config block for run config summary. New section this crate's
//! subsystems need that the teacher never had.

use super::ConfigSection;

/// Guardrail configuration summary: execution mode and guard counts.
pub struct GuardrailConfigSummary {
    /// `"sequential"` or `"parallel"`.
    pub mode: String,
    pub input_guard_count: usize,
    pub output_guard_count: usize,
}

impl ConfigSection for GuardrailConfigSummary {
    fn section_name(&self) -> &str {
        "Guardrails"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("mode", self.mode.clone()),
            ("input_guards", self.input_guard_count.to_string()),
            ("output_guards", self.output_guard_count.to_string()),
        ]
    }
}
