//! Handoff config block for run config summary. New section this crate's
//! subsystems need that the teacher never had.

use super::ConfigSection;

/// Handoff engine configuration summary: hop budget and idempotency TTL.
pub struct HandoffConfigSummary {
    pub max_hops: usize,
    pub idempotency_ttl_secs: u64,
    pub registered_agents: usize,
}

impl ConfigSection for HandoffConfigSummary {
    fn section_name(&self) -> &str {
        "Handoff"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_hops", self.max_hops.to_string()),
            ("idempotency_ttl_secs", self.idempotency_ttl_secs.to_string()),
            ("registered_agents", self.registered_agents.to_string()),
        ]
    }
}
