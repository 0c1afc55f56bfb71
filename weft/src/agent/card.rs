//! Agent descriptor and runtime binding (spec §3): [`AgentCardPublic`] is the
//! declarative, shareable identity of an agent (what the handoff engine and
//! group chat coordinator reason about); [`AgentRuntimeConfig`] binds one
//! card to a live, runnable loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::AgentLoop;
use crate::guardrail::GuardrailManager;
use crate::llm::LlmClient;
use crate::loop_detector::LoopDetector;
use crate::tools::ToolRegistry;
use crate::trace::Tracer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Org,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPolicy {
    Auto,
    CoordinatorOnly,
    Deny,
}

/// The declarative, shareable identity of one agent: what other agents and
/// the handoff/group-chat machinery see, independent of whether it is
/// currently bound to a live loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCardPublic {
    pub agent_id: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Open-ended skill/tool manifest; deliberately not a fixed Rust struct
    /// so a card can describe arbitrary capabilities.
    #[serde(default)]
    pub capabilities: serde_json::Value,
    pub owner_id: String,
    #[serde(default)]
    pub org_id: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub allowed_caller_agents: Vec<String>,
    #[serde(default)]
    pub allowed_caller_owners: Vec<String>,
    pub safety_level: SafetyLevel,
    pub handoff_policy: HandoffPolicy,
    /// Bernoulli draw probability for group-chat's talkativeness tier, in `[0, 1]`.
    pub talkativeness: f64,
}

impl AgentCardPublic {
    /// Whether this card declares `keyword` (case-insensitive substring
    /// match) among its skills, for group chat's skill-tier routing.
    pub fn has_skill_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.skills.iter().any(|skill| lower.contains(&skill.to_lowercase()))
    }
}

/// Binds an [`AgentCardPublic`] to the live collaborators a run needs: the
/// LLM callable, tool registry, system prompt, turn budget, guardrails, and
/// tracer. Mirrors the teacher's `AgentOptions`/`ReactRunner::new` pattern of
/// threading optional collaborators through a constructor rather than
/// `run()` arguments, since these are per-agent, not per-call.
pub struct AgentRuntimeConfig {
    pub card: AgentCardPublic,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Option<Arc<ToolRegistry>>,
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub guardrails: Option<Arc<GuardrailManager>>,
    pub loop_detector: Option<Arc<tokio::sync::Mutex<LoopDetector>>>,
    pub tracer: Option<Arc<Tracer>>,
}

impl AgentRuntimeConfig {
    pub fn new(card: AgentCardPublic, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            card,
            llm,
            tools: None,
            system_prompt: None,
            max_turns: 10,
            guardrails: None,
            loop_detector: None,
            tracer: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_guardrails(mut self, guardrails: Arc<GuardrailManager>) -> Self {
        self.guardrails = Some(guardrails);
        self
    }

    pub fn with_loop_detector(mut self, detector: Arc<tokio::sync::Mutex<LoopDetector>>) -> Self {
        self.loop_detector = Some(detector);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Builds the runnable [`AgentLoop`] this config describes.
    pub fn build_loop(&self) -> AgentLoop {
        let mut agent_loop = AgentLoop::new(Arc::clone(&self.llm)).with_max_turns(self.max_turns);
        if let Some(tools) = &self.tools {
            agent_loop = agent_loop.with_tools(Arc::clone(tools));
        }
        if let Some(prompt) = &self.system_prompt {
            agent_loop = agent_loop.with_system_prompt(prompt.clone());
        }
        if let Some(guardrails) = &self.guardrails {
            agent_loop = agent_loop.with_guardrails(Arc::clone(guardrails));
        }
        if let Some(detector) = &self.loop_detector {
            agent_loop = agent_loop.with_loop_detector(Arc::clone(detector));
        }
        if let Some(tracer) = &self.tracer {
            agent_loop = agent_loop.with_tracer(Arc::clone(tracer));
        }
        agent_loop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> AgentCardPublic {
        AgentCardPublic {
            agent_id: "weather-bot".into(),
            display_name: "Weather Bot".into(),
            description: "answers weather questions".into(),
            skills: vec!["weather".into(), "forecast".into()],
            capabilities: serde_json::json!({}),
            owner_id: "o1".into(),
            org_id: None,
            visibility: Visibility::Public,
            allowed_caller_agents: vec![],
            allowed_caller_owners: vec![],
            safety_level: SafetyLevel::Low,
            handoff_policy: HandoffPolicy::Auto,
            talkativeness: 0.5,
        }
    }

    #[test]
    fn has_skill_keyword_matches_case_insensitively() {
        let c = card();
        assert!(c.has_skill_keyword("what's the WEATHER like"));
        assert!(!c.has_skill_keyword("tell me a joke"));
    }
}
