//! Handoff Engine (C12): bounded, idempotent inter-agent transfer with
//! hop/visit-set checks (spec §4.7). No direct teacher analogue; the error
//! taxonomy follows the fixed-code-set style of `StoreError`/`ToolSourceError`
//! and the idempotency cache follows the TTL-cache shape implied by the
//! teacher's `CachedResolver` (`loom/src/model_spec/cached.rs`), generalized
//! from model-spec caching to request-id caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::agent::card::AgentRuntimeConfig;
use crate::error::HandoffErrorCode;
use crate::message::Message;

/// How the caller wants the transfer mediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    ToolBased,
    Coordinator,
}

/// A request to transfer control from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub request_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub message: String,
    pub caller_owner_id: String,
    #[serde(default)]
    pub caller_org_id: Option<String>,
    pub requested_mode: HandoffMode,
    #[serde(default)]
    pub hop_count: usize,
    #[serde(default)]
    pub visited_agents: Vec<String>,
    /// `0` means no deadline (the run is bounded only by the target loop's
    /// own `MaxTurns`).
    #[serde(default)]
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffErrorDetail {
    pub code: HandoffErrorCode,
    pub message: String,
}

/// The outcome of one [`HandoffEngine::handoff`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffResult {
    pub status: HandoffStatus,
    pub output: String,
    pub agent_id: String,
    pub request_id: String,
    pub cache_hit: bool,
    pub error: Option<HandoffErrorDetail>,
}

impl HandoffResult {
    fn error(request_id: &str, agent_id: &str, code: HandoffErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: HandoffStatus::Error,
            output: String::new(),
            agent_id: agent_id.to_string(),
            request_id: request_id.to_string(),
            cache_hit: false,
            error: Some(HandoffErrorDetail { code, message }),
        }
    }

    /// Packages this result as the tool-role return contract (spec §4.7):
    /// a tool-based handoff appears as a normal tool response in the
    /// caller's history, named `handoff_result`.
    pub fn into_tool_message(self, tool_call_id: impl Into<String>) -> Message {
        let content = match self.status {
            HandoffStatus::Success => self.output,
            HandoffStatus::Error => {
                let error = self.error.unwrap_or(HandoffErrorDetail {
                    code: HandoffErrorCode::Internal,
                    message: "unknown handoff error".into(),
                });
                format!("Error: {:?}: {}", error.code, error.message)
            }
        };
        Message::tool(tool_call_id, "handoff_result", content)
    }
}

/// Registry of agents a handoff can target, keyed by `agent_id`.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentRuntimeConfig>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, config: Arc<AgentRuntimeConfig>) {
        self.agents.write().await.insert(config.card.agent_id.clone(), config);
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<AgentRuntimeConfig>> {
        self.agents.read().await.get(agent_id).cloned()
    }
}

struct CacheEntry {
    result: HandoffResult,
    inserted_at: DateTime<Utc>,
}

/// Policy, loop-guard, idempotency, and timeout checks for transferring
/// control between agents.
pub struct HandoffEngine {
    registry: Arc<AgentRegistry>,
    max_hops: usize,
    idempotency_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl HandoffEngine {
    pub fn new(registry: Arc<AgentRegistry>, max_hops: usize, idempotency_ttl: Duration) -> Self {
        Self {
            registry,
            max_hops,
            idempotency_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Evicts cache entries older than the configured TTL, then returns a
    /// cached result for `request_id` if one remains. Never empty-string
    /// `request_id`s are expected; callers must supply a real id.
    async fn cached(&self, request_id: &str) -> Option<HandoffResult> {
        let mut cache = self.cache.write().await;
        let now = Utc::now();
        cache.retain(|_, entry| now.signed_duration_since(entry.inserted_at).to_std().unwrap_or_default() < self.idempotency_ttl);
        cache.get(request_id).map(|entry| {
            let mut result = entry.result.clone();
            result.cache_hit = true;
            result
        })
    }

    /// Runs the policy + loop-guard + idempotency + timeout checks and, if
    /// admitted, drives the target agent's loop on `request.message`.
    pub async fn handoff(&self, request: HandoffRequest) -> HandoffResult {
        if !request.request_id.is_empty() {
            if let Some(cached) = self.cached(&request.request_id).await {
                return cached;
            }
        }

        let result = self.handoff_uncached(&request).await;

        if !request.request_id.is_empty() && result.status == HandoffStatus::Success {
            self.cache.write().await.insert(
                request.request_id.clone(),
                CacheEntry {
                    result: result.clone(),
                    inserted_at: Utc::now(),
                },
            );
        }
        result
    }

    async fn handoff_uncached(&self, request: &HandoffRequest) -> HandoffResult {
        let Some(target) = self.registry.get(&request.to_agent).await else {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::NotFound, format!("agent '{}' not found", request.to_agent));
        };
        let card = &target.card;

        if card.handoff_policy == crate::agent::HandoffPolicy::Deny {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::NotAllowed, "target denies handoffs");
        }

        if card.safety_level == crate::agent::SafetyLevel::High && request.requested_mode == HandoffMode::ToolBased {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::SafetyBlock, "high safety level rejects tool-based handoff");
        }

        // Visibility/ownership AND caller allow-lists: both must pass (spec.md's
        // Open Question on this interaction is resolved as AND, see DESIGN.md).
        let ownership_ok = match card.visibility {
            crate::agent::Visibility::Private => request.caller_owner_id == card.owner_id,
            crate::agent::Visibility::Org => card.org_id.is_some() && request.caller_org_id == card.org_id,
            crate::agent::Visibility::Public => true,
        };
        if !ownership_ok {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::NotAllowed, "caller does not satisfy target visibility/ownership");
        }

        let agent_allowed = card.allowed_caller_agents.is_empty() || card.allowed_caller_agents.iter().any(|a| a == &request.from_agent);
        let owner_allowed = card.allowed_caller_owners.is_empty() || card.allowed_caller_owners.iter().any(|o| o == &request.caller_owner_id);
        if !agent_allowed || !owner_allowed {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::NotAllowed, "caller not in target's allow-list");
        }

        let next_hop_count = request.hop_count + 1;
        if next_hop_count > self.max_hops || request.visited_agents.iter().any(|a| a == &request.to_agent) {
            return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::LoopDetected, "hop budget exceeded or target already visited");
        }

        let cancellation = CancellationToken::new();
        let agent_loop = target.build_loop();
        let run = async { agent_loop.run(&cancellation, &request.message, &[], None).await };

        let outcome = if request.deadline_ms == 0 {
            run.await
        } else {
            match tokio::time::timeout(Duration::from_millis(request.deadline_ms), run).await {
                Ok(inner) => inner,
                Err(_) => {
                    cancellation.cancel();
                    return HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::Timeout, "handoff deadline exceeded");
                }
            }
        };

        match outcome {
            Ok(run_result) => HandoffResult {
                status: HandoffStatus::Success,
                output: run_result.final_output,
                agent_id: request.to_agent.clone(),
                request_id: request.request_id.clone(),
                cache_hit: false,
                error: None,
            },
            Err(err) => HandoffResult::error(&request.request_id, &request.to_agent, HandoffErrorCode::Internal, err.to_string()),
        }
    }
}
