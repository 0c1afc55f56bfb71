//! Group Chat Coordinator (C13): routes each incoming message to at most one
//! agent in a shared room, enforces a per-agent speaking cooldown, and keeps
//! a bounded shared context visible to every member.
//!
//! No direct teacher analogue. The ring-buffer shared context reuses the
//! bounded-trim idiom already used for [`crate::memory::ShortTermMemory`]
//! (C2); the talkativeness Bernoulli draw uses `rand`, as the corpus's other
//! agent-sdk repos do for this class of sampling decision.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentLoop, AgentRuntimeConfig};
use crate::error::RunError;

/// Why a given agent was picked to speak (or why none was).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyReason {
    Mention,
    Skill,
    Followup,
    Talkativeness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    #[serde(default)]
    pub mentioned_agents: Vec<String>,
    pub is_from_agent: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReply {
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    pub reason: ReplyReason,
}

const DEFAULT_FOLLOWUP_WINDOW: Duration = Duration::from_secs(30);
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
const DEFAULT_HISTORY_SIZE: usize = 50;

struct Member {
    config: Arc<AgentRuntimeConfig>,
    last_spoke_at: Option<Instant>,
    introduced: bool,
}

/// One multi-agent room: members, shared ring-buffer history, and the
/// router/speaking-policy state that picks at most one replier per message.
///
/// Per spec §5, a room's state is not safe for concurrent processing of two
/// messages at once — callers must process messages for one room
/// sequentially (an internal mutex enforces this rather than merely
/// documenting it).
pub struct GroupChatRoom {
    members: Mutex<Vec<Member>>,
    history: Mutex<VecDeque<GroupMessage>>,
    history_size: usize,
    followup_window: Duration,
    cooldown: Duration,
    dispatch_lock: Mutex<()>,
}

impl GroupChatRoom {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_HISTORY_SIZE, DEFAULT_FOLLOWUP_WINDOW, DEFAULT_COOLDOWN)
    }

    pub fn with_config(history_size: usize, followup_window: Duration, cooldown: Duration) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(history_size)),
            history_size,
            followup_window,
            cooldown,
            dispatch_lock: Mutex::new(()),
        }
    }

    pub async fn add_member(&self, config: Arc<AgentRuntimeConfig>) {
        self.members.lock().await.push(Member {
            config,
            last_spoke_at: None,
            introduced: false,
        });
    }

    async fn push_history(&self, message: GroupMessage) {
        let mut history = self.history.lock().await;
        history.push_back(message);
        while history.len() > self.history_size {
            history.pop_front();
        }
    }

    fn roster_text(members: &[Member], except: &str) -> String {
        let names: Vec<_> = members
            .iter()
            .filter(|m| m.config.card.agent_id != except)
            .map(|m| format!("{} ({})", m.config.card.display_name, m.config.card.description))
            .collect();
        format!("You are in a group chat with: {}", names.join("; "))
    }

    /// Picks at most one replying agent for `message` and, if one speaks,
    /// runs its loop and returns the reply. Serialized per room: two
    /// concurrent calls on the same room queue behind this room's internal
    /// lock rather than racing the router/speaking-policy state.
    pub async fn dispatch(&self, message: GroupMessage, cancellation: &CancellationToken) -> Result<Option<GroupReply>, RunError> {
        let _guard = self.dispatch_lock.lock().await;
        self.push_history(message.clone()).await;

        let selection = {
            let members = self.members.lock().await;
            self.select_speaker(&members, &message)
        };

        let Some((index, reason)) = selection else {
            return Ok(None);
        };

        let (config, system_prompt_extra) = {
            let mut members = self.members.lock().await;
            let roster = if !members[index].introduced {
                members[index].introduced = true;
                Some(Self::roster_text(&members, &members[index].config.card.agent_id))
            } else {
                None
            };
            members[index].last_spoke_at = Some(Instant::now());
            (Arc::clone(&members[index].config), roster)
        };

        let agent_loop: AgentLoop = config.build_loop();
        let shared_context = self.shared_context_text().await;
        let extra_context = match (system_prompt_extra, shared_context) {
            (Some(roster), ctx) if !ctx.is_empty() => format!("{roster}\n\n{ctx}"),
            (Some(roster), _) => roster,
            (None, ctx) => ctx,
        };
        let extra = if extra_context.is_empty() { None } else { Some(extra_context.as_str()) };

        let run_result = agent_loop.run(cancellation, &message.content, &[], extra).await?;

        let reply = GroupReply {
            agent_id: config.card.agent_id.clone(),
            agent_name: config.card.display_name.clone(),
            content: run_result.final_output,
            reason,
        };

        self.push_history(GroupMessage {
            sender_id: reply.agent_id.clone(),
            sender_name: reply.agent_name.clone(),
            content: reply.content.clone(),
            mentioned_agents: Vec::new(),
            is_from_agent: true,
            timestamp: chrono::Utc::now(),
        })
        .await;

        Ok(Some(reply))
    }

    async fn shared_context_text(&self) -> String {
        let history = self.history.lock().await;
        history.iter().map(|m| format!("{}: {}", m.sender_name, m.content)).collect::<Vec<_>>().join("\n")
    }

    /// Four-tier router, first match wins: mention, skill keyword, recent
    /// followup, talkativeness draw. Cooldown gates everything except a
    /// direct mention.
    fn select_speaker(&self, members: &[Member], message: &GroupMessage) -> Option<(usize, ReplyReason)> {
        let now = Instant::now();
        let within_cooldown = |member: &Member| member.last_spoke_at.is_some_and(|t| now.duration_since(t) < self.cooldown);

        if let Some(index) = members.iter().position(|m| message.mentioned_agents.iter().any(|a| a == &m.config.card.agent_id)) {
            return Some((index, ReplyReason::Mention));
        }

        if let Some(index) = members.iter().position(|m| !within_cooldown(m) && m.config.card.has_skill_keyword(&message.content)) {
            return Some((index, ReplyReason::Skill));
        }

        if let Some(index) = members
            .iter()
            .position(|m| !within_cooldown(m) && m.last_spoke_at.is_some_and(|t| now.duration_since(t) < self.followup_window))
        {
            return Some((index, ReplyReason::Followup));
        }

        let mut rng = rand::thread_rng();
        members
            .iter()
            .position(|m| !within_cooldown(m) && rng.gen_bool(m.config.card.talkativeness.clamp(0.0, 1.0)))
            .map(|index| (index, ReplyReason::Talkativeness))
    }
}

impl Default for GroupChatRoom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::card::{AgentCardPublic, HandoffPolicy, SafetyLevel, Visibility};
    use crate::llm::MockLlmClient;

    fn card(agent_id: &str, skills: Vec<&str>, talkativeness: f64) -> AgentCardPublic {
        AgentCardPublic {
            agent_id: agent_id.to_string(),
            display_name: agent_id.to_string(),
            description: "a teammate".into(),
            skills: skills.into_iter().map(String::from).collect(),
            capabilities: serde_json::json!({}),
            owner_id: "o1".into(),
            org_id: None,
            visibility: Visibility::Public,
            allowed_caller_agents: vec![],
            allowed_caller_owners: vec![],
            safety_level: SafetyLevel::Low,
            handoff_policy: HandoffPolicy::Auto,
            talkativeness,
        }
    }

    fn message(content: &str, mentions: Vec<&str>) -> GroupMessage {
        GroupMessage {
            sender_id: "user1".into(),
            sender_name: "Alice".into(),
            content: content.to_string(),
            mentioned_agents: mentions.into_iter().map(String::from).collect(),
            is_from_agent: false,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn mention_takes_priority_over_skill_match() {
        let room = GroupChatRoom::new();
        let weather = AgentRuntimeConfig::new(card("weather", vec!["weather"], 0.0), Arc::new(MockLlmClient::always("sunny")));
        let billing = AgentRuntimeConfig::new(card("billing", vec!["invoice"], 0.0), Arc::new(MockLlmClient::always("ok")));
        room.add_member(Arc::new(weather)).await;
        room.add_member(Arc::new(billing)).await;

        let reply = room.dispatch(message("what's the weather", vec!["billing"]), &CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(reply.agent_id, "billing");
        assert_eq!(reply.reason, ReplyReason::Mention);
    }

    #[tokio::test]
    async fn skill_keyword_picks_the_matching_agent_when_unmentioned() {
        let room = GroupChatRoom::new();
        let weather = AgentRuntimeConfig::new(card("weather", vec!["weather"], 0.0), Arc::new(MockLlmClient::always("sunny")));
        room.add_member(Arc::new(weather)).await;

        let reply = room.dispatch(message("what's the weather today", vec![]), &CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(reply.agent_id, "weather");
        assert_eq!(reply.reason, ReplyReason::Skill);
    }

    #[tokio::test]
    async fn silence_when_no_tier_matches_and_talkativeness_is_zero() {
        let room = GroupChatRoom::new();
        let quiet = AgentRuntimeConfig::new(card("quiet", vec!["nothing-relevant"], 0.0), Arc::new(MockLlmClient::always("unused")));
        room.add_member(Arc::new(quiet)).await;

        let reply = room.dispatch(message("totally unrelated", vec![]), &CancellationToken::new()).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn at_most_one_agent_speaks_per_message() {
        let room = GroupChatRoom::new();
        let a = AgentRuntimeConfig::new(card("a", vec!["x"], 0.0), Arc::new(MockLlmClient::always("from a")));
        let b = AgentRuntimeConfig::new(card("b", vec!["x"], 0.0), Arc::new(MockLlmClient::always("from b")));
        room.add_member(Arc::new(a)).await;
        room.add_member(Arc::new(b)).await;

        let reply = room.dispatch(message("x please", vec![]), &CancellationToken::new()).await.unwrap();
        assert!(reply.is_some());
    }
}
