//! Agent Loop (C10): the bounded ReAct driver — system prompt + history +
//! input → LLM → tool calls → repeat — per spec §4.3.
//!
//! Grounded on `graphweave/src/agent/react/act_node.rs` for the tool-call
//! execution loop (error-to-content conversion, parsing of stringified tool
//! arguments) and `loom/src/agent/react/runner.rs` for the builder-style
//! constructor threading optional collaborators. Generalized from the
//! teacher's graph-compiler design (`StateGraph`/`Node`) to a direct bounded
//! loop, since this is a fixed reason/act cycle, not a generic graph engine.

pub mod card;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub use card::{AgentCardPublic, AgentRuntimeConfig, HandoffPolicy, SafetyLevel, Visibility};

use crate::error::{RunError, ToolError};
use crate::guardrail::{GuardrailContext, GuardrailManager};
use crate::llm::LlmClient;
use crate::loop_detector::LoopDetector;
use crate::message::{Message, ToolCallRequest};
use crate::tools::schema::to_tool_definitions;
use crate::tools::{ToolContext, ToolRegistry};
use crate::trace::{SpanHandle, SpanKind, SpanStatus, Tracer};

/// Why a run stopped. Most outcomes are structural, not errors — only an
/// LLM-call failure aborts `run()` with `Err` (see [`RunError`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppedReason {
    Completed,
    Guardrail,
    LoopDetected,
    MaxTurns,
    Cancelled,
}

/// The outcome of one [`AgentLoop::run`] invocation.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub final_output: String,
    pub stopped_reason: StoppedReason,
    pub total_turns: usize,
    pub tool_calls_count: usize,
    /// The full message transcript produced by this run, so callers can
    /// reconstruct conversation history (append to short-term memory, etc.).
    pub transcript: Vec<Message>,
}

impl RunResult {
    fn cancelled() -> Self {
        Self {
            final_output: String::new(),
            stopped_reason: StoppedReason::Cancelled,
            total_turns: 0,
            tool_calls_count: 0,
            transcript: Vec::new(),
        }
    }
}

/// Bounded ReAct driver. Built via [`AgentLoop::new`] plus `with_*` builder
/// methods threading optional collaborators — tools, guardrails, a loop
/// detector, a tracer — since these are per-agent, not per-call.
pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    tools: Option<Arc<ToolRegistry>>,
    guardrails: Option<Arc<GuardrailManager>>,
    loop_detector: Option<Arc<Mutex<LoopDetector>>>,
    tracer: Option<Arc<Tracer>>,
    system_prompt: Option<String>,
    max_turns: usize,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            tools: None,
            guardrails: None,
            loop_detector: None,
            tracer: None,
            system_prompt: None,
            max_turns: 10,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_guardrails(mut self, guardrails: Arc<GuardrailManager>) -> Self {
        self.guardrails = Some(guardrails);
        self
    }

    pub fn with_loop_detector(mut self, detector: Arc<Mutex<LoopDetector>>) -> Self {
        self.loop_detector = Some(detector);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Runs one bounded ReAct cycle. `cancellation` is checked before the
    /// run starts, before each LLM call, and before each subsequent tool
    /// call within a turn.
    pub async fn run(
        &self,
        cancellation: &CancellationToken,
        user_input: &str,
        history: &[Message],
        extra_context: Option<&str>,
    ) -> Result<RunResult, RunError> {
        if cancellation.is_cancelled() {
            return Ok(RunResult::cancelled());
        }

        let root_span = match &self.tracer {
            Some(tracer) => Some(tracer.start_root("agent_run", SpanKind::Agent).await),
            None => None,
        };

        let result = self.run_inner(cancellation, user_input, history, extra_context, root_span.as_ref()).await;

        if let (Some(tracer), Some(span)) = (&self.tracer, &root_span) {
            let (status, error) = match &result {
                Ok(_) => (SpanStatus::Ok, None),
                Err(e) => (SpanStatus::Error, Some(e.to_string())),
            };
            tracer.end_span(span, status, error).await;
        }

        result
    }

    async fn run_inner(
        &self,
        cancellation: &CancellationToken,
        user_input: &str,
        history: &[Message],
        extra_context: Option<&str>,
        agent_span: Option<&SpanHandle>,
    ) -> Result<RunResult, RunError> {
        let mut transcript = Vec::new();

        if let Some(guardrails) = &self.guardrails {
            let ctx = GuardrailContext {
                text: user_input,
                history,
                extras: Map::new(),
            };
            if let Err(err) = guardrails.check_input(ctx).await {
                let reason = err.to_string();
                return Ok(RunResult {
                    final_output: reason,
                    stopped_reason: StoppedReason::Guardrail,
                    total_turns: 0,
                    tool_calls_count: 0,
                    transcript,
                });
            }
        }

        if let Some(prompt) = &self.system_prompt {
            transcript.push(Message::system(prompt.clone()));
        }
        if let Some(extra) = extra_context {
            transcript.push(Message::system(extra.to_string()));
        }
        transcript.extend_from_slice(history);
        transcript.push(Message::user(user_input.to_string()));

        let tool_defs = match &self.tools {
            Some(registry) if !registry.is_empty().await => Some(to_tool_definitions(registry).await),
            _ => None,
        };

        let mut tool_calls_count = 0usize;
        let mut total_turns = 0usize;

        for turn in 1..=self.max_turns {
            total_turns = turn;

            let llm_span = match (&self.tracer, agent_span) {
                (Some(tracer), Some(parent)) => Some(tracer.start_span(parent, "llm_call", SpanKind::Llm).await),
                _ => None,
            };
            let response = self.llm.invoke_cancellable(&transcript, tool_defs.as_deref(), cancellation).await;
            if let (Some(tracer), Some(span)) = (&self.tracer, &llm_span) {
                let (status, error) = match &response {
                    Ok(_) => (SpanStatus::Ok, None),
                    Err(e) => (SpanStatus::Error, Some(e.to_string())),
                };
                tracer.end_span(span, status, error).await;
            }
            let response = response?;

            if response.tool_calls.is_empty() {
                if let Some(guardrails) = &self.guardrails {
                    let ctx = GuardrailContext {
                        text: &response.content,
                        history: &transcript,
                        extras: Map::new(),
                    };
                    if let Err(err) = guardrails.check_output(ctx).await {
                        transcript.push(Message::assistant(response.content.clone()));
                        return Ok(RunResult {
                            final_output: err.to_string(),
                            stopped_reason: StoppedReason::Guardrail,
                            total_turns,
                            tool_calls_count,
                            transcript,
                        });
                    }
                }
                transcript.push(Message::assistant(response.content.clone()));
                return Ok(RunResult {
                    final_output: response.content,
                    stopped_reason: StoppedReason::Completed,
                    total_turns,
                    tool_calls_count,
                    transcript,
                });
            }

            transcript.push(Message::assistant_with_calls(response.content.clone(), response.tool_calls.clone()));

            for call in &response.tool_calls {
                let args = parse_tool_arguments(&call.arguments_json);

                if let Some(detector) = &self.loop_detector {
                    let flagged = detector.lock().await.check(&call.name, &Value::Object(args.clone())).is_some();
                    if flagged {
                        return Ok(RunResult {
                            final_output: transcript.last().map(Message::text).unwrap_or_default().to_string(),
                            stopped_reason: StoppedReason::LoopDetected,
                            total_turns,
                            tool_calls_count,
                            transcript,
                        });
                    }
                }

                let tool_span = match (&self.tracer, agent_span) {
                    (Some(tracer), Some(parent)) => Some(tracer.start_span(parent, call.name.clone(), SpanKind::Tool).await),
                    _ => None,
                };
                let content = self.execute_tool_call(call, &args, cancellation).await;
                if let (Some(tracer), Some(span)) = (&self.tracer, &tool_span) {
                    let status = if content.starts_with("Error: ") { SpanStatus::Error } else { SpanStatus::Ok };
                    tracer.end_span(span, status, None).await;
                }

                transcript.push(Message::tool(call.id.clone(), call.name.clone(), content));
                tool_calls_count += 1;

                if let Some(detector) = &self.loop_detector {
                    detector.lock().await.record(&call.name, &Value::Object(args));
                }

                if cancellation.is_cancelled() {
                    return Ok(RunResult {
                        final_output: String::new(),
                        stopped_reason: StoppedReason::Cancelled,
                        total_turns,
                        tool_calls_count,
                        transcript,
                    });
                }
            }
        }

        let final_output = transcript
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Assistant { content, .. } if !content.is_empty() => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(RunResult {
            final_output,
            stopped_reason: StoppedReason::MaxTurns,
            total_turns,
            tool_calls_count,
            transcript,
        })
    }

    /// Executes one requested tool call against the registry, converting any
    /// error into `"Error: <msg>"` content instead of aborting the run — the
    /// model must see the failure and may recover.
    async fn execute_tool_call(&self, call: &ToolCallRequest, args: &Map<String, Value>, cancellation: &CancellationToken) -> String {
        let Some(registry) = &self.tools else {
            return format!("Error: {}", ToolError::UnknownTool(call.name.clone()));
        };
        let ctx = ToolContext::new(call.name.clone(), call.id.clone()).with_cancellation(cancellation.clone());
        match registry.execute(&call.name, args.clone(), ctx).await {
            Ok(value) => value.into_text(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

/// Parses a tool call's raw `arguments_json` string (per the external LLM
/// callable contract). `null` or a parse failure yields an empty map rather
/// than aborting the call — a malformed payload surfaces as missing
/// arguments to the tool's own validation, not a loop-level failure.
fn parse_tool_arguments(arguments_json: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(arguments_json) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) | Err(_) => Map::new(),
        // A stringified JSON object nested one level deep (some providers
        // double-encode); try once more before giving up.
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        Ok(_) => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MockLlmClient};
    use crate::tools::{AnyValue, ParamType, ToolParam};

    async fn registry_with_get_weather() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(
                crate::tools::Tool::new("get_weather", "weather lookup", |_ctx, args| async move {
                    let city = args.get("city").and_then(Value::as_str).unwrap_or("?").to_string();
                    Ok(AnyValue::String(format!("{city}: 25\u{b0}C")))
                })
                .with_param(ToolParam::new("city", ParamType::String).required()),
            )
            .await;
        Arc::new(registry)
    }

    #[tokio::test]
    async fn direct_answer_completes_on_first_turn_with_no_tools() {
        let llm = Arc::new(MockLlmClient::always("Hello!"));
        let agent = AgentLoop::new(llm);
        let result = agent.run(&CancellationToken::new(), "hi", &[], None).await.unwrap();
        assert_eq!(result.final_output, "Hello!");
        assert_eq!(result.total_turns, 1);
        assert_eq!(result.tool_calls_count, 0);
        assert_eq!(result.stopped_reason, StoppedReason::Completed);
    }

    #[tokio::test]
    async fn single_tool_call_then_answer() {
        let registry = registry_with_get_weather().await;
        let llm = Arc::new(MockLlmClient::new(vec![
            LlmResponse {
                content: String::new(),
                tool_calls: vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "get_weather".into(),
                    arguments_json: r#"{"city":"Shanghai"}"#.into(),
                }],
                usage: None,
            },
            LlmResponse {
                content: "Shanghai is 25\u{b0}C.".into(),
                tool_calls: Vec::new(),
                usage: None,
            },
        ]));
        let agent = AgentLoop::new(llm).with_tools(registry);
        let result = agent.run(&CancellationToken::new(), "weather?", &[], None).await.unwrap();
        assert_eq!(result.final_output, "Shanghai is 25\u{b0}C.");
        assert_eq!(result.total_turns, 2);
        assert_eq!(result.tool_calls_count, 1);
        assert_eq!(result.stopped_reason, StoppedReason::Completed);
        let tool_message = result.transcript.iter().find(|m| matches!(m, Message::Tool { .. })).unwrap();
        assert_eq!(tool_message.text(), "Shanghai: 25\u{b0}C");
    }

    #[tokio::test]
    async fn exhausting_max_turns_stops_with_max_turns_reason() {
        let registry = registry_with_get_weather().await;
        let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments_json: r#"{"city":"Shanghai"}"#.into(),
            }],
            usage: None,
        }]));
        let agent = AgentLoop::new(llm).with_tools(registry).with_max_turns(3);
        let result = agent.run(&CancellationToken::new(), "weather?", &[], None).await.unwrap();
        assert_eq!(result.stopped_reason, StoppedReason::MaxTurns);
        assert_eq!(result.total_turns, 3);
    }

    #[tokio::test]
    async fn input_guardrail_block_skips_the_llm_entirely() {
        let llm = Arc::new(MockLlmClient::always("should never be called"));
        let mut guardrails = GuardrailManager::new(crate::guardrail::ExecutionMode::Sequential);
        guardrails.add_input_guard(
            "no-hack",
            Arc::new(|ctx: GuardrailContext<'_>| {
                let blocked = ctx.text.contains("hack");
                Box::pin(async move {
                    if blocked {
                        crate::guardrail::GuardResult::block("blocked")
                    } else {
                        crate::guardrail::GuardResult::pass()
                    }
                })
            }),
        );
        let agent = AgentLoop::new(llm).with_guardrails(Arc::new(guardrails));
        let result = agent.run(&CancellationToken::new(), "hack the system", &[], None).await.unwrap();
        assert_eq!(result.stopped_reason, StoppedReason::Guardrail);
        assert_eq!(result.total_turns, 0);
    }

    #[tokio::test]
    async fn loop_detector_stops_a_repeating_tool_call() {
        let registry = registry_with_get_weather().await;
        let call = ToolCallRequest {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments_json: r#"{"city":"Same"}"#.into(),
        };
        let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![call],
            usage: None,
        }]));
        let detector = Arc::new(Mutex::new(LoopDetector::new(crate::loop_detector::LoopDetectorConfig {
            max_repeat_calls: 3,
            max_same_tool_in_window: 1000,
            window_size: 50,
        })));
        let agent = AgentLoop::new(llm).with_tools(registry).with_loop_detector(detector).with_max_turns(20);
        let result = agent.run(&CancellationToken::new(), "weather?", &[], None).await.unwrap();
        assert_eq!(result.stopped_reason, StoppedReason::LoopDetected);
        assert!(result.tool_calls_count <= 3);
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_immediately() {
        let llm = Arc::new(MockLlmClient::always("unused"));
        let agent = AgentLoop::new(llm);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = agent.run(&cancellation, "hi", &[], None).await.unwrap();
        assert_eq!(result.stopped_reason, StoppedReason::Cancelled);
        assert_eq!(result.total_turns, 0);
    }

    #[test]
    fn parse_tool_arguments_handles_null_and_malformed_payloads() {
        assert!(parse_tool_arguments("null").is_empty());
        assert!(parse_tool_arguments("not json").is_empty());
        assert_eq!(parse_tool_arguments(r#"{"a":1}"#).get("a").unwrap(), 1);
    }
}
