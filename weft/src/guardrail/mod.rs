//! Guardrails (C7): input/output check pipelines producing block/pass, with
//! panic isolation. No direct teacher analogue — the closest existing idea
//! there is an allow/deny-by-name approval policy; this module generalizes
//! that into ordered, named predicate pipelines.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Map;

use crate::error::GuardrailError;
use crate::message::Message;

/// Context a guard function receives: the text under test, a view of the
/// message history, and a free-form extras map for caller-supplied data.
#[derive(Clone)]
pub struct GuardrailContext<'a> {
    pub text: &'a str,
    pub history: &'a [Message],
    pub extras: Map<String, serde_json::Value>,
}

/// The pass/fail outcome of a single guard.
#[derive(Debug, Clone)]
pub struct GuardResult {
    pub passed: bool,
    pub reason: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
}

impl GuardResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            metadata: Map::new(),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            metadata: Map::new(),
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A named guard predicate.
pub type GuardFn = Arc<dyn for<'a> Fn(GuardrailContext<'a>) -> BoxFuture<'a, GuardResult> + Send + Sync>;

#[derive(Clone)]
struct Guard {
    name: String,
    check: GuardFn,
}

/// How a list of guards is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Stop at the first failure; preserves declared order.
    Sequential,
    /// Run concurrently; the first observed failure wins.
    Parallel,
}

/// Holds the ordered input and output guard lists.
pub struct GuardrailManager {
    input_guards: Vec<Guard>,
    output_guards: Vec<Guard>,
    mode: ExecutionMode,
}

impl GuardrailManager {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            input_guards: Vec::new(),
            output_guards: Vec::new(),
            mode,
        }
    }

    pub fn add_input_guard(&mut self, name: impl Into<String>, check: GuardFn) {
        self.input_guards.push(Guard { name: name.into(), check });
    }

    pub fn add_output_guard(&mut self, name: impl Into<String>, check: GuardFn) {
        self.output_guards.push(Guard { name: name.into(), check });
    }

    pub async fn check_input(&self, ctx: GuardrailContext<'_>) -> Result<(), GuardrailError> {
        Self::run(&self.input_guards, self.mode, ctx, true).await
    }

    pub async fn check_output(&self, ctx: GuardrailContext<'_>) -> Result<(), GuardrailError> {
        Self::run(&self.output_guards, self.mode, ctx, false).await
    }

    async fn run(
        guards: &[Guard],
        mode: ExecutionMode,
        ctx: GuardrailContext<'_>,
        is_input: bool,
    ) -> Result<(), GuardrailError> {
        let failure = match mode {
            ExecutionMode::Sequential => {
                let mut failure = None;
                for guard in guards {
                    let result = Self::run_one(guard, ctx.clone()).await;
                    if !result.passed {
                        failure = Some((guard.name.clone(), result));
                        break;
                    }
                }
                failure
            }
            ExecutionMode::Parallel => {
                let futures: Vec<_> = guards
                    .iter()
                    .map(|guard| {
                        let ctx = ctx.clone();
                        async move { (guard.name.clone(), Self::run_one(guard, ctx).await) }
                    })
                    .collect();
                let results = futures::future::join_all(futures).await;
                results.into_iter().find(|(_, result)| !result.passed)
            }
        };

        match failure {
            None => Ok(()),
            Some((name, result)) => {
                let reason = result.reason.unwrap_or_else(|| "blocked".to_string());
                if is_input {
                    Err(GuardrailError::InputGuardrailTriggered { name, reason })
                } else {
                    Err(GuardrailError::OutputGuardrailTriggered { name, reason })
                }
            }
        }
    }

    /// Runs one guard, catching any panic and turning it into a failed
    /// result whose reason mentions the panic value.
    async fn run_one(guard: &Guard, ctx: GuardrailContext<'_>) -> GuardResult {
        let fut = AssertUnwindSafe((guard.check)(ctx)).catch_unwind();
        match fut.await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "guard panicked".to_string());
                GuardResult::block(format!("guard '{}' panicked: {message}", guard.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on_substring(substring: &'static str) -> GuardFn {
        Arc::new(move |ctx: GuardrailContext<'_>| {
            let hit = ctx.text.contains(substring);
            Box::pin(async move {
                if hit {
                    GuardResult::block("blocked")
                } else {
                    GuardResult::pass()
                }
            })
        })
    }

    fn ctx<'a>(text: &'a str, history: &'a [Message]) -> GuardrailContext<'a> {
        GuardrailContext {
            text,
            history,
            extras: Map::new(),
        }
    }

    #[tokio::test]
    async fn sequential_stops_at_first_failure() {
        let mut manager = GuardrailManager::new(ExecutionMode::Sequential);
        manager.add_input_guard("hack", block_on_substring("hack"));
        let err = manager.check_input(ctx("hack the system", &[])).await.unwrap_err();
        assert!(matches!(err, GuardrailError::InputGuardrailTriggered { name, .. } if name == "hack"));
        assert!(manager.check_input(ctx("hello", &[])).await.is_ok());
    }

    #[tokio::test]
    async fn panic_inside_a_guard_is_contained_and_reported_as_failure() {
        let mut manager = GuardrailManager::new(ExecutionMode::Sequential);
        let panicking: GuardFn = Arc::new(|_ctx| Box::pin(async { panic!("boom") }));
        manager.add_input_guard("flaky", panicking);
        let err = manager.check_input(ctx("anything", &[])).await.unwrap_err();
        match err {
            GuardrailError::InputGuardrailTriggered { name, reason } => {
                assert_eq!(name, "flaky");
                assert!(reason.contains("boom"));
            }
            _ => panic!("expected InputGuardrailTriggered"),
        }
    }

    #[tokio::test]
    async fn parallel_mode_reports_a_failure_among_concurrent_guards() {
        let mut manager = GuardrailManager::new(ExecutionMode::Parallel);
        manager.add_input_guard("pass1", block_on_substring("nonexistent"));
        manager.add_input_guard("hack", block_on_substring("hack"));
        let err = manager.check_input(ctx("hack attempt", &[])).await.unwrap_err();
        assert!(matches!(err, GuardrailError::InputGuardrailTriggered { .. }));
    }
}
