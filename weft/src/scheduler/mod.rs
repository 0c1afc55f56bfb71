//! Proactive Scheduler (C14): a single ticker drives a poll loop over
//! registered triggers, sending at most one message per user per trigger per
//! day.
//!
//! No direct teacher analogue. The single-long-lived-task shape follows the
//! MCP stdio transport's exit-watcher task (one `tokio::spawn`, a shutdown
//! signal, nothing more); panic containment reuses the
//! `futures::FutureExt::catch_unwind` pattern already used by the guardrail
//! manager (C7).

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// `checkFn(ctx) -> target user ids`.
pub type CheckFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Vec<String>> + Send>> + Send + Sync>;
/// `messageFn(user_id) -> Some(text)` or `None` to send nothing this tick.
pub type MessageFn = Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;
/// `SendFn(user_id, text) -> Ok(())` on successful delivery.
pub type SendFn = Arc<dyn Fn(String, String) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct Trigger {
    pub name: String,
    pub check_fn: CheckFn,
    pub message_fn: MessageFn,
}

/// Per-user, per-trigger enablement and send-dedup state.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn enable(&self, trigger: &str, user_id: &str);
    async fn disable(&self, trigger: &str, user_id: &str);
    async fn is_enabled(&self, trigger: &str, user_id: &str) -> bool;
    async fn enabled_users(&self, trigger: &str) -> Vec<String>;
    async fn record_sent(&self, trigger: &str, user_id: &str, date: NaiveDate);
    async fn already_sent_today(&self, trigger: &str, user_id: &str, date: NaiveDate) -> bool;
}

#[derive(Default)]
pub struct InMemoryUserStore {
    enabled: RwLock<HashMap<(String, String), bool>>,
    last_sent: RwLock<HashMap<(String, String), NaiveDate>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(trigger: &str, user_id: &str) -> (String, String) {
        (trigger.to_string(), user_id.to_string())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn enable(&self, trigger: &str, user_id: &str) {
        self.enabled.write().await.insert(Self::key(trigger, user_id), true);
    }

    async fn disable(&self, trigger: &str, user_id: &str) {
        self.enabled.write().await.insert(Self::key(trigger, user_id), false);
    }

    async fn is_enabled(&self, trigger: &str, user_id: &str) -> bool {
        self.enabled.read().await.get(&Self::key(trigger, user_id)).copied().unwrap_or(false)
    }

    async fn enabled_users(&self, trigger: &str) -> Vec<String> {
        self.enabled
            .read()
            .await
            .iter()
            .filter(|((t, _), enabled)| t == trigger && **enabled)
            .map(|((_, user_id), _)| user_id.clone())
            .collect()
    }

    async fn record_sent(&self, trigger: &str, user_id: &str, date: NaiveDate) {
        self.last_sent.write().await.insert(Self::key(trigger, user_id), date);
    }

    async fn already_sent_today(&self, trigger: &str, user_id: &str, date: NaiveDate) -> bool {
        self.last_sent.read().await.get(&Self::key(trigger, user_id)) == Some(&date)
    }
}

/// Drives registered [`Trigger`]s on a fixed tick, using a [`UserStore`] to
/// avoid sending the same trigger to the same user twice in one day.
pub struct ProactiveScheduler {
    triggers: Vec<Trigger>,
    user_store: Arc<dyn UserStore>,
    send: SendFn,
    tick_interval: Duration,
    started: AtomicBool,
    cancellation: CancellationToken,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ProactiveScheduler {
    pub fn new(triggers: Vec<Trigger>, user_store: Arc<dyn UserStore>, send: SendFn, tick_interval: Duration) -> Self {
        Self {
            triggers,
            user_store,
            send,
            tick_interval,
            started: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Runs one pass of every trigger, regardless of the tick schedule.
    /// Exposed directly so tests don't need to wait on a real ticker.
    pub async fn tick_once(&self) {
        for trigger in &self.triggers {
            let outcome = AssertUnwindSafe(self.run_trigger(trigger)).catch_unwind().await;
            if outcome.is_err() {
                tracing::warn!(trigger = %trigger.name, "proactive trigger panicked; contained");
            }
        }
    }

    async fn run_trigger(&self, trigger: &Trigger) {
        let user_ids = (trigger.check_fn)().await;
        let today = chrono::Utc::now().date_naive();
        for user_id in user_ids {
            if self.user_store.already_sent_today(&trigger.name, &user_id, today).await {
                continue;
            }
            let Some(text) = (trigger.message_fn)(user_id.clone()).await else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            if (self.send)(user_id.clone(), text).await.is_ok() {
                self.user_store.record_sent(&trigger.name, &user_id, today).await;
            }
        }
    }

    /// Idempotent: a second call while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        let cancellation = self.cancellation.clone();
        let interval = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => scheduler.tick_once().await,
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// No-op after the first call.
    pub async fn stop(&self) {
        if self.cancellation.is_cancelled() {
            return;
        }
        self.cancellation.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
