//! Hierarchical tracer (C8): spans form a forest per trace and are exported
//! exactly once, when their root ends.
//!
//! This is distinct from the ambient `tracing` crate logging used throughout
//! the rest of the crate (`debug!`/`warn!` for operational logs a human
//! reads) — `Tracer` is a data model the SDK exports programmatically.
//! Parent linkage is explicit (a caller passes the parent's handle to
//! `start_span`) rather than relying on thread-local state, per the
//! tracing-parent-linkage re-architecture note.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// The kind of work a span represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    Agent,
    Llm,
    Tool,
    Guardrail,
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    Running,
    Ok,
    Error,
}

/// A single timed, typed unit of work in a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingSpan {
    pub span_id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub kind: SpanKind,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub status: SpanStatus,
    pub error: Option<String>,
    pub children: Vec<TracingSpan>,
}

impl TracingSpan {
    fn new(trace_id: String, parent_id: Option<String>, name: String, kind: SpanKind) -> Self {
        Self {
            span_id: Uuid::new_v4().to_string(),
            trace_id,
            parent_id,
            name,
            kind,
            start: Utc::now(),
            end: None,
            attributes: serde_json::Map::new(),
            status: SpanStatus::Running,
            error: None,
            children: Vec::new(),
        }
    }
}

/// A handle a caller threads through nested work to attribute child spans to
/// the right parent and trace.
#[derive(Clone)]
pub struct SpanHandle {
    trace_id: String,
    span_id: String,
}

/// Called with a span exactly once, when its root finishes.
pub type SpanExporter = Arc<dyn Fn(TracingSpan) + Send + Sync>;

struct TraceState {
    root: TracingSpan,
    /// span_id -> path of indices into nested `children` vectors, from root.
    paths: HashMap<String, Vec<usize>>,
}

/// Builds and exports span trees. One `Tracer` instance is typically shared
/// by an `AgentRuntimeConfig`.
pub struct Tracer {
    traces: Mutex<HashMap<String, TraceState>>,
    exporter: Option<SpanExporter>,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            traces: Mutex::new(HashMap::new()),
            exporter: None,
        }
    }

    pub fn with_exporter(exporter: SpanExporter) -> Self {
        Self {
            traces: Mutex::new(HashMap::new()),
            exporter: Some(exporter),
        }
    }

    /// Starts a root span (no parent handle) and begins tracking a new trace.
    pub async fn start_root(&self, name: impl Into<String>, kind: SpanKind) -> SpanHandle {
        let trace_id = Uuid::new_v4().to_string();
        let span = TracingSpan::new(trace_id.clone(), None, name.into(), kind);
        let span_id = span.span_id.clone();
        let mut traces = self.traces.lock().await;
        traces.insert(
            trace_id.clone(),
            TraceState {
                root: span,
                paths: HashMap::from([(span_id.clone(), Vec::new())]),
            },
        );
        SpanHandle { trace_id, span_id }
    }

    /// Starts a child span under `parent`.
    pub async fn start_span(&self, parent: &SpanHandle, name: impl Into<String>, kind: SpanKind) -> SpanHandle {
        let mut traces = self.traces.lock().await;
        let Some(state) = traces.get_mut(&parent.trace_id) else {
            return parent.clone();
        };
        let Some(parent_path) = state.paths.get(&parent.span_id).cloned() else {
            return parent.clone();
        };
        let span = TracingSpan::new(parent.trace_id.clone(), Some(parent.span_id.clone()), name.into(), kind);
        let span_id = span.span_id.clone();

        let mut node = &mut state.root;
        for &idx in &parent_path {
            node = &mut node.children[idx];
        }
        node.children.push(span);
        let mut child_path = parent_path;
        child_path.push(node.children.len() - 1);
        state.paths.insert(span_id.clone(), child_path);

        SpanHandle {
            trace_id: parent.trace_id.clone(),
            span_id,
        }
    }

    /// Attaches an attribute to the named span.
    pub async fn set_attribute(&self, handle: &SpanHandle, key: impl Into<String>, value: serde_json::Value) {
        self.mutate_span(handle, |span| {
            span.attributes.insert(key.into(), value);
        })
        .await;
    }

    /// Ends a span with `status`/`error`. If this is the root span of its
    /// trace, the whole tree is exported exactly once and removed from
    /// tracking.
    pub async fn end_span(&self, handle: &SpanHandle, status: SpanStatus, error: Option<String>) {
        let is_root = {
            let mut traces = self.traces.lock().await;
            let Some(state) = traces.get_mut(&handle.trace_id) else {
                return;
            };
            let path = state.paths.get(&handle.span_id).cloned().unwrap_or_default();
            let mut node = &mut state.root;
            for &idx in &path {
                node = &mut node.children[idx];
            }
            node.end = Some(Utc::now());
            node.status = status;
            node.error = error;
            path.is_empty()
        };

        if is_root {
            let mut traces = self.traces.lock().await;
            if let Some(state) = traces.remove(&handle.trace_id) {
                if let Some(exporter) = &self.exporter {
                    exporter(state.root);
                }
            }
        }
    }

    async fn mutate_span(&self, handle: &SpanHandle, f: impl FnOnce(&mut TracingSpan)) {
        let mut traces = self.traces.lock().await;
        let Some(state) = traces.get_mut(&handle.trace_id) else {
            return;
        };
        let path = state.paths.get(&handle.span_id).cloned().unwrap_or_default();
        let mut node = &mut state.root;
        for &idx in &path {
            node = &mut node.children[idx];
        }
        f(node);
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}
