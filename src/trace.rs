//! The Tracer (spec.md §4.3): persists a per-action event stream to a local
//! transactional store keyed by trace id, and rebuilds a tree on read.

mod sanitize;
mod store;

pub use sanitize::sanitize;
pub use store::TraceStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Node kind (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Action,
    Step,
    LlmCall,
    Warning,
}

/// Node status (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Success,
    Error,
    Skipped,
}

/// One trace event as written to the store. Events accumulate per trace id;
/// [`TraceStore::tree`] assembles them (and child traces) into a
/// [`TraceNode`] on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: String,
    pub trace_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<Value>,
}

/// Assembled hierarchical record of one action's execution (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<Value>,
    pub children: Vec<TraceNode>,
}

/// An in-flight span handle returned by [`Tracer::start`]. Dropping it
/// without calling [`Span::finish`] leaves the event `running`, matching
/// spec.md §5's note that abandoned promises leave traces `running` until
/// the next startup sweep.
pub struct Span {
    tracer: Arc<Tracer>,
    event: TraceEvent,
    started: Instant,
    finished: bool,
}

impl Span {
    pub fn finish(mut self, status: Status, output: Option<Value>, error: Option<Value>) {
        self.finished = true;
        let mut event = self.event.clone();
        event.status = status;
        event.duration_ms = Some(self.started.elapsed().as_millis() as i64);
        event.output = output.map(|v| sanitize(&v));
        event.error = error.map(|v| sanitize(&v));
        self.tracer.record(event);
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(trace_id = %self.event.trace_id, "span dropped without finishing");
        }
    }
}

/// Facade used by the Action-Graph Runtime to emit trace events and by
/// callers to read assembled trees back.
pub struct Tracer {
    store: Arc<TraceStore>,
}

impl Tracer {
    pub fn new(store: Arc<TraceStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// Start a span. `id` should be the composite trace id (spec.md §4.3:
    /// `parentId_stepIndex_uuid` for child actions).
    pub fn start(self: &Arc<Self>, id: impl Into<String>, trace_id: impl Into<String>, name: impl Into<String>, node_type: NodeType, input: Option<Value>) -> Span {
        let trace_id = trace_id.into();
        let event = TraceEvent {
            id: id.into(),
            trace_id,
            name: name.into(),
            node_type,
            status: Status::Running,
            start_time: Utc::now(),
            duration_ms: None,
            input: input.map(|v| sanitize(&v)),
            output: None,
            error: None,
        };
        // Persist the running event immediately so an abandoned span (host
        // frame torn down before `finish`) still leaves a `running` row for
        // the next startup sweep to find (spec.md §5).
        self.record(event.clone());
        Span {
            tracer: self.clone(),
            event,
            started: Instant::now(),
            finished: false,
        }
    }

    fn record(&self, event: TraceEvent) {
        if let Err(err) = self.store.write_event(&event) {
            tracing::error!(trace_id = %event.trace_id, error = %err, "failed to persist trace event");
        }
    }

    pub fn store(&self) -> &Arc<TraceStore> {
        &self.store
    }
}
