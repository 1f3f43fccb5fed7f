//! Crate-wide error taxonomy.
//!
//! Every subsystem carries its own `thiserror`-derived error type, but all of
//! them key off the same stable `ErrorKind` so callers can match on kind
//! without string comparison and so the kind survives across the action /
//! bridge / dom boundary into a trace event or a chat-transcript message.

use thiserror::Error;

/// Stable error kinds surfaced across every subsystem boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTab,
    Restricted,
    BrowserErrorPage,
    TabGone,
    ScriptInjectionFailed,
    Timeout,
    ModelCallFailed,
    AllModelsFailed,
    SchemaParseFailed,
    MaxIterations,
    OversizedEvent,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidTab => "InvalidTab",
            ErrorKind::Restricted => "Restricted",
            ErrorKind::BrowserErrorPage => "BrowserErrorPage",
            ErrorKind::TabGone => "TabGone",
            ErrorKind::ScriptInjectionFailed => "ScriptInjectionFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ModelCallFailed => "ModelCallFailed",
            ErrorKind::AllModelsFailed => "AllModelsFailed",
            ErrorKind::SchemaParseFailed => "SchemaParseFailed",
            ErrorKind::MaxIterations => "MaxIterations",
            ErrorKind::OversizedEvent => "OversizedEvent",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the Action-Graph Runtime (step execution, template
/// resolution, tool-call loop).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn max_iterations(action: &str, max_iterations: u32) -> Self {
        Self::new(
            ErrorKind::MaxIterations,
            format!("action '{action}' exceeded max_iterations={max_iterations} without stop_action"),
        )
    }
}

/// Error raised by the Browser-State & Bridge core.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Error raised by the DOM Cleaning Pipeline.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DomError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DomError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Error raised by the Tracer's storage layer.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("event serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("trace {0} not found")]
    NotFound(String),
}

/// Error raised by the tab registry's session-storage persistence layer.
/// Shares shape with [`TraceError`] (same two underlying failure modes) but
/// is kept distinct since the two stores are unrelated collaborators.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convert any of the subsystem errors into the JSON `{error: {kind,
/// message}}` shape that crosses the process boundary (spec.md §6 "Exit /
/// error signaling").
pub fn to_json(kind: ErrorKind, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "kind": kind.as_str(),
            "message": message,
        }
    })
}
