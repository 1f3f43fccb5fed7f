//! Core data model for the Action-Graph Runtime (spec.md §3, §4.1).

use crate::llm::IntelligenceTier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Mapping from string key to arbitrary value, accumulating across steps
/// (spec.md §3). The reserved key `parent_messages` is tracked separately
/// as [`StepContext::transcript`] since it carries typed transcript
/// messages rather than arbitrary JSON.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    values: HashMap<String, Value>,
    pub transcript: Vec<TranscriptMessage>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_input(input: Value) -> Self {
        let mut ctx = Self::new();
        if let Value::Object(map) = input {
            for (k, v) in map {
                ctx.set(k, v);
            }
        }
        ctx
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge a step's result object's fields into context as top-level keys
    /// (spec.md §4.1 resolution order, step d): "the result object's fields
    /// become top-level context keys, not nested under `result`".
    pub fn merge_result(&mut self, result: Map<String, Value>) {
        for (k, v) in result {
            self.values.insert(k, v);
        }
    }

    /// Snapshot suitable for template rendering.
    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// A message in the tool-call transcript (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl TranscriptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single requested tool call within an assistant transcript message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Output of a function step (spec.md §4.1): a context-merged result object
/// and, optionally, transcript messages to append (used by steps that
/// synthesize or replay part of a tool-call loop).
#[derive(Debug, Clone, Default)]
pub struct FunctionStepOutput {
    pub result: Map<String, Value>,
    pub parent_messages: Option<Vec<TranscriptMessage>>,
}

impl FunctionStepOutput {
    pub fn new(result: Map<String, Value>) -> Self {
        Self {
            result,
            parent_messages: None,
        }
    }
}

/// Tool-call loop configuration on an LLM step (spec.md §3).
#[derive(Debug, Clone)]
pub struct ToolChoiceConfig {
    /// Names of Actions callable as tools in this loop.
    pub actions: Vec<String>,
    /// Name of the Action that ends the loop when called (spec.md glossary:
    /// "a `stop_action`"). Must itself be a registered Action with its own
    /// input schema — advertised to the model like any other callable tool,
    /// never a synthetic stub.
    pub stop_action: String,
    pub max_iterations: u32,
    pub continuation_message: Option<String>,
}

/// One of the three step variants (spec.md §3).
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Deterministic handler, looked up by name in a function registry.
    Function { handler: String },
    /// A single LLM call, with or without a tool-call loop.
    Llm {
        system_prompt: String,
        message: String,
        tier: IntelligenceTier,
        output_schema: Option<Value>,
        tool_choice: Option<ToolChoiceConfig>,
    },
    /// Invoke another Action by name; the child inherits the parent's trace
    /// id prefix (spec.md §3).
    Action { name: String },
}

/// A `when` predicate over context: truthy-check or negated truthy-check of
/// a single context key (spec.md §4.1 resolution order, step a). Anything
/// richer is out of scope for this runtime's templating ambitions (spec.md
/// §9 "a minimal template engine ... suffices").
#[derive(Debug, Clone)]
pub struct WhenPredicate {
    pub key: String,
    pub negate: bool,
}

impl WhenPredicate {
    pub fn evaluate(&self, context: &StepContext) -> bool {
        let truthy = context.get(&self.key).is_some_and(is_truthy);
        if self.negate {
            !truthy
        } else {
            truthy
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// One step within an Action's main or post sequence.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub when: Option<WhenPredicate>,
    pub kind: StepKind,
}

/// A named, declarative program (spec.md §3).
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub examples: Vec<String>,
    pub input_schema: Value,
    pub steps: Vec<Step>,
    pub post_steps: Vec<Step>,
}

/// The outcome of running an Action (spec.md §4.1: `{result, error?}`).
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub result: Value,
    pub error: Option<crate::error::ActionError>,
}

impl ActionOutcome {
    pub fn ok(result: Value) -> Self {
        Self { result, error: None }
    }

    pub fn failed(error: crate::error::ActionError) -> Self {
        Self {
            result: Value::Null,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
