//! A handful of built-in actions wired up for manual CLI exercise (spec.md
//! §12: "a thin CLI driver for manual exercise"). Not part of the core
//! design — just enough surface to run [`Executor`](crate::action::Executor)
//! end to end without a real browser or LLM credentials.

use crate::action::{Action, ActionRegistry, FunctionHandler, FunctionRegistry, FunctionStepOutput, Step, StepContext, StepKind};
use crate::error::ActionError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Echoes its `input` context key back under `echoed` — useful for
/// smoke-testing the executor's step sequencing without touching the
/// network or a browser.
struct Echo;

#[async_trait]
impl FunctionHandler for Echo {
    async fn call(&self, context: &StepContext) -> Result<FunctionStepOutput, ActionError> {
        let mut result = Map::new();
        result.insert("echoed".to_string(), context.get("input").cloned().unwrap_or(Value::Null));
        Ok(FunctionStepOutput::new(result))
    }
}

/// The default `stop_action` handler for a tool-call loop (spec.md §4.1):
/// whatever fields the model passed become the step's final result,
/// verbatim.
struct Stop;

#[async_trait]
impl FunctionHandler for Stop {
    async fn call(&self, context: &StepContext) -> Result<FunctionStepOutput, ActionError> {
        let result: Map<String, Value> = context.as_map().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(FunctionStepOutput::new(result))
    }
}

pub fn register_builtin_functions(registry: &mut FunctionRegistry) {
    registry.register("echo", Arc::new(Echo));
    registry.register("stop_action", Arc::new(Stop));
}

pub fn register_builtin_actions(registry: &mut ActionRegistry) {
    registry.register(Action {
        name: "echo".to_string(),
        description: "Echo the `input` field back unchanged.".to_string(),
        examples: vec!["echo {\"input\": \"hello\"}".to_string()],
        input_schema: json!({
            "type": "object",
            "properties": { "input": {} },
            "required": ["input"]
        }),
        steps: vec![Step {
            name: "echo".to_string(),
            when: None,
            kind: StepKind::Function { handler: "echo".to_string() },
        }],
        post_steps: vec![],
    });

    registry.register(Action {
        name: "stop_action".to_string(),
        description: "Terminate a tool-call loop, returning the passed fields as the step's final result.".to_string(),
        examples: vec!["stop_action {\"answer\": 42}".to_string()],
        input_schema: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": true
        }),
        steps: vec![Step {
            name: "stop".to_string(),
            when: None,
            kind: StepKind::Function { handler: "stop_action".to_string() },
        }],
        post_steps: vec![],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Executor;
    use crate::llm::{Gateway, ModelCatalog, ModelRegistry};
    use crate::trace::{TraceStore, Tracer};

    #[tokio::test]
    async fn echo_action_round_trips_input() {
        let mut actions = ActionRegistry::new();
        register_builtin_actions(&mut actions);
        let def = actions.get("echo").expect("echo action registered");

        let mut functions = FunctionRegistry::new();
        register_builtin_functions(&mut functions);

        let gateway = Arc::new(Gateway::new(Arc::new(ModelRegistry::new_empty()), ModelCatalog::default_catalog()));
        let tracer = Tracer::new(Arc::new(TraceStore::in_memory().unwrap()));

        let executor = Executor::new(Arc::new(actions), Arc::new(functions), gateway, tracer);
        let outcome = executor.execute_root(&def, json!({"input": "hi"})).await;

        assert!(!outcome.is_error());
        assert_eq!(outcome.result.get("echoed"), Some(&json!("hi")));
    }
}
