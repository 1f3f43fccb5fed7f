//! Property test for the tool-call loop's transcript-ordering invariant
//! (spec.md §4.1 scenario list: "the transcript after the loop contains,
//! in order, 1 system + 1 user + (k·(1 assistant + m tool)) messages with
//! matching tool_call_ids; k ≤ max_iterations; the final assistant message
//! has either no tool calls or exactly one tool call naming `stop_action`").

use super::registry::{ActionRegistry, FunctionHandler, FunctionRegistry};
use super::types::{Action, FunctionStepOutput, Step, StepContext, StepKind, ToolChoiceConfig, TranscriptMessage, TranscriptRole};
use super::Executor;
use crate::error::ActionError;
use crate::llm::{ContentBlock, Gateway, IntelligenceTier, LlmError, LlmRequest, LlmResponse, LlmService, ModelCatalog, ModelCatalogEntry, ModelRegistry, Usage};
use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};

struct Noop;

#[async_trait]
impl FunctionHandler for Noop {
    async fn call(&self, _context: &StepContext) -> Result<FunctionStepOutput, ActionError> {
        Ok(FunctionStepOutput::new(serde_json::Map::new()))
    }
}

/// One turn of a pre-scripted conversation, built before the loop runs so
/// the property test controls exactly how many tool calls (and whether a
/// `stop_action`) appear in each turn.
enum ScriptedTurn {
    Tools(Vec<(String, String)>), // (call id, action name)
    StopAction(String),           // call id
    Final(String),
}

struct ScriptedService {
    turns: Mutex<std::collections::VecDeque<ScriptedTurn>>,
}

#[async_trait]
impl LlmService for ScriptedService {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let turn = self.turns.lock().unwrap().pop_front().expect("script exhausted before loop ended");
        let content = match turn {
            ScriptedTurn::Tools(calls) => calls
                .into_iter()
                .map(|(id, name)| ContentBlock::tool_use(id, name, json!({})))
                .collect(),
            ScriptedTurn::StopAction(id) => vec![ContentBlock::tool_use(id, "stop_action", json!({}))],
            ScriptedTurn::Final(text) => vec![ContentBlock::text(text)],
        };
        Ok(LlmResponse { content, end_turn: true, usage: Usage::default() })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn context_window(&self) -> usize {
        100_000
    }

    fn max_image_dimension(&self) -> Option<u32> {
        None
    }
}

fn build_executor(turns: std::collections::VecDeque<ScriptedTurn>) -> Executor {
    let mut actions = ActionRegistry::new();
    let mut functions = FunctionRegistry::new();
    crate::builtin_actions::register_builtin_actions(&mut actions);
    crate::builtin_actions::register_builtin_functions(&mut functions);
    functions.register("noop", Arc::new(Noop));
    actions.register(Action {
        name: "noop".to_string(),
        description: "does nothing".to_string(),
        examples: vec![],
        input_schema: json!({}),
        steps: vec![Step { name: "noop".to_string(), when: None, kind: StepKind::Function { handler: "noop".to_string() } }],
        post_steps: vec![],
    });

    let mut registry = ModelRegistry::new_empty();
    registry.register("scripted", Arc::new(ScriptedService { turns: Mutex::new(turns) }));
    let catalog = ModelCatalog { high: vec![ModelCatalogEntry::new("scripted", "scripted")], medium: vec![], low: vec![] };
    let gateway = Arc::new(Gateway::new(Arc::new(registry), catalog));
    let store = Arc::new(crate::trace::TraceStore::in_memory().unwrap());
    let tracer = crate::trace::Tracer::new(store);
    Executor::new(Arc::new(actions), Arc::new(functions), gateway, tracer)
}

fn arb_plan() -> impl Strategy<Value = (Vec<usize>, bool)> {
    (proptest::collection::vec(1usize..=3, 0..=3), any::<bool>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transcript_matches_system_user_turn_formula((tool_counts, final_is_stop) in arb_plan()) {
        let mut next_id = { let mut n = 0usize; move || { n += 1; format!("call-{n}") } };

        let mut turns = std::collections::VecDeque::new();
        for &m in &tool_counts {
            let calls: Vec<(String, String)> = (0..m).map(|_| (next_id(), "noop".to_string())).collect();
            turns.push_back(ScriptedTurn::Tools(calls));
        }
        if final_is_stop {
            turns.push_back(ScriptedTurn::StopAction(next_id()));
        } else {
            turns.push_back(ScriptedTurn::Final("done".to_string()));
        }

        let mut per_turn_counts = tool_counts.clone();
        per_turn_counts.push(usize::from(final_is_stop));
        let k = per_turn_counts.len() as u32;

        let executor = build_executor(turns);
        let action = Action {
            name: "router".to_string(),
            description: String::new(),
            examples: vec![],
            input_schema: json!({}),
            steps: vec![Step {
                name: "route".to_string(),
                when: None,
                kind: StepKind::Llm {
                    system_prompt: "sys".to_string(),
                    message: "go".to_string(),
                    tier: IntelligenceTier::High,
                    output_schema: None,
                    tool_choice: Some(ToolChoiceConfig {
                        actions: vec!["noop".to_string()],
                        stop_action: "stop_action".to_string(),
                        max_iterations: k,
                        continuation_message: None,
                    }),
                },
            }],
            post_steps: vec![],
        };

        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(executor.execute_root(&action, json!({})));
        prop_assert!(!outcome.is_error(), "unexpected error: {:?}", outcome.error);

        let transcript_value = outcome.result.get("parent_messages").cloned().unwrap_or(serde_json::Value::Null);
        let messages: Vec<TranscriptMessage> = serde_json::from_value(transcript_value).expect("parent_messages round-trips");

        prop_assert_eq!(messages[0].role, TranscriptRole::System);
        prop_assert_eq!(messages[1].role, TranscriptRole::User);

        let mut cursor = 2;
        for &m in &per_turn_counts {
            prop_assert_eq!(messages[cursor].role, TranscriptRole::Assistant);
            prop_assert_eq!(messages[cursor].tool_calls.len(), m);
            cursor += 1;
            for _ in 0..m {
                prop_assert_eq!(messages[cursor].role, TranscriptRole::Tool);
                cursor += 1;
            }
        }
        let expected_len = 2 + per_turn_counts.len() + per_turn_counts.iter().sum::<usize>();
        prop_assert_eq!(messages.len(), expected_len);
        prop_assert_eq!(cursor, messages.len());
        prop_assert!(per_turn_counts.len() as u32 <= k);

        let last_assistant = messages.iter().rev().find(|m| m.role == TranscriptRole::Assistant).unwrap();
        prop_assert!(
            last_assistant.tool_calls.is_empty()
                || (last_assistant.tool_calls.len() == 1 && last_assistant.tool_calls[0].name == "stop_action")
        );

        for msg in &messages {
            if msg.role == TranscriptRole::Tool {
                let id = msg.tool_call_id.clone().unwrap();
                let owner = messages
                    .iter()
                    .find(|m| m.role == TranscriptRole::Assistant && m.tool_calls.iter().any(|c| c.id == id));
                prop_assert!(owner.is_some(), "tool result {id} has no matching assistant tool_call");
            }
        }
    }
}
