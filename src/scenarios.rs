//! Cross-module scenario tests (spec.md §8): each one exercises several
//! components together the way a real run would, rather than one function
//! in isolation. Kept in their own file since none of them belongs to a
//! single module's own test suite.

#![cfg(test)]

use crate::action::{Action, ActionRegistry, Executor, FunctionHandler, FunctionRegistry, FunctionStepOutput, Step, StepContext, StepKind, ToolChoiceConfig};
use crate::browser::wire::{ClickElementResult, ClickModifiers, ContentScriptRequest};
use crate::browser::{Bridge, NavigationStatus, PageHandle};
use crate::dom::{clean, CleanConfig, ContentMode};
use crate::error::{ActionError, BridgeError, ErrorKind};
use crate::llm::{
    ContentBlock, Gateway, IntelligenceTier, LlmError, LlmMessage, LlmRequest, LlmResponse, LlmService, MessageRole, ModelCatalog, ModelCatalogEntry,
    ModelRegistry, SystemContent, Usage,
};
use crate::trace::{NodeType, Tracer, TraceStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// An [`LlmService`] that always returns the same canned text, ignoring the
/// request. Good enough for a model that never calls a tool.
struct FixedTextService {
    model_id: String,
    text: String,
}

#[async_trait]
impl LlmService for FixedTextService {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            content: vec![ContentBlock::text(self.text.clone())],
            end_turn: true,
            usage: Usage::default(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        100_000
    }

    fn max_image_dimension(&self) -> Option<u32> {
        None
    }
}

fn tracer_and_store() -> (Arc<Tracer>, Arc<TraceStore>) {
    let store = Arc::new(TraceStore::in_memory().unwrap());
    (Tracer::new(store.clone()), store)
}

/// Scenario 1: pure knowledge routing. A single LLM step with an empty
/// tool-call loop (so `stop_action` is the only advertised tool) gets back
/// plain text on its first turn and ends the loop immediately.
#[tokio::test]
async fn pure_knowledge_routing_ends_loop_on_first_text_turn() {
    let mut registry = ModelRegistry::new_empty();
    registry.register(
        "fake-knowledge-model",
        Arc::new(FixedTextService {
            model_id: "fake-knowledge-model".to_string(),
            text: "The capital of France is Paris.".to_string(),
        }),
    );
    let catalog = ModelCatalog {
        high: vec![ModelCatalogEntry::new("fake-knowledge-model", "fake-knowledge-model")],
        medium: vec![],
        low: vec![],
    };
    let gateway = Arc::new(Gateway::new(Arc::new(registry), catalog));

    let (tracer, store) = tracer_and_store();
    let mut actions = ActionRegistry::new();
    let mut functions = FunctionRegistry::new();
    crate::builtin_actions::register_builtin_actions(&mut actions);
    crate::builtin_actions::register_builtin_functions(&mut functions);
    let executor = Executor::new(Arc::new(actions), Arc::new(functions), gateway, tracer);

    let action = Action {
        name: "answer_question".to_string(),
        description: "Answer a geography question.".to_string(),
        examples: vec![],
        input_schema: json!({}),
        steps: vec![Step {
            name: "ask".to_string(),
            when: None,
            kind: StepKind::Llm {
                system_prompt: "You answer geography questions.".to_string(),
                message: "What is the capital of France?".to_string(),
                tier: IntelligenceTier::High,
                output_schema: None,
                tool_choice: Some(ToolChoiceConfig {
                    actions: vec![],
                    stop_action: "stop_action".to_string(),
                    max_iterations: 3,
                    continuation_message: None,
                }),
            },
        }],
        post_steps: vec![],
    };

    let trace_id = "trace-knowledge-routing".to_string();
    let outcome = executor.execute_action(&action, json!({}), trace_id.clone()).await;
    assert!(!outcome.is_error());
    let answer = outcome.result.get("final_content").and_then(Value::as_str).unwrap_or_default();
    assert!(answer.contains("Paris"));

    // root -> step -> llm-call-turn-0: depth 3.
    let tree = store.tree(&trace_id).unwrap().expect("trace recorded");
    assert_eq!(tree.node_type, NodeType::Action);
    let step = tree.children.first().expect("step node recorded");
    assert_eq!(step.node_type, NodeType::Step);
    let llm_call = step.children.first().expect("llm-call node recorded");
    assert_eq!(llm_call.node_type, NodeType::LlmCall);
}

struct FakeStaticPage {
    url: String,
}

#[async_trait]
impl PageHandle for FakeStaticPage {
    async fn current_url(&self) -> Result<String, BridgeError> {
        Ok(self.url.clone())
    }

    async fn activate(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn dispatch(&self, request: &ContentScriptRequest) -> Result<Value, BridgeError> {
        match request {
            ContentScriptRequest::ClickElement { element_id, .. } if *element_id == 0 => {
                Ok(json!({"success": true, "message": "clicked element 0"}))
            }
            _ => Ok(json!({"success": false, "message": "unhandled"})),
        }
    }

    async fn inject_content_script(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn wait_for_complete(&self, _timeout: Duration) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn recent_network_error(&self) -> Option<String> {
        None
    }
}

/// Scenario 2: read a page with a single `<a>Sign in</a>` link (`data-vish-id
/// ="0"`) and click it; the content script receives the click and reports
/// success.
#[tokio::test]
async fn click_element_reaches_the_tagged_sign_in_link() {
    let html = r#"<html><body><a data-vish-id="0" href="/signin">Sign in</a></body></html>"#;
    let cleaned = clean(html, &CleanConfig::default());
    assert_eq!(cleaned.mode, ContentMode::Html);
    assert!(cleaned.content.contains(r#"data-vish-id="0""#));
    assert!(cleaned.content.contains("Sign in"));

    let bridge = Bridge::new();
    let page = Arc::new(FakeStaticPage {
        url: "https://example.com/login".to_string(),
    });
    bridge.register_tab("tab-1", page.clone()).await;

    let result = bridge
        .send(
            "tab-1",
            &ContentScriptRequest::ClickElement {
                element_id: 0,
                modifiers: Some(ClickModifiers::default()),
            },
        )
        .await
        .unwrap();

    let click: ClickElementResult = serde_json::from_value(result).unwrap();
    assert!(click.success);
}

struct NavigatingPage {
    url: tokio::sync::RwLock<String>,
    target: String,
}

#[async_trait]
impl PageHandle for NavigatingPage {
    async fn current_url(&self) -> Result<String, BridgeError> {
        Ok(self.url.read().await.clone())
    }

    async fn activate(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn dispatch(&self, _request: &ContentScriptRequest) -> Result<Value, BridgeError> {
        *self.url.write().await = self.target.clone();
        Ok(json!({"success": true}))
    }

    async fn inject_content_script(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn wait_for_complete(&self, _timeout: Duration) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn recent_network_error(&self) -> Option<String> {
        None
    }
}

/// Scenario 3: a click mid-action triggers navigation. The bridge detects
/// the URL change, waits for load, and the tab's navigation status reports
/// `canGoBack=true` afterwards.
#[tokio::test]
async fn navigation_mid_action_advances_history_and_reports_can_go_back() {
    let bridge = Bridge::new();
    let page = Arc::new(NavigatingPage {
        url: tokio::sync::RwLock::new("https://example.com/article".to_string()),
        target: "https://example.com/article/page-2".to_string(),
    });
    bridge.register_tab("tab-1", page).await;

    let before = bridge.navigation_status("tab-1").await.unwrap();
    assert!(!before.can_go_back);

    let outcome = bridge.send_with_navigation_detection("tab-1", &ContentScriptRequest::ExtractContent).await.unwrap();
    assert!(outcome.navigated);
    assert_eq!(outcome.new_url.as_deref(), Some("https://example.com/article/page-2"));

    let status: NavigationStatus = bridge.navigation_status("tab-1").await.unwrap();
    assert!(status.can_go_back);
    assert_eq!(status.current_url.as_deref(), Some("https://example.com/article/page-2"));
}

/// A service that always returns prose instead of the JSON the schema step
/// asked for.
struct SchemaInvalidService {
    model_id: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmService for SchemaInvalidService {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse {
            content: vec![ContentBlock::text("I'm not sure, let me think about that.")],
            end_turn: true,
            usage: Usage::default(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        100_000
    }

    fn max_image_dimension(&self) -> Option<u32> {
        None
    }
}

/// Scenario 4: the first model in the tier returns schema-invalid text; the
/// gateway moves on to the second model, which returns valid JSON.
#[tokio::test]
async fn model_cascade_recovers_from_a_schema_invalid_first_model() {
    let mut registry = ModelRegistry::new_empty();
    let first_calls = Arc::new(AtomicUsize::new(0));
    registry.register(
        "model-a",
        Arc::new(SchemaInvalidService {
            model_id: "model-a".to_string(),
            calls: first_calls.clone(),
        }),
    );
    registry.register(
        "model-b",
        Arc::new(FixedTextService {
            model_id: "model-b".to_string(),
            text: json!({"answer": 42}).to_string(),
        }),
    );

    let catalog = ModelCatalog {
        high: vec![ModelCatalogEntry::new("model-a", "model-a"), ModelCatalogEntry::new("model-b", "model-b")],
        medium: vec![],
        low: vec![],
    };
    let gateway = Gateway::new(Arc::new(registry), catalog);

    let request = LlmRequest {
        system: vec![SystemContent::new("answer with json")],
        messages: vec![LlmMessage {
            role: MessageRole::User,
            content: vec![ContentBlock::text("what is the answer?")],
        }],
        tools: vec![],
        max_tokens: None,
    };

    let schema = json!({"type": "object", "properties": {"answer": {"type": "number"}}, "required": ["answer"]});
    let result = gateway.complete_schema(request, IntelligenceTier::High, &schema).await.unwrap();
    assert_eq!(result.get("answer"), Some(&json!(42)));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
}

/// Scenario 6: restricted URLs are refused before any dispatch is attempted.
#[tokio::test]
async fn restricted_url_refused_before_any_send() {
    struct Untouchable {
        dispatched: AtomicUsize,
    }

    #[async_trait]
    impl PageHandle for Untouchable {
        async fn current_url(&self) -> Result<String, BridgeError> {
            Ok("chrome://settings/privacy".to_string())
        }
        async fn activate(&self) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn dispatch(&self, _request: &ContentScriptRequest) -> Result<Value, BridgeError> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            Ok(json!({}))
        }
        async fn inject_content_script(&self) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn wait_for_complete(&self, _timeout: Duration) -> Result<(), BridgeError> {
            Ok(())
        }
        async fn recent_network_error(&self) -> Option<String> {
            None
        }
    }

    let bridge = Bridge::new();
    let page = Arc::new(Untouchable { dispatched: AtomicUsize::new(0) });
    bridge.register_tab("tab-1", page.clone()).await;

    let err = bridge.send("tab-1", &ContentScriptRequest::ExtractContent).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Restricted);
    assert_eq!(page.dispatched.load(Ordering::SeqCst), 0);
}

/// A plain function-step action, used to sanity-check that the executor's
/// context merging survives a round trip through a child action call.
struct MultiplyByTwo;

#[async_trait]
impl FunctionHandler for MultiplyByTwo {
    async fn call(&self, context: &StepContext) -> Result<FunctionStepOutput, ActionError> {
        let n = context.get("n").and_then(Value::as_i64).unwrap_or(0);
        let mut result = serde_json::Map::new();
        result.insert("doubled".to_string(), json!(n * 2));
        Ok(FunctionStepOutput::new(result))
    }
}

#[tokio::test]
async fn child_action_step_merges_result_into_parent_context() {
    let mut functions = FunctionRegistry::new();
    functions.register("double", Arc::new(MultiplyByTwo));

    let mut actions = ActionRegistry::new();
    actions.register(Action {
        name: "double_it".to_string(),
        description: String::new(),
        examples: vec![],
        input_schema: json!({}),
        steps: vec![Step {
            name: "double".to_string(),
            when: None,
            kind: StepKind::Function { handler: "double".to_string() },
        }],
        post_steps: vec![],
    });
    actions.register(Action {
        name: "parent".to_string(),
        description: String::new(),
        examples: vec![],
        input_schema: json!({}),
        steps: vec![Step {
            name: "call_double".to_string(),
            when: None,
            kind: StepKind::Action { name: "double_it".to_string() },
        }],
        post_steps: vec![],
    });

    let parent_action = actions.get("parent").expect("parent action registered");

    let (tracer, _store) = tracer_and_store();
    let registry = Arc::new(ModelRegistry::new_empty());
    let gateway = Arc::new(Gateway::new(registry, ModelCatalog::default_catalog()));
    let executor = Executor::new(Arc::new(actions), Arc::new(functions), gateway, tracer);

    let outcome = executor.execute_root(&parent_action, json!({"n": 5})).await;
    assert!(!outcome.is_error());
    assert_eq!(outcome.result.get("doubled"), Some(&json!(10)));
}
