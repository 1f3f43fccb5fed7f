//! The Action-Graph Runtime's executor (spec.md §4.1): resolves steps in
//! declared order, runs the tool-call loop, and emits a full trace.

use super::registry::{ActionRegistry, FunctionRegistry};
use super::template;
use super::types::{
    Action, ActionOutcome, FunctionStepOutput, Step, StepContext, StepKind, ToolCall,
    ToolChoiceConfig, TranscriptMessage, TranscriptRole,
};
use crate::error::{ActionError, ErrorKind};
use crate::llm::{ContentBlock, Gateway, LlmMessage, LlmRequest, MessageRole, SystemContent, ToolDefinition};
use crate::trace::{NodeType, Status, Tracer};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct Executor {
    actions: Arc<ActionRegistry>,
    functions: Arc<FunctionRegistry>,
    gateway: Arc<Gateway>,
    tracer: Arc<Tracer>,
}

impl Executor {
    pub fn new(
        actions: Arc<ActionRegistry>,
        functions: Arc<FunctionRegistry>,
        gateway: Arc<Gateway>,
        tracer: Arc<Tracer>,
    ) -> Self {
        Self {
            actions,
            functions,
            gateway,
            tracer,
        }
    }

    /// Run a root action: mints a fresh trace id and delegates to
    /// [`Self::execute_action`].
    pub async fn execute_root(&self, action: &Action, input: Value) -> ActionOutcome {
        let trace_id = Uuid::new_v4().to_string();
        self.execute_action(action, input, trace_id).await
    }

    /// Execute `action` under `trace_id` (spec.md §4.1: `executeAction(action,
    /// input, parentTraceId?) → {result, error?}`; here the caller supplies
    /// the already-composed trace id — root calls mint a fresh uuid via
    /// [`Self::execute_root`], child actions compose `parentId_stepIndex_uuid`
    /// in [`Self::run_tool_loop`]).
    pub async fn execute_action(&self, action: &Action, input: Value, trace_id: String) -> ActionOutcome {
        let span = self.tracer.start(
            trace_id.clone(),
            trace_id.clone(),
            action.name.clone(),
            NodeType::Action,
            Some(input.clone()),
        );

        let mut context = StepContext::from_input(input);
        let mut first_error: Option<ActionError> = None;

        for (idx, step) in action.steps.iter().enumerate() {
            if first_error.is_some() {
                break;
            }
            if let Err(err) = self.run_step(step, idx, &trace_id, &mut context).await {
                first_error = Some(err);
            }
        }

        for (idx, step) in action.post_steps.iter().enumerate() {
            let post_idx = action.steps.len() + idx;
            if let Err(err) = self.run_step(step, post_idx, &trace_id, &mut context).await {
                tracing::warn!(action = %action.name, error = %err.message, "post-step failed, ignoring");
            }
        }

        let result = context.as_json();
        if let Some(err) = &first_error {
            span.finish(Status::Error, None, Some(crate::error::to_json(err.kind, &err.message)));
        } else {
            span.finish(Status::Success, Some(result.clone()), None);
        }

        match first_error {
            Some(err) => ActionOutcome {
                result,
                error: Some(err),
            },
            None => ActionOutcome::ok(result),
        }
    }

    async fn run_step(&self, step: &Step, idx: usize, trace_id: &str, context: &mut StepContext) -> Result<(), ActionError> {
        let step_id = format!("{trace_id}_{idx}");

        if let Some(predicate) = &step.when {
            if !predicate.evaluate(context) {
                let span = self.tracer.start(step_id, trace_id, step.name.clone(), NodeType::Step, None);
                span.finish(Status::Skipped, None, None);
                return Ok(());
            }
        }

        let span = self.tracer.start(step_id.clone(), trace_id, step.name.clone(), NodeType::Step, None);

        let outcome = match &step.kind {
            StepKind::Function { handler } => self.run_function_step(handler, context).await,
            StepKind::Llm {
                system_prompt,
                message,
                tier,
                output_schema,
                tool_choice,
            } => {
                let rendered_system = template::render(system_prompt, context.as_map());
                let rendered_message = template::render(message, context.as_map());
                match tool_choice {
                    Some(config) => {
                        self.run_tool_loop(&step_id, &rendered_system, &rendered_message, *tier, config, context).await
                    }
                    None => {
                        let Some(schema) = output_schema else {
                            return Err(ActionError::new(
                                ErrorKind::SchemaParseFailed,
                                "llm step without tool_choice must declare an output_schema",
                            ));
                        };
                        self.run_llm_step(&step_id, &rendered_system, &rendered_message, *tier, schema).await
                    }
                }
            }
            StepKind::Action { name } => self.run_child_action_step(name, &step_id, context).await,
        };

        match &outcome {
            Ok(result) => span.finish(Status::Success, Some(Value::Object(result.clone())), None),
            Err(err) => span.finish(Status::Error, None, Some(crate::error::to_json(err.kind, &err.message))),
        }

        let result = outcome?;
        context.merge_result(result);
        Ok(())
    }

    async fn run_function_step(&self, handler_name: &str, context: &StepContext) -> Result<Map<String, Value>, ActionError> {
        let handler = self.functions.get(handler_name).ok_or_else(|| {
            ActionError::new(ErrorKind::ModelCallFailed, format!("no function handler registered: {handler_name}"))
        })?;
        let FunctionStepOutput { result, .. } = handler.call(context).await?;
        Ok(result)
    }

    async fn run_llm_step(
        &self,
        step_id: &str,
        system_prompt: &str,
        message: &str,
        tier: crate::llm::IntelligenceTier,
        schema: &Value,
    ) -> Result<Map<String, Value>, ActionError> {
        let llm_span = self.tracer.start(
            format!("{step_id}_llm"),
            step_id.rsplit_once('_').map_or(step_id, |(prefix, _)| prefix),
            "llm-call",
            NodeType::LlmCall,
            Some(Value::String(message.to_string())),
        );

        let request = LlmRequest {
            system: vec![SystemContent::new(system_prompt)],
            messages: vec![LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::text(message)],
            }],
            tools: vec![],
            max_tokens: None,
        };

        let result = self.gateway.complete_schema(request, tier, schema).await;
        match &result {
            Ok(value) => llm_span.finish(Status::Success, Some(value.clone()), None),
            Err(err) => llm_span.finish(Status::Error, None, Some(crate::error::to_json(err.kind, &err.message))),
        }

        match result? {
            Value::Object(map) => Ok(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
        }
    }

    async fn run_child_action_step(&self, name: &str, step_id: &str, context: &StepContext) -> Result<Map<String, Value>, ActionError> {
        let action = self.actions.get(name).ok_or_else(|| {
            ActionError::new(ErrorKind::ModelCallFailed, format!("no action registered: {name}"))
        })?;
        let child_trace_id = format!("{step_id}_{}", Uuid::new_v4());
        let outcome = self.execute_action(&action, context.as_json(), child_trace_id).await;
        match outcome.error {
            Some(err) => Err(err),
            None => match outcome.result {
                Value::Object(map) => Ok(map),
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    Ok(map)
                }
            },
        }
    }

    /// The tool-call loop (spec.md §4.1 "LLM step with tools").
    async fn run_tool_loop(
        &self,
        step_id: &str,
        system_prompt: &str,
        message: &str,
        tier: crate::llm::IntelligenceTier,
        config: &ToolChoiceConfig,
        context: &mut StepContext,
    ) -> Result<Map<String, Value>, ActionError> {
        let mut transcript = vec![TranscriptMessage::system(system_prompt), TranscriptMessage::user(message)];
        let tools = self.advertised_tools(&config.actions, &config.stop_action)?;
        let trace_root = step_id.rsplit_once('_').map_or(step_id, |(prefix, _)| prefix).to_string();

        let outcome = 'turns: {
            for turn in 0..config.max_iterations {
                let request = build_llm_request(&transcript, tools.clone());
                let llm_span = self.tracer.start(
                    format!("{step_id}_llm{turn}"),
                    trace_root.clone(),
                    format!("llm-call-turn-{turn}"),
                    NodeType::LlmCall,
                    None,
                );
                let response = self.gateway.complete(&request, tier).await;
                let response = match response {
                    Ok(r) => {
                        llm_span.finish(Status::Success, Some(Value::String(r.text())), None);
                        r
                    }
                    Err(err) => {
                        llm_span.finish(Status::Error, None, Some(crate::error::to_json(err.kind, &err.message)));
                        break 'turns Err(err);
                    }
                };

                let tool_uses: Vec<ToolCall> = response
                    .tool_uses()
                    .into_iter()
                    .map(|(id, name, input)| ToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: input.clone(),
                    })
                    .collect();

                if tool_uses.is_empty() {
                    let text = response.text();
                    transcript.push(TranscriptMessage::assistant(text.clone(), vec![]));
                    let mut result = Map::new();
                    result.insert("final_content".to_string(), Value::String(text));
                    break 'turns Ok(result);
                }

                transcript.push(TranscriptMessage::assistant(response.text(), tool_uses.clone()));

                let mut stop_result: Option<Map<String, Value>> = None;
                for call in &tool_uses {
                    if call.name == config.stop_action {
                        // spec.md §4.1: stop_action is executed like any other
                        // action, not echoed; its result becomes the step output.
                        match self.run_tool_call_action(step_id, call, context).await {
                            Ok(value) => {
                                transcript.push(TranscriptMessage::tool_result(call.id.clone(), value.to_string()));
                                stop_result = Some(match value {
                                    Value::Object(map) => map,
                                    other => {
                                        let mut map = Map::new();
                                        map.insert("value".to_string(), other);
                                        map
                                    }
                                });
                            }
                            Err(err) => {
                                transcript.push(TranscriptMessage::tool_result(
                                    call.id.clone(),
                                    crate::error::to_json(err.kind, &err.message).to_string(),
                                ));
                                break 'turns Err(err);
                            }
                        }
                        break;
                    }

                    let child_result = self.run_tool_call_action(step_id, call, context).await;
                    let content = match child_result {
                        Ok(value) => value.to_string(),
                        Err(err) => crate::error::to_json(err.kind, &err.message).to_string(),
                    };
                    transcript.push(TranscriptMessage::tool_result(call.id.clone(), content));
                }

                if let Some(result) = stop_result {
                    break 'turns Ok(result);
                }

                if turn + 1 < config.max_iterations {
                    if let Some(continuation) = &config.continuation_message {
                        transcript.push(TranscriptMessage::user(continuation.clone()));
                    }
                }
            }

            // MaxIterations policy decision (spec.md §9 open question): this
            // implementation fails the step with kind MaxIterations rather
            // than forcing a synthetic stop_action call.
            Err(ActionError::max_iterations(step_id, config.max_iterations))
        };

        context.transcript = transcript.clone();
        context.set("parent_messages", serde_json::to_value(&transcript).unwrap_or(Value::Null));

        outcome
    }

    /// Execute one tool call that names a callable Action recursively
    /// (including the loop's `stop_action`). Per spec.md §7/§9: child-action
    /// failures inside a tool-call loop are reported to the model as a
    /// tool-result error, not propagated to abort the step -- except when
    /// the failing call is itself `stop_action`, handled by the caller.
    /// Mints its trace id the same way [`Self::run_child_action_step`] does
    /// (`parentId_stepIndex_uuid`, spec.md §4.3) so it is discovered as a
    /// direct child when the trace tree is assembled.
    async fn run_tool_call_action(&self, step_id: &str, call: &ToolCall, context: &StepContext) -> Result<Value, ActionError> {
        let action = self.actions.get(&call.name).ok_or_else(|| {
            ActionError::new(ErrorKind::ModelCallFailed, format!("no action registered: {}", call.name))
        })?;
        let _ = context;
        let child_trace_id = format!("{step_id}_{}", Uuid::new_v4());
        let outcome = self.execute_action(&action, call.input.clone(), child_trace_id).await;
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(outcome.result),
        }
    }

    /// Build the tool-definition set for a loop turn, always including
    /// `stop_action` (spec.md §4.2: "The `stop_action` MUST be in the
    /// advertised set") as a real callable Action, not a synthetic stub.
    fn advertised_tools(&self, action_names: &[String], stop_action: &str) -> Result<Vec<ToolDefinition>, ActionError> {
        let mut names: Vec<&str> = action_names.iter().map(String::as_str).collect();
        if !names.contains(&stop_action) {
            names.push(stop_action);
        }
        names
            .into_iter()
            .map(|name| {
                self.actions
                    .get(name)
                    .map(|action| ToolDefinition {
                        name: action.name.clone(),
                        description: describe(&action),
                        input_schema: action.input_schema.clone(),
                    })
                    .ok_or_else(|| ActionError::new(ErrorKind::ModelCallFailed, format!("no action registered: {name}")))
            })
            .collect()
    }
}

fn describe(action: &Action) -> String {
    if action.examples.is_empty() {
        action.description.clone()
    } else {
        format!("{}\n\nExamples:\n{}", action.description, action.examples.join("\n"))
    }
}

/// Convert a transcript into an `LlmRequest`, batching consecutive tool
/// results into one user message carrying multiple `ToolResult` blocks
/// (mirrors the provider wire format; see `llm::openai::translate_message`).
fn build_llm_request(transcript: &[TranscriptMessage], tools: Vec<ToolDefinition>) -> LlmRequest {
    let mut system = Vec::new();
    let mut messages = Vec::new();
    let mut pending_tool_blocks: Vec<ContentBlock> = Vec::new();

    for msg in transcript {
        match msg.role {
            TranscriptRole::System => system.push(SystemContent::new(msg.content.clone())),
            TranscriptRole::User => {
                flush_tool_blocks(&mut pending_tool_blocks, &mut messages);
                messages.push(LlmMessage {
                    role: MessageRole::User,
                    content: vec![ContentBlock::text(msg.content.clone())],
                });
            }
            TranscriptRole::Assistant => {
                flush_tool_blocks(&mut pending_tool_blocks, &mut messages);
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(ContentBlock::text(msg.content.clone()));
                }
                for call in &msg.tool_calls {
                    content.push(ContentBlock::tool_use(call.id.clone(), call.name.clone(), call.input.clone()));
                }
                messages.push(LlmMessage {
                    role: MessageRole::Assistant,
                    content,
                });
            }
            TranscriptRole::Tool => {
                let tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                pending_tool_blocks.push(ContentBlock::tool_result(tool_call_id, msg.content.clone(), false));
            }
        }
    }
    flush_tool_blocks(&mut pending_tool_blocks, &mut messages);

    LlmRequest {
        system,
        messages,
        tools,
        max_tokens: None,
    }
}

fn flush_tool_blocks(pending: &mut Vec<ContentBlock>, messages: &mut Vec<LlmMessage>) {
    if !pending.is_empty() {
        messages.push(LlmMessage {
            role: MessageRole::User,
            content: std::mem::take(pending),
        });
    }
}
