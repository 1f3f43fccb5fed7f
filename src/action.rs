//! The Action-Graph Runtime (spec.md §4.1): declarative multi-step
//! programs with context propagation, template resolution, multi-turn
//! tool-call loops, cascading LLM fallback, and full tracing.

mod executor;
#[cfg(test)]
mod proptests;
mod registry;
mod template;
mod types;

pub use executor::Executor;
pub use registry::{ActionRegistry, FunctionHandler, FunctionRegistry};
pub use types::{
    Action, ActionOutcome, FunctionStepOutput, Step, StepContext, StepKind, ToolCall,
    ToolChoiceConfig, TranscriptMessage, TranscriptRole, WhenPredicate,
};
