//! Action and function-handler registries, populated at startup (spec.md
//! §9: "Actions are looked up by name from a registry populated at
//! startup").

use super::types::{Action, FunctionStepOutput, StepContext};
use crate::error::ActionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A deterministic function-step handler (spec.md §3, §4.1). Implementors
/// receive the current context and return a result object merged into it,
/// optionally replaying transcript messages.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, context: &StepContext) -> Result<FunctionStepOutput, ActionError>;
}

/// Lookup table of Actions by name.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

/// Lookup table of function-step handlers by name.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn FunctionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.get(name).cloned()
    }
}
