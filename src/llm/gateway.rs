//! The LLM Gateway (spec.md §4.2): turns `(messages, intelligence, schema,
//! tool_choice)` into either a parsed JSON object or a `{content,
//! tool_calls}` assistant message, cascading across a configured model
//! catalog with circuit-breaker skip logic.

use super::catalog::{IntelligenceTier, ModelCatalog, ModelCatalogEntry};
use super::circuit_breaker::CircuitBreaker;
use super::registry::ModelRegistry;
use super::schema;
use super::types::{LlmRequest, LlmResponse};
use crate::error::{ActionError, ErrorKind};
use std::sync::Arc;

pub struct Gateway {
    registry: Arc<ModelRegistry>,
    catalog: ModelCatalog,
    breaker: CircuitBreaker,
}

impl Gateway {
    pub fn new(registry: Arc<ModelRegistry>, catalog: ModelCatalog) -> Self {
        Self {
            registry,
            catalog,
            breaker: CircuitBreaker::new(),
        }
    }

    /// Cascading selection across the requested tier and the two tiers
    /// below it (spec.md §4.2: "enumerate models at L, then L+1, then L+2").
    fn candidates(&self, tier: IntelligenceTier) -> Vec<&ModelCatalogEntry> {
        let mut tiers = vec![tier];
        let mut cur = tier;
        while let Some(next) = cur.lower() {
            tiers.push(next);
            cur = next;
        }
        tiers.into_iter().flat_map(|t| self.catalog.tier(t)).collect()
    }

    fn breaker_key(entry: &ModelCatalogEntry) -> String {
        format!(
            "{}::{}::{}",
            entry.endpoint,
            entry.model,
            entry.provider_hint.as_deref().unwrap_or("")
        )
    }

    /// Raw completion: try each candidate in cascade order, honoring
    /// `noToolChoice`/`noToolUse` and the circuit breaker, until one
    /// succeeds or the cascade is exhausted.
    pub async fn complete(
        &self,
        request: &LlmRequest,
        tier: IntelligenceTier,
    ) -> Result<LlmResponse, ActionError> {
        let wants_tools = !request.tools.is_empty();
        let mut last_error: Option<String> = None;
        let mut attempted_any = false;

        for entry in self.candidates(tier) {
            if wants_tools && entry.no_tool_use {
                continue;
            }
            let key = Self::breaker_key(entry);
            if self.breaker.should_skip(&key) {
                continue;
            }
            let Some(service) = self.registry.get(&entry.model) else {
                continue;
            };
            attempted_any = true;
            match service.complete(request).await {
                Ok(response) => {
                    self.breaker.record_success(&key);
                    return Ok(response);
                }
                Err(err) => {
                    self.breaker.record_error(&key);
                    last_error = Some(err.message);
                }
            }
        }

        if !attempted_any {
            return Err(ActionError::new(
                ErrorKind::AllModelsFailed,
                "no candidate models are registered for the requested intelligence tier",
            ));
        }
        Err(ActionError::new(
            ErrorKind::AllModelsFailed,
            last_error.unwrap_or_else(|| "all candidate models failed".to_string()),
        ))
    }

    /// Schema-constrained completion for an LLM step without tools (spec.md
    /// §4.1 "LLM step without tools"): appends a schema hint to the last
    /// user message, then extracts and parses the JSON response. Unlike
    /// [`Self::complete`], a schema-invalid response is itself treated as a
    /// cascade-worthy failure: the gateway moves on to the next candidate
    /// model rather than surfacing the parse error immediately (spec.md §8
    /// "Model cascade").
    pub async fn complete_schema(
        &self,
        mut request: LlmRequest,
        tier: IntelligenceTier,
        output_schema: &serde_json::Value,
    ) -> Result<serde_json::Value, ActionError> {
        if let Some(last_user) = request
            .messages
            .iter_mut()
            .rev()
            .find(|m| matches!(m.role, super::types::MessageRole::User))
        {
            for block in &mut last_user.content {
                if let super::types::ContentBlock::Text { text } = block {
                    *text = schema::schema_hint(text, output_schema);
                    break;
                }
            }
        }

        let mut last_error: Option<String> = None;
        let mut attempted_any = false;

        for entry in self.candidates(tier) {
            let key = Self::breaker_key(entry);
            if self.breaker.should_skip(&key) {
                continue;
            }
            let Some(service) = self.registry.get(&entry.model) else {
                continue;
            };
            attempted_any = true;

            let response = match service.complete(&request).await {
                Ok(r) => r,
                Err(err) => {
                    self.breaker.record_error(&key);
                    last_error = Some(err.message);
                    continue;
                }
            };

            let text = response.text();
            if text.trim().is_empty() {
                self.breaker.record_error(&key);
                last_error = Some("model returned an empty response".to_string());
                continue;
            }

            match schema::extract_json(&text) {
                Some(value) => {
                    self.breaker.record_success(&key);
                    return Ok(value);
                }
                None => {
                    self.breaker.record_error(&key);
                    last_error = Some("model response did not contain a parseable JSON object".to_string());
                }
            }
        }

        if !attempted_any {
            return Err(ActionError::new(
                ErrorKind::AllModelsFailed,
                "no candidate models are registered for the requested intelligence tier",
            ));
        }
        Err(ActionError::new(
            ErrorKind::SchemaParseFailed,
            last_error.unwrap_or_else(|| "all candidate models failed schema validation".to_string()),
        ))
    }

}
