//! Model catalog: the data-driven shape spec.md §6 calls for ("this is
//! configuration, not code"). Per intelligence tier, an ordered list of
//! `[endpoint, model, providerHint?, noToolChoice?, noToolUse?]` tuples.
//!
//! When no catalog file is configured, [`ModelCatalog::default_catalog`]
//! buckets the teacher's compiled [`super::all_models`] table into tiers, so
//! the gateway always has something to cascade through.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Intelligence tier a step requests (spec.md §4.1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntelligenceTier {
    High,
    Medium,
    Low,
}

impl IntelligenceTier {
    /// The next (lower, cheaper) tier, or `None` past `Low`.
    pub fn lower(self) -> Option<Self> {
        match self {
            IntelligenceTier::High => Some(IntelligenceTier::Medium),
            IntelligenceTier::Medium => Some(IntelligenceTier::Low),
            IntelligenceTier::Low => None,
        }
    }
}

/// One entry in the catalog: `[endpoint, model, providerHint?, noToolChoice?, noToolUse?]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    /// The LLM Gateway endpoint/registry key (here, a `ModelRegistry` id).
    pub endpoint: String,
    /// Model id passed through to the provider.
    pub model: String,
    #[serde(default)]
    pub provider_hint: Option<String>,
    /// Skip this candidate for calls that require tool_choice.
    #[serde(default)]
    pub no_tool_choice: bool,
    /// Skip this candidate for calls that require tool use at all.
    #[serde(default)]
    pub no_tool_use: bool,
}

impl ModelCatalogEntry {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            provider_hint: None,
            no_tool_choice: false,
            no_tool_use: false,
        }
    }
}

/// Per-tier ordered model lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default)]
    pub high: Vec<ModelCatalogEntry>,
    #[serde(default)]
    pub medium: Vec<ModelCatalogEntry>,
    #[serde(default)]
    pub low: Vec<ModelCatalogEntry>,
}

impl ModelCatalog {
    pub fn tier(&self, tier: IntelligenceTier) -> &[ModelCatalogEntry] {
        match tier {
            IntelligenceTier::High => &self.high,
            IntelligenceTier::Medium => &self.medium,
            IntelligenceTier::Low => &self.low,
        }
    }

    /// Load from an `llm_models.json`-shaped file (spec.md §6).
    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&text)?;
        Ok(catalog)
    }

    /// Fallback catalog built from the compiled model table, used when no
    /// `llm_models.json` is present on disk.
    pub fn default_catalog() -> Self {
        Self {
            high: vec![
                ModelCatalogEntry::new("claude-4.5-opus", "claude-4.5-opus"),
                ModelCatalogEntry::new("gemini-3-pro", "gemini-3-pro"),
                ModelCatalogEntry::new("gpt-5.2-codex", "gpt-5.2-codex"),
            ],
            medium: vec![
                ModelCatalogEntry::new("claude-4.5-sonnet", "claude-4.5-sonnet"),
                ModelCatalogEntry::new("claude-3.5-sonnet", "claude-3.5-sonnet"),
                ModelCatalogEntry::new("glm-4p6-fireworks", "glm-4p6-fireworks"),
            ],
            low: vec![
                ModelCatalogEntry::new("claude-4.5-haiku", "claude-4.5-haiku"),
                ModelCatalogEntry::new("gemini-3-flash", "gemini-3-flash"),
                ModelCatalogEntry::new("qwen3-coder-fireworks", "qwen3-coder-fireworks"),
            ],
        }
    }
}
