//! Process configuration, assembled from environment variables the way the
//! teacher's `LlmConfig::from_env()` assembles LLM provider config.

use crate::llm::LlmConfig;

/// Default byte budget for cleaned HTML output (spec.md §4.4).
pub const DEFAULT_MAX_HTML_BYTES: usize = 50_000;
/// Default target size that triggers hierarchical truncation (phase 11).
pub const DEFAULT_DOM_TARGET_SIZE: usize = 45_000;
/// Root traces retained before the oldest are cascade-deleted (spec.md §4.3).
pub const DEFAULT_MAX_ROOT_TRACES: usize = 100;
/// Serialized trace events larger than this are dropped and counted.
pub const DEFAULT_TRACE_EVENT_MAX_BYTES: usize = 1_000_000;
/// Stats counters are pruned past this many entries per (key, counter).
pub const DEFAULT_STATS_MAX_ENTRIES: usize = 10_000;
/// Stats counters drop entries older than this many days.
pub const DEFAULT_STATS_RETENTION_DAYS: i64 = 30;

/// Process-wide configuration. Constructed once at startup and passed down
/// as an explicit collaborator (spec.md §9: "specify them as explicit
/// collaborators passed into the runtime, not ambient globals").
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub max_root_traces: usize,
    pub trace_event_max_bytes: usize,
    pub dom_max_html_bytes: usize,
    pub dom_target_size: usize,
    pub stats_max_entries: usize,
    pub stats_retention_days: i64,
    pub db_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            llm: LlmConfig::from_env(),
            max_root_traces: env_usize("AGENT_MAX_ROOT_TRACES", DEFAULT_MAX_ROOT_TRACES),
            trace_event_max_bytes: env_usize(
                "AGENT_TRACE_EVENT_MAX_BYTES",
                DEFAULT_TRACE_EVENT_MAX_BYTES,
            ),
            dom_max_html_bytes: env_usize("AGENT_DOM_MAX_BYTES", DEFAULT_MAX_HTML_BYTES),
            dom_target_size: env_usize("AGENT_DOM_TARGET_SIZE", DEFAULT_DOM_TARGET_SIZE),
            stats_max_entries: env_usize("AGENT_STATS_MAX_ENTRIES", DEFAULT_STATS_MAX_ENTRIES),
            stats_retention_days: DEFAULT_STATS_RETENTION_DAYS,
            db_path: std::env::var("AGENT_DB_PATH").unwrap_or_else(|_| "agent.sqlite3".to_string()),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
