//! Tab registry and alias allocation (spec.md §4.5 "Alias allocation", §3
//! "Tab"). Aliases (`t1`, `t2`, …) are minted once per tab id and never
//! reused, even after the tab is removed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::history::History;
use crate::error::{BridgeError, ErrorKind};

/// One managed tab: CDP target id, alias, and accumulated content state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tab {
    pub tab_id: String,
    pub alias: String,
    pub window_id: Option<String>,
    pub last_visited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub history: History,
    pub content: TabContent,
    /// Set before the bridge activates a tab it didn't last activate; used
    /// to decide whether to re-activate + wait.
    pub last_activated_by_us: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabContent {
    pub raw: Option<String>,
    pub cleaned: Option<String>,
    pub summary: Option<String>,
}

impl Tab {
    fn new(tab_id: String, alias: String) -> Self {
        Self {
            tab_id,
            alias,
            window_id: None,
            last_visited_at: None,
            history: History::new(),
            content: TabContent::default(),
            last_activated_by_us: false,
        }
    }
}

/// A point-in-time, restorable copy of a [`TabRegistry`]'s state (spec.md
/// §9 "Shared-resource policy": writes are debounced to session storage).
/// The tab-id/alias maps aren't carried directly -- they're rebuilt from
/// `tabs` on restore, since each [`Tab`] already names its own id and alias.
#[derive(Debug, Serialize, Deserialize)]
pub struct TabRegistrySnapshot {
    pub alias_counter: u64,
    pub tabs: Vec<Tab>,
}

/// Process-wide singleton mapping tab ids to aliases and vice versa
/// (spec.md §9: "specify them as explicit collaborators passed into the
/// runtime, not ambient globals" — this struct is the collaborator, owned
/// by whatever constructs the bridge).
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: HashMap<String, Tab>,
    alias_counter: u64,
    tab_id_to_alias: HashMap<String, String>,
    alias_to_tab_id: HashMap<String, String>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a previously saved [`TabRegistrySnapshot`]
    /// (spec.md §9).
    pub fn from_snapshot(snapshot: TabRegistrySnapshot) -> Self {
        let mut registry = Self {
            alias_counter: snapshot.alias_counter,
            ..Self::default()
        };
        for tab in snapshot.tabs {
            registry.tab_id_to_alias.insert(tab.tab_id.clone(), tab.alias.clone());
            registry.alias_to_tab_id.insert(tab.alias.clone(), tab.tab_id.clone());
            registry.tabs.insert(tab.tab_id.clone(), tab);
        }
        registry
    }

    /// Snapshot the current state for persistence.
    pub fn snapshot(&self) -> TabRegistrySnapshot {
        TabRegistrySnapshot {
            alias_counter: self.alias_counter,
            tabs: self.tabs.values().cloned().collect(),
        }
    }

    /// Return the tab's alias, minting one (`t{n}`) the first time this
    /// `tab_id` is seen. The counter never rewinds, even if the tab is
    /// later removed (spec.md §3: "removing a tab purges its entry but
    /// does not free its alias").
    pub fn alias_for(&mut self, tab_id: &str) -> String {
        if let Some(alias) = self.tab_id_to_alias.get(tab_id) {
            return alias.clone();
        }
        self.alias_counter += 1;
        let alias = format!("t{}", self.alias_counter);
        self.tab_id_to_alias.insert(tab_id.to_string(), alias.clone());
        self.alias_to_tab_id.insert(alias.clone(), tab_id.to_string());
        self.tabs.insert(tab_id.to_string(), Tab::new(tab_id.to_string(), alias.clone()));
        alias
    }

    /// `resolveTabId(value)` (spec.md §4.5): numeric -> itself, alias ->
    /// mapped id, numeric string -> parsed, else `InvalidTab`.
    pub fn resolve_tab_id(&self, value: &str) -> Result<String, BridgeError> {
        if let Some(tab_id) = self.alias_to_tab_id.get(value) {
            if self.tabs.contains_key(tab_id) {
                return Ok(tab_id.clone());
            }
        } else if self.tabs.contains_key(value) {
            return Ok(value.to_string());
        }
        Err(BridgeError::new(ErrorKind::InvalidTab, format!("no tab for '{value}'")))
    }

    pub fn get(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.get(tab_id)
    }

    pub fn get_mut(&mut self, tab_id: &str) -> Option<&mut Tab> {
        self.tabs.get_mut(tab_id)
    }

    /// Purge a tab's entry without freeing its alias.
    pub fn remove(&mut self, tab_id: &str) {
        self.tabs.remove(tab_id);
    }

    pub fn alias_of(&self, tab_id: &str) -> Option<&str> {
        self.tab_id_to_alias.get(tab_id).map(String::as_str)
    }

    pub fn is_live(&self, tab_id: &str) -> bool {
        self.tabs.contains_key(tab_id)
    }
}
