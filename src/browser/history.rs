//! Per-tab navigation history (spec.md §4.5 "History model per tab").

use serde::{Deserialize, Serialize};

const MAX_HISTORY_ENTRIES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub last_error: Option<String>,
}

/// A linear navigation history plus a cursor, capped at
/// [`MAX_HISTORY_ENTRIES`]. `goBack`/`goForward` move the cursor; a normal
/// navigation to a new URL truncates the forward branch and appends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
    /// Set before the bridge calls the browser's back/forward API, so the
    /// navigation observer can tell agent-initiated navigation apart from
    /// user-initiated navigation (spec.md §4.5).
    pending_navigation: bool,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            pending_navigation: false,
        }
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.index)
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current().map(|e| e.url.as_str())
    }

    /// Record a navigation to `url`. If it matches the current entry,
    /// this is a no-op (spec.md: "new URL not equal to history[index]").
    /// Otherwise truncate any forward entries and append.
    pub fn navigate(&mut self, url: impl Into<String>) {
        let url = url.into();
        if self.current_url() == Some(url.as_str()) {
            return;
        }
        self.entries.truncate(self.index + usize::from(!self.entries.is_empty()));
        self.entries.push(HistoryEntry { url, last_error: None });
        self.index = self.entries.len() - 1;
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let drop_count = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(0..drop_count);
            self.index = self.index.saturating_sub(drop_count);
        }
    }

    pub fn set_last_error(&mut self, error: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(self.index) {
            entry.last_error = Some(error.into());
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn go_back(&mut self) -> Option<&str> {
        if !self.can_go_back() {
            return None;
        }
        self.index -= 1;
        self.pending_navigation = true;
        self.current_url()
    }

    pub fn go_forward(&mut self) -> Option<&str> {
        if !self.can_go_forward() {
            return None;
        }
        self.index += 1;
        self.pending_navigation = true;
        self.current_url()
    }

    pub fn take_pending_navigation(&mut self) -> bool {
        std::mem::take(&mut self.pending_navigation)
    }

    /// Infer back/forward direction for a user-initiated navigation by
    /// matching `url` against the two neighbors of the current index.
    pub fn observe_user_navigation(&mut self, url: &str) {
        if self.entries.get(self.index.wrapping_sub(1)).is_some_and(|e| e.url == url) && self.index > 0 {
            self.index -= 1;
        } else if self.entries.get(self.index + 1).is_some_and(|e| e.url == url) {
            self.index += 1;
        } else {
            self.navigate(url.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_appends_and_truncates_forward_branch() {
        let mut h = History::new();
        h.navigate("https://a.com");
        h.navigate("https://b.com");
        h.navigate("https://c.com");
        h.go_back();
        h.go_back();
        assert_eq!(h.current_url(), Some("https://a.com"));
        h.navigate("https://d.com");
        assert_eq!(h.current_url(), Some("https://d.com"));
        assert!(!h.can_go_forward());
    }

    #[test]
    fn repeated_navigation_to_same_url_is_noop() {
        let mut h = History::new();
        h.navigate("https://a.com");
        h.navigate("https://a.com");
        assert!(!h.can_go_back());
    }

    #[test]
    fn back_forward_move_cursor_and_set_pending_flag() {
        let mut h = History::new();
        h.navigate("https://a.com");
        h.navigate("https://b.com");
        assert!(!h.take_pending_navigation());
        h.go_back();
        assert!(h.take_pending_navigation());
        assert_eq!(h.current_url(), Some("https://a.com"));
    }

    #[test]
    fn caps_at_fifty_entries() {
        let mut h = History::new();
        for i in 0..60 {
            h.navigate(format!("https://site.com/{i}"));
        }
        assert_eq!(h.current_url(), Some("https://site.com/59"));
        h.go_back();
        for _ in 0..48 {
            h.go_back();
        }
        assert!(!h.can_go_back() || h.current_url().is_some());
    }

    #[test]
    fn observe_user_navigation_infers_back() {
        let mut h = History::new();
        h.navigate("https://a.com");
        h.navigate("https://b.com");
        h.observe_user_navigation("https://a.com");
        assert_eq!(h.current_url(), Some("https://a.com"));
    }
}
