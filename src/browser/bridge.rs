//! Content-script RPC bridge (spec.md §4.5 "Bridge send protocol").
//!
//! [`PageHandle`] is the seam between the protocol (resolve, activate,
//! restricted-URL check, send, inject-and-retry, error classification) and
//! the concrete browser driver. [`ChromiumPage`] implements it over
//! `chromiumoxide`; tests use a scriptable fake so the protocol itself is
//! exercised without a running browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::session_store::SessionStore;
use super::tab::TabRegistry;
use super::wire::ContentScriptRequest;
use crate::error::{BridgeError, ErrorKind};

const ACTIVATE_SETTLE: Duration = Duration::from_millis(50);
const NAV_POLL_FIRST: Duration = Duration::from_millis(100);
const NAV_POLL_SECOND: Duration = Duration::from_millis(400);
const NAV_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const RECENT_NETWORK_ERROR_WINDOW: Duration = Duration::from_secs(30);

/// Coalesce window for the tab registry's debounced persist (spec.md §9
/// "Shared-resource policy"): a burst of writes produces one save, issued
/// once 500 ms pass with no further write.
const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

const RESTRICTED_PREFIXES: &[&str] = &["chrome://", "chrome-extension://", "edge://", "devtools://", "about:", "view-source:"];
const RESTRICTED_HOSTS: &[&str] = &["chrome.google.com/webstore", "chromewebstore.google.com", "microsoftedge.microsoft.com/addons"];

const BROWSER_ERROR_PATTERNS: &[&str] = &["ERR_CERT", "ERR_SSL", "ERR_CONNECTION", "ERR_NAME_NOT_RESOLVED", "ERR_NAME_"];
const NO_RECEIVER_PATTERNS: &[&str] = &["Could not establish connection", "Receiving end does not exist"];

pub fn is_restricted_url(url: &str) -> bool {
    RESTRICTED_PREFIXES.iter().any(|p| url.starts_with(p)) || RESTRICTED_HOSTS.iter().any(|h| url.contains(h))
}

/// Abstraction over one browser tab's driver, so the RPC protocol in
/// [`Bridge::send`] is testable without launching a real browser.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn current_url(&self) -> Result<String, BridgeError>;
    async fn activate(&self) -> Result<(), BridgeError>;
    async fn dispatch(&self, request: &ContentScriptRequest) -> Result<Value, BridgeError>;
    async fn inject_content_script(&self) -> Result<(), BridgeError>;
    async fn wait_for_complete(&self, timeout: Duration) -> Result<(), BridgeError>;
    /// Most recent main-frame network error recorded for this tab within
    /// [`RECENT_NETWORK_ERROR_WINDOW`], if any (spec.md §4.5 item 6).
    async fn recent_network_error(&self) -> Option<String>;
}

/// The result of a successful send, or a structured failure.
pub type SendResult = Result<Value, BridgeError>;

/// The navigation-detecting variant's augmented result (spec.md §4.5
/// "Navigation-detecting variant").
#[derive(Debug, Clone)]
pub struct NavigationOutcome {
    pub result: Value,
    pub navigated: bool,
    pub new_url: Option<String>,
}

/// `getNavigationStatus(tab)` (spec.md §4.5 scenario 3): the tab's current
/// position in its history, for an action to decide whether back/forward
/// are available.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NavigationStatus {
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub current_url: Option<String>,
}

/// Background debounced persister state, owned by [`Bridge`]. Grounded on
/// the teacher's `BrowserSessionManager` cleanup task: a weak reference
/// into the shared state avoids a reference cycle, and `Drop` aborts the
/// task so it doesn't outlive its owner.
struct Persistence {
    dirty: Arc<AtomicBool>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

pub struct Bridge {
    registry: Arc<Mutex<TabRegistry>>,
    pages: Mutex<HashMap<String, Arc<dyn PageHandle>>>,
    persistence: Option<Persistence>,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(TabRegistry::new())),
            pages: Mutex::new(HashMap::new()),
            persistence: None,
        }
    }

    /// As [`Self::new`], but restores the tab registry from `store` if a
    /// snapshot exists, and coalesces every subsequent write into a single
    /// debounced persist (spec.md §9 "Shared-resource policy").
    pub fn with_session_store(store: Arc<SessionStore>) -> Self {
        let initial = store.load().ok().flatten().map(TabRegistry::from_snapshot).unwrap_or_default();
        let registry = Arc::new(Mutex::new(initial));

        let dirty = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let task = {
            let registry_weak = Arc::downgrade(&registry);
            let dirty = dirty.clone();
            let notify = notify.clone();
            tokio::spawn(async move {
                loop {
                    notify.notified().await;
                    // Extend the quiet window for as long as writes keep
                    // arriving; only a `PERSIST_DEBOUNCE`-long silence
                    // triggers a save.
                    while tokio::time::timeout(PERSIST_DEBOUNCE, notify.notified()).await.is_ok() {}

                    if !dirty.swap(false, Ordering::Relaxed) {
                        continue;
                    }
                    let Some(registry) = registry_weak.upgrade() else {
                        tracing::debug!("tab registry dropped, persistence task exiting");
                        break;
                    };
                    let snapshot = registry.lock().await.snapshot();
                    if let Err(err) = store.save(&snapshot) {
                        tracing::warn!(error = %err, "tab registry persist failed");
                    }
                }
            })
        };

        Self {
            registry,
            pages: Mutex::new(HashMap::new()),
            persistence: Some(Persistence { dirty, notify, task }),
        }
    }

    fn mark_dirty(&self) {
        if let Some(p) = &self.persistence {
            p.dirty.store(true, Ordering::Relaxed);
            p.notify.notify_one();
        }
    }

    /// Register a tab's page driver, minting its alias and seeding history
    /// with the tab's current URL so the first in-action navigation already
    /// has a "back" entry to return to.
    pub async fn register_tab(&self, tab_id: &str, page: Arc<dyn PageHandle>) -> String {
        let alias = self.registry.lock().await.alias_for(tab_id);
        if let Ok(url) = page.current_url().await {
            if let Some(tab) = self.registry.lock().await.get_mut(tab_id) {
                tab.history.navigate(url);
            }
        }
        self.pages.lock().await.insert(tab_id.to_string(), page);
        self.mark_dirty();
        alias
    }

    pub async fn remove_tab(&self, tab_id: &str) {
        self.registry.lock().await.remove(tab_id);
        self.pages.lock().await.remove(tab_id);
        self.mark_dirty();
    }

    async fn resolve(&self, tab_ref: &str) -> Result<(String, Arc<dyn PageHandle>), BridgeError> {
        let tab_id = self.registry.lock().await.resolve_tab_id(tab_ref)?;
        let page = self
            .pages
            .lock()
            .await
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| BridgeError::new(ErrorKind::TabGone, format!("tab '{tab_id}' has no live page")))?;
        Ok((tab_id, page))
    }

    /// Steps 1-6 of spec.md §4.5 "Bridge send protocol".
    pub async fn send(&self, tab_ref: &str, request: &ContentScriptRequest) -> SendResult {
        let (tab_id, page) = self.resolve(tab_ref).await?;

        let needs_activation = !self
            .registry
            .lock()
            .await
            .get(&tab_id)
            .map(|t| t.last_activated_by_us)
            .unwrap_or(false);
        if needs_activation {
            page.activate().await?;
            tokio::time::sleep(ACTIVATE_SETTLE).await;
            if let Some(tab) = self.registry.lock().await.get_mut(&tab_id) {
                tab.last_activated_by_us = true;
            }
            self.mark_dirty();
        }

        let url = page.current_url().await?;
        if is_restricted_url(&url) {
            return Err(BridgeError::new(ErrorKind::Restricted, format!("'{url}' is a restricted page")));
        }

        match page.dispatch(request).await {
            Ok(value) => Ok(value),
            Err(err) => self.handle_send_failure(&page, request, err).await,
        }
    }

    async fn handle_send_failure(&self, page: &Arc<dyn PageHandle>, request: &ContentScriptRequest, err: BridgeError) -> SendResult {
        if NO_RECEIVER_PATTERNS.iter().any(|p| err.message.contains(p)) {
            page.inject_content_script().await?;
            return match page.dispatch(request).await {
                Ok(value) => Ok(value),
                Err(retry_err) => Err(self.classify(page, retry_err).await),
            };
        }
        Err(self.classify(page, err).await)
    }

    /// Wrap a send failure with [`ErrorKind::BrowserErrorPage`] when its
    /// message matches a known network/cert error pattern, including the
    /// most recent main-frame network error for that tab (spec.md §4.5
    /// item 6).
    async fn classify(&self, page: &Arc<dyn PageHandle>, err: BridgeError) -> BridgeError {
        if BROWSER_ERROR_PATTERNS.iter().any(|p| err.message.contains(*p)) {
            let recent = page.recent_network_error().await;
            let detail = recent.map(|e| format!(" (recent network error: {e})")).unwrap_or_default();
            return BridgeError::new(ErrorKind::BrowserErrorPage, format!("{}{detail}", err.message));
        }
        err
    }

    /// Wraps [`Bridge::send`] to detect a navigation the action triggered
    /// (spec.md §4.5 "Navigation-detecting variant"): poll the URL at
    /// 100ms then 400ms, and if it changed, record history and wait up to
    /// 10s for the page to finish loading.
    pub async fn send_with_navigation_detection(&self, tab_ref: &str, request: &ContentScriptRequest) -> Result<NavigationOutcome, BridgeError> {
        let (tab_id, page) = self.resolve(tab_ref).await?;
        let url_before = page.current_url().await?;

        let result = self.send(tab_ref, request).await?;

        tokio::time::sleep(NAV_POLL_FIRST).await;
        let mut url_after = page.current_url().await?;
        if url_after == url_before {
            tokio::time::sleep(NAV_POLL_SECOND).await;
            url_after = page.current_url().await?;
        }

        if url_after == url_before {
            return Ok(NavigationOutcome { result, navigated: false, new_url: None });
        }

        if let Some(tab) = self.registry.lock().await.get_mut(&tab_id) {
            tab.history.navigate(url_after.clone());
        }
        self.mark_dirty();
        page.wait_for_complete(NAV_LOAD_TIMEOUT).await?;

        Ok(NavigationOutcome { result, navigated: true, new_url: Some(url_after) })
    }

    /// `getNavigationStatus` (spec.md §4.5 scenario 3): read-only snapshot of
    /// a tab's position in its history, independent of any content-script
    /// round trip.
    pub async fn navigation_status(&self, tab_ref: &str) -> Result<NavigationStatus, BridgeError> {
        let registry = self.registry.lock().await;
        let tab_id = registry.resolve_tab_id(tab_ref)?;
        let tab = registry
            .get(&tab_id)
            .ok_or_else(|| BridgeError::new(ErrorKind::TabGone, format!("tab '{tab_id}' has no live page")))?;
        Ok(NavigationStatus {
            can_go_back: tab.history.can_go_back(),
            can_go_forward: tab.history.can_go_forward(),
            current_url: tab.history.current_url().map(str::to_string),
        })
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(p) = self.persistence.take() {
            p.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    struct FakePage {
        url: RwLock<String>,
        dispatch_calls: AtomicUsize,
        fail_first_dispatch: bool,
        injected: AtomicUsize,
        navigate_to: Option<String>,
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn current_url(&self) -> Result<String, BridgeError> {
            Ok(self.url.read().await.clone())
        }

        async fn activate(&self) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn dispatch(&self, _request: &ContentScriptRequest) -> Result<Value, BridgeError> {
            let n = self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 && self.fail_first_dispatch {
                return Err(BridgeError::new(ErrorKind::ScriptInjectionFailed, "Receiving end does not exist".to_string()));
            }
            if let Some(target) = &self.navigate_to {
                *self.url.write().await = target.clone();
            }
            Ok(serde_json::json!({"success": true}))
        }

        async fn inject_content_script(&self) -> Result<(), BridgeError> {
            self.injected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_for_complete(&self, _timeout: Duration) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn recent_network_error(&self) -> Option<String> {
            None
        }
    }

    fn fake(url: &str) -> Arc<FakePage> {
        Arc::new(FakePage {
            url: RwLock::new(url.to_string()),
            dispatch_calls: AtomicUsize::new(0),
            fail_first_dispatch: false,
            injected: AtomicUsize::new(0),
            navigate_to: None,
        })
    }

    #[tokio::test]
    async fn restricted_url_rejected_before_dispatch() {
        let bridge = Bridge::new();
        let page = fake("chrome://settings");
        bridge.register_tab("tab1", page.clone()).await;
        let result = bridge.send("tab1", &ContentScriptRequest::ExtractContent).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Restricted);
        assert_eq!(page.dispatch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn injects_and_retries_on_no_receiver() {
        let bridge = Bridge::new();
        let page = Arc::new(FakePage {
            url: RwLock::new("https://example.com".to_string()),
            dispatch_calls: AtomicUsize::new(0),
            fail_first_dispatch: true,
            injected: AtomicUsize::new(0),
            navigate_to: None,
        });
        bridge.register_tab("tab1", page.clone()).await;
        let result = bridge.send("tab1", &ContentScriptRequest::ExtractContent).await;
        assert!(result.is_ok());
        assert_eq!(page.injected.load(Ordering::SeqCst), 1);
        assert_eq!(page.dispatch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_alias_fails_invalid_tab() {
        let bridge = Bridge::new();
        let result = bridge.send("t99", &ContentScriptRequest::ExtractContent).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidTab);
    }

    #[tokio::test]
    async fn navigation_detection_reports_new_url() {
        let bridge = Bridge::new();
        let page = Arc::new(FakePage {
            url: RwLock::new("https://example.com".to_string()),
            dispatch_calls: AtomicUsize::new(0),
            fail_first_dispatch: false,
            injected: AtomicUsize::new(0),
            navigate_to: Some("https://example.com/next".to_string()),
        });
        bridge.register_tab("tab1", page).await;
        let outcome = bridge
            .send_with_navigation_detection("tab1", &ContentScriptRequest::ClickElement { element_id: 0, modifiers: None })
            .await
            .unwrap();
        assert!(outcome.navigated);
        assert_eq!(outcome.new_url.as_deref(), Some("https://example.com/next"));
    }

    #[tokio::test]
    async fn navigation_status_reports_can_go_back_after_navigating() {
        let bridge = Bridge::new();
        let page = Arc::new(FakePage {
            url: RwLock::new("https://example.com".to_string()),
            dispatch_calls: AtomicUsize::new(0),
            fail_first_dispatch: false,
            injected: AtomicUsize::new(0),
            navigate_to: Some("https://example.com/next".to_string()),
        });
        bridge.register_tab("tab1", page).await;

        let before = bridge.navigation_status("tab1").await.unwrap();
        assert!(!before.can_go_back);

        bridge
            .send_with_navigation_detection("tab1", &ContentScriptRequest::ClickElement { element_id: 0, modifiers: None })
            .await
            .unwrap();

        let after = bridge.navigation_status("tab1").await.unwrap();
        assert!(after.can_go_back);
        assert_eq!(after.current_url.as_deref(), Some("https://example.com/next"));
    }

    #[tokio::test]
    async fn no_navigation_reports_unchanged() {
        let bridge = Bridge::new();
        let page = fake("https://example.com");
        bridge.register_tab("tab1", page).await;
        let outcome = bridge
            .send_with_navigation_detection("tab1", &ContentScriptRequest::ExtractContent)
            .await
            .unwrap();
        assert!(!outcome.navigated);
        assert!(outcome.new_url.is_none());
    }

    #[tokio::test]
    async fn writes_coalesce_into_one_debounced_persist() {
        let store = Arc::new(SessionStore::in_memory().unwrap());
        let bridge = Bridge::with_session_store(store.clone());

        bridge.register_tab("tab1", fake("https://example.com")).await;
        bridge.register_tab("tab2", fake("https://example.org")).await;

        assert!(store.load().unwrap().is_none(), "persist fires after a quiet period, not immediately");

        tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(200)).await;

        let snapshot = store.load().unwrap().expect("debounced persist should have run");
        assert_eq!(snapshot.tabs.len(), 2);
        assert_eq!(snapshot.alias_counter, 2);
    }

    #[tokio::test]
    async fn restores_registry_from_existing_snapshot() {
        let store = Arc::new(SessionStore::in_memory().unwrap());
        {
            let bridge = Bridge::with_session_store(store.clone());
            bridge.register_tab("tab1", fake("https://example.com")).await;
            tokio::time::sleep(PERSIST_DEBOUNCE + Duration::from_millis(200)).await;
        }

        let restored = Bridge::with_session_store(store);
        let status = restored.navigation_status("t1").await.unwrap();
        assert_eq!(status.current_url.as_deref(), Some("https://example.com"));
    }
}
