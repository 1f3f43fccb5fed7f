//! [`PageHandle`] implementation over `chromiumoxide`, the driver the
//! teacher's `tools/browser/session.rs` already uses to launch and drive
//! Chrome via CDP.
//!
//! The in-page script is injected once per page load via
//! `Page::evaluate_on_new_document` and exposes `window.__agentBridge`,
//! dispatching the JSON request shape of [`super::wire::ContentScriptRequest`]
//! and returning a JSON response. This crate does not vendor that script's
//! source (it is page-side JS, not a Rust module); `inject_content_script`
//! assumes a bundle is available at [`BRIDGE_SCRIPT_PATH`].

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use serde_json::Value;

use super::bridge::PageHandle;
use super::wire::ContentScriptRequest;
use crate::error::{BridgeError, ErrorKind};

const BRIDGE_SCRIPT_PATH: &str = "assets/agent-bridge.js";
const RECENT_NETWORK_ERROR_WINDOW: Duration = Duration::from_secs(30);
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(15);

/// A recorded main-frame network error, used by [`ChromiumPage::recent_network_error`]
/// (spec.md §4.5 item 6).
struct NetworkErrorEntry {
    code: String,
    at: Instant,
}

pub struct ChromiumPage {
    page: Page,
    network_errors: StdMutex<VecDeque<NetworkErrorEntry>>,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            network_errors: StdMutex::new(VecDeque::new()),
        }
    }

    /// Called by the listener task that watches `Network.loadingFailed`
    /// events for the page's main frame.
    pub fn record_network_error(&self, code: impl Into<String>) {
        let mut errors = self.network_errors.lock().expect("network_errors mutex poisoned");
        errors.push_back(NetworkErrorEntry { code: code.into(), at: Instant::now() });
        while errors.len() > 20 {
            errors.pop_front();
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn current_url(&self) -> Result<String, BridgeError> {
        self.page
            .url()
            .await
            .map_err(|e| BridgeError::new(ErrorKind::TabGone, e.to_string()))?
            .ok_or_else(|| BridgeError::new(ErrorKind::TabGone, "page has no URL"))
    }

    async fn activate(&self) -> Result<(), BridgeError> {
        self.page
            .bring_to_front()
            .await
            .map_err(|e| BridgeError::new(ErrorKind::TabGone, e.to_string()))?;
        Ok(())
    }

    async fn dispatch(&self, request: &ContentScriptRequest) -> Result<Value, BridgeError> {
        let payload = serde_json::to_string(request).map_err(|e| BridgeError::new(ErrorKind::ScriptInjectionFailed, e.to_string()))?;
        let expression = format!("window.__agentBridge.dispatch({payload})");

        let eval = tokio::time::timeout(DISPATCH_TIMEOUT, self.page.evaluate(expression))
            .await
            .map_err(|_| BridgeError::new(ErrorKind::Timeout, "content script did not respond in time"))?
            .map_err(|e| BridgeError::new(ErrorKind::ScriptInjectionFailed, e.to_string()))?;

        eval.into_value::<Value>()
            .map_err(|e| BridgeError::new(ErrorKind::ScriptInjectionFailed, format!("invalid content script response: {e}")))
    }

    async fn inject_content_script(&self) -> Result<(), BridgeError> {
        let source = tokio::fs::read_to_string(BRIDGE_SCRIPT_PATH)
            .await
            .map_err(|e| BridgeError::new(ErrorKind::ScriptInjectionFailed, format!("reading {BRIDGE_SCRIPT_PATH}: {e}")))?;
        self.page
            .evaluate(source)
            .await
            .map_err(|e| BridgeError::new(ErrorKind::ScriptInjectionFailed, e.to_string()))?;
        Ok(())
    }

    async fn wait_for_complete(&self, timeout: Duration) -> Result<(), BridgeError> {
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| BridgeError::new(ErrorKind::Timeout, "page did not finish loading in time"))?
            .map_err(|e| BridgeError::new(ErrorKind::TabGone, e.to_string()))?;
        Ok(())
    }

    async fn recent_network_error(&self) -> Option<String> {
        let errors = self.network_errors.lock().expect("network_errors mutex poisoned");
        errors
            .iter()
            .rev()
            .find(|e| e.at.elapsed() <= RECENT_NETWORK_ERROR_WINDOW)
            .map(|e| e.code.clone())
    }
}
