//! Content-script action vocabulary (spec.md §6): the typed request/response
//! shapes exchanged between the agent and the in-page script. Mirrors the
//! wire protocol 1:1 — these are what gets sent through [`super::bridge`]'s
//! `send`/`send_with_navigation_detection`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action")]
pub enum ContentScriptRequest {
    #[serde(rename = "extractContent")]
    ExtractContent,
    #[serde(rename = "clickElement")]
    ClickElement { #[serde(rename = "elementId")] element_id: u32, modifiers: Option<ClickModifiers> },
    #[serde(rename = "fillForm")]
    FillForm {
        fields: Vec<FormField>,
        #[serde(default)]
        submit: bool,
        #[serde(rename = "submitElementId", default)]
        submit_element_id: Option<u32>,
    },
    #[serde(rename = "scrollAndWait")]
    ScrollAndWait {
        direction: ScrollDirection,
        #[serde(default)]
        pixels: Option<u32>,
        #[serde(rename = "waitMs", default)]
        wait_ms: Option<u32>,
    },
    #[serde(rename = "hoverElement")]
    HoverElement { #[serde(rename = "elementId")] element_id: u32 },
    #[serde(rename = "pressKey")]
    PressKey { key: String, modifiers: Option<ClickModifiers> },
    #[serde(rename = "handleDialog")]
    HandleDialog { accept: bool, #[serde(rename = "promptText")] prompt_text: Option<String> },
    #[serde(rename = "getDialogs")]
    GetDialogs,
    #[serde(rename = "extractAccessibilityTree")]
    ExtractAccessibilityTree,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClickModifiers {
    #[serde(rename = "newTab", default)]
    pub new_tab: bool,
    #[serde(rename = "newTabActive", default)]
    pub new_tab_active: bool,
    #[serde(default)]
    pub download: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    #[serde(rename = "elementId")]
    pub element_id: u32,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractContentResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(rename = "contentMode")]
    pub content_mode: String,
    #[serde(rename = "byteSize")]
    pub byte_size: usize,
    #[serde(rename = "rawHtmlSize")]
    pub raw_html_size: usize,
    #[serde(rename = "debugLog", default)]
    pub debug_log: Option<Value>,
    #[serde(rename = "domStable")]
    pub dom_stable: bool,
    #[serde(rename = "domWaitMs")]
    pub dom_wait_ms: u64,
    #[serde(default)]
    pub links: Vec<InteractiveElement>,
    #[serde(default)]
    pub buttons: Vec<InteractiveElement>,
    #[serde(default)]
    pub inputs: Vec<InteractiveElement>,
    #[serde(default)]
    pub selects: Vec<InteractiveElement>,
    #[serde(default)]
    pub textareas: Vec<InteractiveElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveElement {
    pub id: u32,
    #[serde(flatten)]
    pub properties: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickElementResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub modifiers: Option<ClickModifiers>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillFormResult {
    pub filled_fields: u32,
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrollResult {
    pub scrolled: bool,
    pub previous_y: f64,
    pub current_y: f64,
    pub scrolled_pixels: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessibilityTreeResult {
    pub success: bool,
    pub mode: String,
    pub content: String,
    #[serde(rename = "refCount")]
    pub ref_count: u32,
}

/// The result wrapper the bridge's navigation-detecting send variant adds
/// on top of whatever the content script returned (spec.md §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct NavigationAugmented<T> {
    #[serde(flatten)]
    pub inner: T,
    pub navigated: bool,
    #[serde(rename = "new_url", skip_serializing_if = "Option::is_none")]
    pub new_url: Option<String>,
}
