//! DOM Cleaning & Extraction Pipeline (spec.md §4.4): reduces a raw
//! `document.body` capture to a bounded, interactive, token-efficient
//! representation, preserving every element carrying the interaction
//! attribute `data-vish-id`.

mod phases;
#[cfg(test)]
mod proptests;
mod truncate;
mod url_registry;
mod util;

pub use url_registry::UrlRegistry;
pub use util::PROTECT_ATTR;

use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use serde::Serialize;

use crate::config::{DEFAULT_DOM_TARGET_SIZE, DEFAULT_MAX_HTML_BYTES};

/// Per-call configuration for [`clean`]. Defaults mirror spec.md §4.4.
#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub max_html_bytes: usize,
    pub target_size: usize,
    pub debug: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
            target_size: DEFAULT_DOM_TARGET_SIZE,
            debug: false,
        }
    }
}

/// One phase's before/after sizes, emitted only when `debug` is requested.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseLogEntry {
    pub name: String,
    pub size_before: usize,
    pub size_after: usize,
    pub element_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Html,
    Text,
}

#[derive(Debug, Clone)]
pub struct CleanResult {
    pub mode: ContentMode,
    pub content: String,
    pub byte_size: usize,
    pub url_registry: UrlRegistry,
    pub debug_log: Option<Vec<PhaseLogEntry>>,
}

/// Run the 13 fixed-order cleaning passes over `html` and return either
/// bounded HTML or a plain-text fallback (spec.md §4.4 "Output").
pub fn clean(html: &str, config: &CleanConfig) -> CleanResult {
    let document = kuchiki::parse_html().one(html);
    let mut registry = UrlRegistry::new();
    let mut log: Vec<PhaseLogEntry> = Vec::new();

    run_phase(&mut log, config.debug, "remove_blacklisted", &document, |d| {
        phases::remove_blacklisted(d);
    });
    run_phase(&mut log, config.debug, "remove_low_value_images", &document, |d| {
        phases::remove_low_value_images(d);
    });
    run_phase(&mut log, config.debug, "remove_generic_nav", &document, |d| {
        phases::remove_generic_nav(d);
    });
    run_phase(&mut log, config.debug, "remove_heuristic_navigation", &document, |d| {
        phases::remove_heuristic_navigation(d);
    });
    run_phase(&mut log, config.debug, "clean_attributes", &document, |d| {
        phases::clean_attributes(d, &mut registry);
    });
    run_phase(&mut log, config.debug, "remove_empty_containers", &document, |d| {
        phases::remove_empty_containers(d);
    });
    run_phase(&mut log, config.debug, "truncate_lists", &document, |d| {
        phases::truncate_lists(d);
    });
    run_phase(&mut log, config.debug, "truncate_tables", &document, |d| {
        phases::truncate_tables(d);
    });
    run_phase(&mut log, config.debug, "collapse_wrappers", &document, |d| {
        phases::collapse_wrappers(d);
    });
    run_phase(&mut log, config.debug, "collapse_whitespace", &document, |d| {
        phases::collapse_whitespace(d);
    });
    run_phase(&mut log, config.debug, "truncate_to_budget", &document, |d| {
        truncate::truncate_to_budget(d, config.target_size);
    });
    run_phase(&mut log, config.debug, "unwrap_framework_wrappers", &document, |d| {
        phases::unwrap_framework_wrappers(d);
    });
    run_phase(&mut log, config.debug, "unwrap_custom_elements", &document, |d| {
        phases::unwrap_custom_elements(d);
    });

    let html_out = serialize(&document);
    let byte_size = html_out.len();

    if byte_size <= config.max_html_bytes {
        return CleanResult {
            mode: ContentMode::Html,
            content: html_out,
            byte_size,
            url_registry: registry,
            debug_log: config.debug.then_some(log),
        };
    }

    let text = collapse_text_whitespace(&document.text_contents());
    let byte_size = text.len();
    CleanResult {
        mode: ContentMode::Text,
        content: text,
        byte_size,
        url_registry: registry,
        debug_log: config.debug.then_some(log),
    }
}

fn run_phase(
    log: &mut Vec<PhaseLogEntry>,
    debug: bool,
    name: &str,
    document: &NodeRef,
    f: impl FnOnce(&NodeRef),
) {
    if !debug {
        f(document);
        return;
    }
    let size_before = serialize(document).len();
    f(document);
    log.push(PhaseLogEntry {
        name: name.to_string(),
        size_before,
        size_after: serialize(document).len(),
        element_count: util::collect_elements(document).len(),
    });
}

fn serialize(document: &NodeRef) -> String {
    let mut buf = Vec::new();
    let _ = document.serialize(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn collapse_text_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
