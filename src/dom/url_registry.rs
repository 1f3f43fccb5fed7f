//! URL shortening for the attribute-cleaning phase (spec.md §4.4 phase 5):
//! strip all query params except a small keep-list; long results and
//! `data:` URIs are replaced with a registry placeholder.

use std::collections::HashMap;
use url::Url;

const KEEP_LIST: &[&str] = &["q", "query", "search", "s", "page", "p", "id", "tab", "v"];
const MAX_URL_LEN: usize = 60;

/// Maps placeholders (`[u3]`, `[data1]`) back to the original URL value so
/// downstream consumers (e.g. `clickElement`) can resolve them.
#[derive(Debug, Default, Clone)]
pub struct UrlRegistry {
    urls: Vec<String>,
    data_uris: Vec<String>,
}

impl UrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `raw` (strip non-keep-list query params); if it's a
    /// `data:` URI or the normalized form still exceeds [`MAX_URL_LEN`],
    /// register it and return a placeholder instead.
    pub fn shorten(&mut self, raw: &str) -> String {
        if raw.starts_with("data:") {
            self.data_uris.push(raw.to_string());
            return format!("[data{}]", self.data_uris.len());
        }

        let normalized = normalize_query_params(raw);
        if normalized.len() <= MAX_URL_LEN {
            return normalized;
        }
        self.urls.push(normalized);
        format!("[u{}]", self.urls.len())
    }

    pub fn resolve(&self, placeholder: &str) -> Option<&str> {
        if let Some(rest) = placeholder.strip_prefix("[u").and_then(|s| s.strip_suffix(']')) {
            let idx: usize = rest.parse().ok()?;
            return self.urls.get(idx.checked_sub(1)?).map(String::as_str);
        }
        if let Some(rest) = placeholder.strip_prefix("[data").and_then(|s| s.strip_suffix(']')) {
            let idx: usize = rest.parse().ok()?;
            return self.data_uris.get(idx.checked_sub(1)?).map(String::as_str);
        }
        None
    }

    pub fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (i, url) in self.urls.iter().enumerate() {
            map.insert(format!("[u{}]", i + 1), url.clone());
        }
        for (i, uri) in self.data_uris.iter().enumerate() {
            map.insert(format!("[data{}]", i + 1), uri.clone());
        }
        map
    }
}

fn normalize_query_params(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw).or_else(|_| Url::parse(&format!("https://placeholder.invalid{raw}"))) else {
        return raw.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| KEEP_LIST.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let pairs = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&pairs));
    }

    let result = url.as_str();
    result.strip_prefix("https://placeholder.invalid").unwrap_or(result).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_keep_list_params() {
        let mut registry = UrlRegistry::new();
        let out = registry.shorten("https://example.com/a?utm_source=x&q=rust");
        assert_eq!(out, "https://example.com/a?q=rust");
    }

    #[test]
    fn data_uri_becomes_placeholder() {
        let mut registry = UrlRegistry::new();
        let out = registry.shorten("data:image/png;base64,AAAA");
        assert_eq!(out, "[data1]");
        assert_eq!(registry.resolve("[data1]"), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn long_url_becomes_placeholder_and_resolves_back() {
        let mut registry = UrlRegistry::new();
        let long = format!("https://example.com/{}", "a".repeat(100));
        let out = registry.shorten(&long);
        assert_eq!(out, "[u1]");
        assert_eq!(registry.resolve("[u1]"), Some(long.as_str()));
    }

    #[test]
    fn short_url_unchanged() {
        let mut registry = UrlRegistry::new();
        assert_eq!(registry.shorten("/relative/path"), "/relative/path");
    }
}
