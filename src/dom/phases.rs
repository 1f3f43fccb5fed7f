//! The 12 fixed-order cleaning passes other than budget-based truncation
//! (spec.md §4.4 phases 1-10, 12-13; phase 11 lives in [`super::truncate`]).
//! Every removal pass skips subtrees carrying [`PROTECT_ATTR`].

use super::url_registry::UrlRegistry;
use super::util::{collect_elements, has_protected, new_element, serialized_len, tag_name, PROTECT_ATTR};
use kuchiki::NodeRef;

const BLACKLIST_TAGS: &[&str] = &[
    "script", "style", "svg", "iframe", "noscript", "link", "meta", "object", "embed", "canvas", "audio", "video",
    "template", "source", "track",
];

const BLACKLIST_SELECTORS: &[&str] = &[
    "[class*=cookie]",
    "[id*=cookie]",
    "[class*=banner]",
    "[class*=advertisement]",
    "[id*=advertisement]",
    "[class*=popup]",
    "[class*=comment]",
    "[id*=comments]",
    "[class*=sidebar]",
];

/// Phase 1: blacklisted tags and site-boilerplate selectors.
pub fn remove_blacklisted(root: &NodeRef) {
    for tag in BLACKLIST_TAGS {
        remove_all_matching(root, tag, true);
    }
    for selector in BLACKLIST_SELECTORS {
        remove_all_matching(root, selector, false);
    }
}

fn remove_all_matching(root: &NodeRef, selector: &str, ignore_protection: bool) {
    let Ok(matches) = root.select(selector) else {
        return;
    };
    let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
    for node in nodes {
        if node.parent().is_none() {
            continue;
        }
        if !ignore_protection && has_protected(&node) {
            continue;
        }
        node.detach();
    }
}

const GENERIC_ALT_WORDS: &[&str] = &["image", "logo", "icon"];

/// Phase 2: images with missing, too-short, or generic alt text.
pub fn remove_low_value_images(root: &NodeRef) {
    let Ok(matches) = root.select("img") else {
        return;
    };
    let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
    for node in nodes {
        if node.parent().is_none() || has_protected(&node) {
            continue;
        }
        let alt = node
            .as_element()
            .and_then(|el| el.attributes.borrow().get("alt").map(str::to_string))
            .unwrap_or_default();
        let trimmed = alt.trim();
        let lower = trimmed.to_lowercase();
        if trimmed.len() < 3 || GENERIC_ALT_WORDS.contains(&lower.as_str()) {
            node.detach();
        }
    }
}

const NAV_KEEP_WORDS: &[&str] = &["page", "content", "article", "section"];

/// Phase 3: `<nav>` elements, unless their `aria-label` signals real content.
pub fn remove_generic_nav(root: &NodeRef) {
    let Ok(matches) = root.select("nav") else {
        return;
    };
    let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
    for node in nodes {
        if node.parent().is_none() || has_protected(&node) {
            continue;
        }
        let aria = node
            .as_element()
            .and_then(|el| el.attributes.borrow().get("aria-label").map(str::to_lowercase))
            .unwrap_or_default();
        let keep = NAV_KEEP_WORDS.iter().any(|w| aria.contains(w));
        if !keep {
            node.detach();
        }
    }
}

const HEURISTIC_NAV_TAGS: &[&str] = &["div", "aside", "ul", "nav"];
const HEURISTIC_NAV_MIN_BYTES: usize = 5_000;
const HEURISTIC_NAV_MIN_LINKS: usize = 5;
const HEURISTIC_NAV_LINK_TEXT_RATIO: f64 = 0.7;

/// Phase 4: large link-dense containers with no interactive/main content.
pub fn remove_heuristic_navigation(root: &NodeRef) {
    for tag in HEURISTIC_NAV_TAGS {
        let Ok(matches) = root.select(tag) else {
            continue;
        };
        let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
        for node in nodes {
            if node.parent().is_none() || has_protected(&node) {
                continue;
            }
            if contains_interactive_or_main(&node) {
                continue;
            }
            if serialized_len(&node) <= HEURISTIC_NAV_MIN_BYTES {
                continue;
            }
            let link_count = count_matching(&node, "a");
            if link_count < HEURISTIC_NAV_MIN_LINKS {
                continue;
            }
            let total_text = node.text_contents().len();
            if total_text == 0 {
                continue;
            }
            let link_text = sum_link_text(&node);
            if link_text as f64 / total_text as f64 > HEURISTIC_NAV_LINK_TEXT_RATIO {
                node.detach();
            }
        }
    }
}

fn contains_interactive_or_main(node: &NodeRef) -> bool {
    ["main", "article", "form", "button", "input", "select", "textarea"]
        .iter()
        .any(|tag| count_matching(node, tag) > 0)
}

fn count_matching(node: &NodeRef, selector: &str) -> usize {
    node.select(selector).map(Iterator::count).unwrap_or(0)
}

fn sum_link_text(node: &NodeRef) -> usize {
    node.select("a")
        .map(|it| it.map(|m| m.as_node().text_contents().len()).sum())
        .unwrap_or(0)
}

const ATTR_BLACKLIST_EXACT: &[&str] = &["class", "style"];
const ATTR_BLACKLIST_PREFIXES: &[&str] = &["on", "data-react", "data-v-", "ng-", "data-ember"];
const TEXT_VALUE_MAX_LEN: usize = 50;
const HASH_VALUE_MIN_LEN: usize = 15;
const HASH_VALUE_KEEP_LEN: usize = 7;

fn is_blacklisted_attr(name: &str) -> bool {
    if name == PROTECT_ATTR {
        return false;
    }
    ATTR_BLACKLIST_EXACT.contains(&name) || ATTR_BLACKLIST_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn looks_hash_like(value: &str) -> bool {
    if value.len() <= HASH_VALUE_MIN_LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let rare = value.chars().filter(|c| c.is_ascii_digit() || "xXzZqQjJwW".contains(*c)).count();
    rare as f64 / value.len() as f64 > 0.3
}

fn cap_value(value: &str) -> String {
    if looks_hash_like(value) {
        format!("{}...", value.chars().take(HASH_VALUE_KEEP_LEN).collect::<String>())
    } else if value.chars().count() > TEXT_VALUE_MAX_LEN {
        format!("{}...", value.chars().take(TEXT_VALUE_MAX_LEN).collect::<String>())
    } else {
        value.to_string()
    }
}

fn is_hidden(node: &NodeRef) -> bool {
    let Some(el) = node.as_element() else { return false };
    let attrs = el.attributes.borrow();
    let style = attrs.get("style").unwrap_or("").replace(' ', "").to_lowercase();
    let aria_hidden = attrs.get("aria-hidden").is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let hidden_attr = attrs.get("hidden").is_some();
    style.contains("display:none") || style.contains("visibility:hidden") || aria_hidden || hidden_attr
}

/// Phase 5: attribute cleaning — blacklist, value heuristics, URL
/// shortening, and hidden-element removal.
pub fn clean_attributes(root: &NodeRef, registry: &mut UrlRegistry) {
    for node in collect_elements(root) {
        if node.as_element().is_none() {
            continue;
        }
        if node.parent().is_some() && is_hidden(&node) && !has_protected(&node) {
            node.detach();
            continue;
        }

        let keys: Vec<String> = {
            let el = node.as_element().expect("checked above");
            el.attributes.borrow().map.keys().map(|k| k.local.to_string()).collect()
        };

        for key in keys {
            let el = node.as_element().expect("checked above");
            let mut attrs = el.attributes.borrow_mut();
            if is_blacklisted_attr(&key) {
                attrs.remove(key.as_str());
                continue;
            }
            let Some(value) = attrs.get(key.as_str()).map(str::to_string) else {
                continue;
            };
            let rewritten = if key == "href" || key == "src" {
                registry.shorten(&value)
            } else {
                cap_value(&value)
            };
            if rewritten != value {
                attrs.insert(key, rewritten);
            }
        }
    }
}

const EMPTY_CONTAINER_TAGS: &[&str] = &["div", "span", "p", "li", "section", "article", "header", "footer", "aside"];

/// Phase 6: bottom-up removal of semantically-empty containers.
pub fn remove_empty_containers(root: &NodeRef) {
    for child in root.children().collect::<Vec<_>>() {
        remove_empty_containers(&child);
    }
    let Some(tag) = tag_name(root) else {
        return;
    };
    if !EMPTY_CONTAINER_TAGS.contains(&tag.as_str()) {
        return;
    }
    if root.parent().is_some() && root.children().next().is_none() && root.text_contents().trim().is_empty() {
        root.detach();
    }
}

const LIST_KEEP_COUNT: usize = 10;
const TABLE_KEEP_ROWS: usize = 10;

/// Phase 7: truncate `<ul>`/`<ol>` to their first 10 `<li>` children.
pub fn truncate_lists(root: &NodeRef) {
    for tag in ["ul", "ol"] {
        let Ok(matches) = root.select(tag) else { continue };
        for m in matches {
            truncate_list_node(m.as_node());
        }
    }
}

fn truncate_list_node(node: &NodeRef) {
    let items: Vec<NodeRef> = node
        .children()
        .filter(|c| tag_name(c).as_deref() == Some("li"))
        .collect();
    if items.len() <= LIST_KEEP_COUNT {
        return;
    }
    let removed_unprotected = items
        .iter()
        .skip(LIST_KEEP_COUNT)
        .filter(|item| {
            if has_protected(item) {
                false
            } else {
                item.detach();
                true
            }
        })
        .count();
    if removed_unprotected > 0 {
        node.append(kuchiki::NodeRef::new_text(format!("... ({removed_unprotected} more)")));
    }
}

/// Phase 8: truncate `<table>` body rows to the first 10, appending a
/// sentinel row.
pub fn truncate_tables(root: &NodeRef) {
    let Ok(matches) = root.select("table") else { return };
    for m in matches {
        truncate_table_node(m.as_node());
    }
}

fn truncate_table_node(node: &NodeRef) {
    let Ok(rows) = node.select("tr") else { return };
    let rows: Vec<NodeRef> = rows.map(|m| m.as_node().clone()).collect();
    let body_rows: Vec<&NodeRef> = rows.iter().filter(|r| !is_header_row(r)).collect();
    if body_rows.len() <= TABLE_KEEP_ROWS {
        return;
    }
    let remaining = body_rows.len() - TABLE_KEEP_ROWS;
    let mut removed = 0;
    for row in body_rows.iter().skip(TABLE_KEEP_ROWS) {
        if !has_protected(row) {
            row.detach();
            removed += 1;
        }
    }
    if removed == 0 {
        return;
    }
    if let Some(last_kept) = body_rows.get(TABLE_KEEP_ROWS.saturating_sub(1)) {
        if let Some(parent) = last_kept.parent() {
            let sentinel = new_element("tr");
            let cell = new_element("td");
            cell.append(kuchiki::NodeRef::new_text(format!("... ({remaining} more rows)")));
            sentinel.append(cell);
            parent.append(sentinel);
        }
    }
}

fn is_header_row(row: &NodeRef) -> bool {
    count_matching(row, "th") > 0
}

const WRAPPER_TAGS: &[&str] = &["div", "span"];
const MAX_COLLAPSE_ITERATIONS: u32 = 5;

/// Phase 9: collapse single-child attributeless `div`/`span` wrappers.
pub fn collapse_wrappers(root: &NodeRef) {
    for _ in 0..MAX_COLLAPSE_ITERATIONS {
        if !collapse_pass(root) {
            break;
        }
    }
}

fn collapse_pass(node: &NodeRef) -> bool {
    let mut changed = false;
    for child in node.children().collect::<Vec<_>>() {
        changed |= collapse_pass(&child);
    }
    let Some(tag) = tag_name(node) else { return changed };
    if !WRAPPER_TAGS.contains(&tag.as_str()) {
        return changed;
    }
    let attributeless = node.as_element().is_some_and(|el| el.attributes.borrow().map.is_empty());
    if !attributeless {
        return changed;
    }
    let all_children: Vec<NodeRef> = node.children().collect();
    if all_children.len() != 1 || all_children[0].as_element().is_none() {
        return changed;
    }
    if node.parent().is_some() {
        node.insert_before(all_children[0].clone());
        node.detach();
        return true;
    }
    changed
}

/// Phase 10: collapse whitespace runs in every text node to a single space.
pub fn collapse_whitespace(root: &NodeRef) {
    if let Some(text) = root.as_text() {
        let collapsed = collapse_ws(&text.borrow());
        *text.borrow_mut() = collapsed.into();
    }
    for child in root.children().collect::<Vec<_>>() {
        collapse_whitespace(&child);
    }
}

fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

const FRAMEWORK_WRAPPER_TAGS: &[&str] = &[
    "ytd-app",
    "ytd-page-manager",
    "ytd-watch-flexy",
    "ytd-masthead",
    "shreddit-app",
    "shreddit-post",
    "reddit-comment",
    "paper-button",
    "paper-dialog",
    "dom-if",
    "dom-repeat",
];

/// Phase 12: unwrap known framework shell elements (promote children).
pub fn unwrap_framework_wrappers(root: &NodeRef) {
    unwrap_matching(root, |tag| FRAMEWORK_WRAPPER_TAGS.contains(&tag));
}

/// Phase 13: unwrap all remaining custom elements (any tag containing `-`).
pub fn unwrap_custom_elements(root: &NodeRef) {
    unwrap_matching(root, |tag| tag.contains('-'));
}

fn unwrap_matching(root: &NodeRef, predicate: impl Fn(&str) -> bool) {
    for node in collect_elements(root) {
        if node.parent().is_none() {
            continue;
        }
        let Some(tag) = tag_name(&node) else { continue };
        if !predicate(&tag) {
            continue;
        }
        for child in node.children().collect::<Vec<_>>() {
            node.insert_before(child);
        }
        node.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn parse(html: &str) -> NodeRef {
        kuchiki::parse_html().one(html)
    }

    #[test]
    fn removes_script_tags() {
        let doc = parse("<html><body><script>evil()</script><p>hi</p></body></html>");
        remove_blacklisted(&doc);
        assert_eq!(count_matching(&doc, "script"), 0);
        assert_eq!(count_matching(&doc, "p"), 1);
    }

    #[test]
    fn keeps_protected_script_sibling_but_still_removes_script() {
        let doc = parse(r#"<html><body><script>x</script><a data-vish-id="0">link</a></body></html>"#);
        remove_blacklisted(&doc);
        assert_eq!(count_matching(&doc, "script"), 0);
        assert_eq!(count_matching(&doc, "a"), 1);
    }

    #[test]
    fn removes_generic_alt_images() {
        let doc = parse(r#"<html><body><img alt="icon"><img alt="a detailed photo of a cat"></body></html>"#);
        remove_low_value_images(&doc);
        assert_eq!(count_matching(&doc, "img"), 1);
    }

    #[test]
    fn keeps_nav_with_content_aria_label() {
        let doc = parse(r#"<html><body><nav aria-label="Article sections">a</nav><nav>chrome</nav></body></html>"#);
        remove_generic_nav(&doc);
        assert_eq!(count_matching(&doc, "nav"), 1);
    }

    #[test]
    fn truncates_long_list_and_appends_sentinel() {
        let mut html = String::from("<html><body><ul>");
        for i in 0..15 {
            html.push_str(&format!("<li>item {i}</li>"));
        }
        html.push_str("</ul></body></html>");
        let doc = parse(&html);
        truncate_lists(&doc);
        assert_eq!(count_matching(&doc, "li"), 10);
        assert!(doc.text_contents().contains("5 more"));
    }

    #[test]
    fn collapses_attributeless_single_child_wrapper() {
        let doc = parse("<html><body><div><div><p>hi</p></div></div></body></html>");
        collapse_wrappers(&doc);
        assert_eq!(count_matching(&doc, "div"), 0);
        assert_eq!(count_matching(&doc, "p"), 1);
    }

    #[test]
    fn collapses_whitespace_runs() {
        let doc = parse("<html><body><p>a   b\n\tc</p></body></html>");
        collapse_whitespace(&doc);
        assert_eq!(doc.text_contents().trim(), "a b c");
    }

    #[test]
    fn unwraps_custom_elements() {
        let doc = parse("<html><body><ytd-app><p>hi</p></ytd-app></body></html>");
        unwrap_custom_elements(&doc);
        assert_eq!(count_matching(&doc, "ytd-app"), 0);
        assert_eq!(count_matching(&doc, "p"), 1);
    }

    #[test]
    fn attribute_cleaning_strips_class_and_shortens_href() {
        let doc = parse(r#"<html><body><a class="nav-link" href="https://example.com/a?utm_source=x&q=rust">l</a></body></html>"#);
        let mut registry = UrlRegistry::new();
        clean_attributes(&doc, &mut registry);
        let has_class = doc
            .select("a")
            .unwrap()
            .next()
            .unwrap()
            .attributes
            .borrow()
            .get("class")
            .is_some();
        assert!(!has_class);
    }
}
