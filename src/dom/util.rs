//! Shared DOM-walking helpers used by several cleaning phases.

use kuchiki::NodeRef;

/// The interaction attribute the content script assigns (spec.md §4.4): the
/// cleaner MUST NOT remove any element carrying it.
pub const PROTECT_ATTR: &str = "data-vish-id";

pub fn serialized_len(node: &NodeRef) -> usize {
    let mut buf = Vec::new();
    let _ = node.serialize(&mut buf);
    buf.len()
}

/// True if `node` itself, or any descendant, carries [`PROTECT_ATTR`].
pub fn has_protected(node: &NodeRef) -> bool {
    if let Some(el) = node.as_element() {
        if el.attributes.borrow().get(PROTECT_ATTR).is_some() {
            return true;
        }
    }
    node.children().any(|c| has_protected(&c))
}

/// Pre-order collection of every element node in the subtree rooted at
/// `root`, including `root` itself.
pub fn collect_elements(root: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    collect_elements_into(root, &mut out);
    out
}

fn collect_elements_into(node: &NodeRef, out: &mut Vec<NodeRef>) {
    if node.as_element().is_some() {
        out.push(node.clone());
    }
    for child in node.children() {
        collect_elements_into(&child, out);
    }
}

/// Build a bare element node with no attributes, in the HTML namespace.
pub fn new_element(tag: &str) -> NodeRef {
    use markup5ever::{namespace_url, ns, LocalName, QualName};
    NodeRef::new_element(QualName::new(None, ns!(html), LocalName::from(tag)), vec![])
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|el| el.name.local.to_string())
}
