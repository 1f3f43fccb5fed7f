//! Budget-based hierarchical truncation (spec.md §4.4 phase 11): a
//! linear-taper pruning policy tuned by binary search over a slope
//! parameter, using a pre-built per-element outerHTML-size cache so each
//! candidate slope can be scored without re-serializing the whole tree.

use super::util::serialized_len;
use kuchiki::NodeRef;

const MIN_KEEP_RATIO: f64 = 0.1;
const SLOPE_PRECISION: f64 = 0.01;
const MAX_SLOPE: f64 = 3.0;
const OVER_ESTIMATE_FACTOR: f64 = 0.95;
const MAX_RETRIES: u32 = 10;
const ESCALATION_FACTOR: f64 = 1.2;

/// A snapshot of the element tree with each node's *own* markup size
/// (outerHTML minus the concatenated outerHTML of its element children)
/// cached, so repeated slope estimates only sum cached integers.
struct SizeNode {
    node: NodeRef,
    own_size: usize,
    children: Vec<SizeNode>,
}

impl SizeNode {
    fn full_size(&self) -> usize {
        self.own_size + self.children.iter().map(SizeNode::full_size).sum::<usize>()
    }
}

fn build(node: &NodeRef) -> SizeNode {
    let children: Vec<SizeNode> = node
        .children()
        .filter(|c| c.as_element().is_some())
        .map(|c| build(&c))
        .collect();
    let full_size = serialized_len(node);
    let children_full: usize = children.iter().map(SizeNode::full_size).sum();
    SizeNode {
        node: node.clone(),
        own_size: full_size.saturating_sub(children_full),
        children,
    }
}

/// `keepRatio(i, n, slope) = max(0, 1 - slope * i/(n-1))` (spec.md §4.4
/// phase 11), defined for child `i` of `n` siblings.
fn keep_ratio(index: usize, sibling_count: usize, slope: f64) -> f64 {
    if sibling_count <= 1 {
        return 1.0;
    }
    (1.0 - slope * index as f64 / (sibling_count - 1) as f64).max(0.0)
}

fn estimate_size(node: &SizeNode, inherited_ratio: f64, slope: f64) -> usize {
    if inherited_ratio < MIN_KEEP_RATIO {
        return 0;
    }
    let n = node.children.len();
    let mut total = node.own_size;
    for (i, child) in node.children.iter().enumerate() {
        let child_ratio = inherited_ratio * keep_ratio(i, n, slope);
        total += estimate_size(child, child_ratio, slope);
    }
    total
}

/// Detach subtrees whose inherited ratio falls below [`MIN_KEEP_RATIO`] at
/// the given slope. Idempotent: nodes already detached by a prior (lower)
/// slope are skipped.
fn apply_slope(node: &SizeNode, inherited_ratio: f64, slope: f64) {
    if inherited_ratio < MIN_KEEP_RATIO {
        if node.node.parent().is_some() {
            node.node.detach();
        }
        return;
    }
    let n = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let child_ratio = inherited_ratio * keep_ratio(i, n, slope);
        apply_slope(child, child_ratio, slope);
    }
}

/// Find the minimum slope in `[0, 3]` (0.01 precision) whose estimated size
/// is at most `0.95 * target_size`.
fn search_slope(tree: &SizeNode, target_size: usize) -> f64 {
    let budget = (target_size as f64 * OVER_ESTIMATE_FACTOR) as usize;
    if estimate_size(tree, 1.0, MAX_SLOPE) > budget {
        return MAX_SLOPE;
    }
    let mut low = 0.0_f64;
    let mut high = MAX_SLOPE;
    while high - low > SLOPE_PRECISION {
        let mid = (low + high) / 2.0;
        if estimate_size(tree, 1.0, mid) <= budget {
            high = mid;
        } else {
            low = mid;
        }
    }
    high
}

/// Apply budget-based truncation to `root` in place, returning the final
/// serialized byte size. Runs the binary search once, then up to
/// [`MAX_RETRIES`] escalations of `slope *= 1.2` if the actual resulting
/// size still exceeds `target_size` (spec.md §4.4 phase 11).
pub fn truncate_to_budget(root: &NodeRef, target_size: usize) -> usize {
    if serialized_len(root) <= target_size {
        return serialized_len(root);
    }

    let tree = build(root);
    let mut slope = search_slope(&tree, target_size);
    apply_slope(&tree, 1.0, slope);

    let mut actual = serialized_len(root);
    let mut retries = 0;
    while actual > target_size && retries < MAX_RETRIES {
        slope = (slope * ESCALATION_FACTOR).min(MAX_SLOPE);
        apply_slope(&tree, 1.0, slope);
        actual = serialized_len(root);
        retries += 1;
    }
    actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn build_fixture(n: usize) -> NodeRef {
        let mut body = String::from("<html><body><div>");
        for i in 0..n {
            body.push_str(&format!("<p>paragraph number {i} with some filler text to take up space</p>"));
        }
        body.push_str("</div></body></html>");
        kuchiki::parse_html().one(body)
    }

    #[test]
    fn noop_when_already_under_budget() {
        let doc = build_fixture(2);
        let before = serialized_len(&doc);
        let after = truncate_to_budget(&doc, before + 1000);
        assert_eq!(before, after);
    }

    #[test]
    fn shrinks_large_document_toward_target() {
        let doc = build_fixture(200);
        let before = serialized_len(&doc);
        let target = before / 4;
        let after = truncate_to_budget(&doc, target);
        assert!(after < before);
    }

    #[test]
    fn keep_ratio_decreases_with_index() {
        let r0 = keep_ratio(0, 10, 1.0);
        let r9 = keep_ratio(9, 10, 1.0);
        assert!(r0 > r9);
        assert_eq!(r0, 1.0);
        assert_eq!(r9, 0.0);
    }

    #[test]
    fn keep_ratio_single_child_is_always_one() {
        assert_eq!(keep_ratio(0, 1, 3.0), 1.0);
    }
}
