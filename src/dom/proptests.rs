//! Property tests for the cleaning pipeline's idempotence and size-bound
//! invariants (spec.md §4.4): cleaning already-clean HTML is a fixed point,
//! and the result never exceeds `max_html_bytes` unless it has fallen back
//! to plain-text mode.

use super::{clean, CleanConfig, ContentMode, PROTECT_ATTR};
use proptest::prelude::*;

fn arb_tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("div"), Just("span"), Just("p"), Just("a")]
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,40}"
}

/// A leaf element with no `href`/`src` (so `clean_attributes`'s URL
/// shortening, the one phase with cross-call state, never fires) and an
/// optional `data-vish-id` marking it protected.
fn arb_leaf() -> impl Strategy<Value = (&'static str, String, bool)> {
    (arb_tag(), arb_text(), any::<bool>())
}

fn arb_small_document() -> impl Strategy<Value = String> {
    proptest::collection::vec(arb_leaf(), 0..=6).prop_map(|leaves| {
        let mut body = String::from("<html><body><div>");
        for (i, (tag, text, protected)) in leaves.into_iter().enumerate() {
            if protected {
                body.push_str(&format!(r#"<{tag} {PROTECT_ATTR}="{i}">{text}</{tag}>"#));
            } else {
                body.push_str(&format!("<{tag}>{text}</{tag}>"));
            }
        }
        body.push_str("</div></body></html>");
        body
    })
}

fn arb_large_document() -> impl Strategy<Value = (String, usize)> {
    (0usize..200, proptest::collection::vec(arb_leaf(), 1..=400)).prop_map(|(protected_count, leaves)| {
        let protected_count = protected_count.min(leaves.len());
        let mut body = String::from("<html><body><div>");
        for (i, (tag, text, _)) in leaves.iter().enumerate() {
            if i < protected_count {
                body.push_str(&format!(r#"<{tag} {PROTECT_ATTR}="{i}">{text} padding padding padding</{tag}>"#, tag = tag, text = text));
            } else {
                body.push_str(&format!("<{tag}>{text} padding padding padding</{tag}>", tag = tag, text = text));
            }
        }
        body.push_str("</div></body></html>");
        (body, protected_count)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn clean_output_is_a_fixed_point(html in arb_small_document()) {
        let config = CleanConfig::default();
        let first = clean(&html, &config);
        if first.mode == ContentMode::Html {
            let second = clean(&first.content, &config);
            prop_assert_eq!(second.mode, ContentMode::Html);
            prop_assert_eq!(second.content, first.content);
            prop_assert_eq!(second.byte_size, first.byte_size);
        }
    }

    #[test]
    fn result_never_exceeds_budget_unless_text_mode((html, protected_count) in arb_large_document()) {
        let config = CleanConfig {
            max_html_bytes: 20_000,
            target_size: 18_000,
            debug: false,
        };
        let result = clean(&html, &config);
        prop_assert!(result.byte_size <= config.max_html_bytes || result.mode == ContentMode::Text);

        if result.mode == ContentMode::Html {
            for i in 0..protected_count {
                prop_assert!(result.content.contains(&format!(r#"{PROTECT_ATTR}="{i}""#)));
            }
        }
    }
}
