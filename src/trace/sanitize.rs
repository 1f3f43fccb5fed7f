//! Trace payload sanitization (spec.md §4.3): strings truncated at 40 KB,
//! arrays truncated at 50 items, total serialized object capped at 200 KB,
//! with a depth cap to prevent unbounded recursion. `serde_json::Value` has
//! no function variant, so the "Function → `[Function]`" rule from the
//! source spec has no applicable input here and is omitted; errors are
//! sanitized to `{name, message}` by callers before they reach `sanitize`
//! (see [`crate::error::to_json`]).

use serde_json::{Map, Value};

const MAX_STRING_BYTES: usize = 40_000;
const MAX_ARRAY_ITEMS: usize = 50;
const MAX_TOTAL_BYTES: usize = 200_000;
const MAX_DEPTH: usize = 12;

/// Sanitize a value for trace storage. Returns a truncation-marker object
/// if the sanitized result would still exceed the total size cap.
pub fn sanitize(value: &Value) -> Value {
    let sanitized = sanitize_at_depth(value, 0);
    let size = approx_size(&sanitized);
    if size > MAX_TOTAL_BYTES {
        serde_json::json!({ "__truncated__": true, "originalSizeBytes": size })
    } else {
        sanitized
    }
}

fn sanitize_at_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return Value::String("[truncated: max depth exceeded]".to_string());
    }
    match value {
        Value::String(s) => Value::String(truncate_string(s)),
        Value::Array(items) => {
            let total = items.len();
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|v| sanitize_at_depth(v, depth + 1))
                .collect();
            if total > MAX_ARRAY_ITEMS {
                out.push(Value::String(format!("[truncated {} more items]", total - MAX_ARRAY_ITEMS)));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_at_depth(v, depth + 1));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn truncate_string(s: &str) -> String {
    if s.len() <= MAX_STRING_BYTES {
        return s.to_string();
    }
    let mut boundary = MAX_STRING_BYTES;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}[truncated {} chars]", &s[..boundary], s.len() - boundary)
}

fn approx_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_string_unchanged() {
        assert_eq!(sanitize(&json!("hi")), json!("hi"));
    }

    #[test]
    fn long_string_truncated_with_marker() {
        let long = "a".repeat(MAX_STRING_BYTES + 100);
        let result = sanitize(&json!(long));
        let s = result.as_str().unwrap();
        assert!(s.ends_with("[truncated 100 chars]"));
        assert!(s.len() < long.len());
    }

    #[test]
    fn long_array_truncated_with_marker() {
        let items: Vec<Value> = (0..60).map(Value::from).collect();
        let result = sanitize(&json!(items));
        let arr = result.as_array().unwrap();
        assert_eq!(arr.len(), MAX_ARRAY_ITEMS + 1);
        assert!(arr.last().unwrap().as_str().unwrap().contains("10 more items"));
    }

    #[test]
    fn oversized_total_becomes_truncation_marker_object() {
        let huge = json!({ "a": "x".repeat(MAX_TOTAL_BYTES + 1000) });
        let result = sanitize(&huge);
        assert_eq!(result.get("__truncated__"), Some(&json!(true)));
    }

    #[test]
    fn deep_nesting_is_capped() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_DEPTH + 5) {
            value = json!({ "nested": value });
        }
        let result = sanitize(&value);
        // Walk down MAX_DEPTH levels; beyond that we should hit the marker string.
        let mut cur = &result;
        for _ in 0..MAX_DEPTH {
            cur = &cur["nested"];
        }
        assert!(cur.as_str().unwrap().contains("max depth exceeded"));
    }
}
