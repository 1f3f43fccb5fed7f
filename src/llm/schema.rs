//! JSON-schema enforcement for LLM calls that don't use native structured
//! output (spec.md §4.2): append a schema hint to the last user message,
//! then on response extract the largest `{…}` block — preferring a fenced
//! code block — and parse it.

use serde_json::Value;

/// Append an instruction asking for strict JSON matching `schema` to `text`.
pub fn schema_hint(text: &str, schema: &Value) -> String {
    format!(
        "{text}\n\nRespond with a single JSON object matching this schema. \
         Output only the JSON, no other text.\n\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

/// Extract the largest `{...}` object from `text`, preferring one found
/// inside a fenced code block, and parse it as JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    if let Some(fenced) = largest_fenced_json_block(text) {
        if let Ok(value) = serde_json::from_str(&fenced) {
            return Some(value);
        }
    }
    largest_brace_block(text).and_then(|candidate| serde_json::from_str(&candidate).ok())
}

fn largest_fenced_json_block(text: &str) -> Option<String> {
    let mut best: Option<String> = None;
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let lang_end = after_fence.find('\n').unwrap_or(0);
        let body_start = &after_fence[lang_end..];
        let Some(end) = body_start.find("```") else {
            break;
        };
        let candidate = body_start[..end].trim().to_string();
        if best.as_ref().is_none_or(|b| candidate.len() > b.len()) {
            best = Some(candidate);
        }
        rest = &body_start[end + 3..];
    }
    best
}

/// Scan for the largest balanced `{...}` span, tolerant of braces inside
/// string literals.
fn largest_brace_block(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    if stack.is_empty() {
                        let span_len = i - start + 1;
                        let keep = match best {
                            Some((bs, be)) => span_len > be - bs + 1,
                            None => true,
                        };
                        if keep {
                            best = Some((start, i));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| text[s..=e].to_string())
}
