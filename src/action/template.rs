//! Minimal `{{key}}` / `{{{key}}}` template substitution (spec.md §4.1,
//! §9: "any full-featured templating is overkill"). `{{{key}}}` renders the
//! raw stringified value (for prompts); `{{key}}` HTML-escapes it. Missing
//! keys, `null`, and missing values all render as empty string.

use serde_json::Value;
use std::collections::HashMap;

pub fn render(template: &str, context: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if template[i..].starts_with("{{{") {
            if let Some(rel_end) = template[i + 3..].find("}}}") {
                let key = template[i + 3..i + 3 + rel_end].trim();
                out.push_str(&stringify(context.get(key)));
                i += 3 + rel_end + 3;
                continue;
            }
        }
        if template[i..].starts_with("{{") {
            if let Some(rel_end) = template[i + 2..].find("}}") {
                let key = template[i + 2..i + 2 + rel_end].trim();
                out.push_str(&escape(&stringify(context.get(key))));
                i += 2 + rel_end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().expect("i < len implies a char");
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Object(_) | Value::Array(_))) => v.to_string(),
        Some(v) => v.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn missing_key_renders_empty() {
        assert_eq!(render("hello {{name}}!", &HashMap::new()), "hello !");
    }

    #[test]
    fn null_renders_empty() {
        let context = ctx(&[("name", Value::Null)]);
        assert_eq!(render("hi {{name}}", &context), "hi ");
    }

    #[test]
    fn double_brace_escapes_html() {
        let context = ctx(&[("x", json!("<b>hi</b>"))]);
        assert_eq!(render("{{x}}", &context), "&lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn triple_brace_is_raw() {
        let context = ctx(&[("x", json!("<b>hi</b>"))]);
        assert_eq!(render("{{{x}}}", &context), "<b>hi</b>");
    }

    #[test]
    fn nested_object_renders_as_json_text() {
        let context = ctx(&[("x", json!({"a": 1}))]);
        assert_eq!(render("{{{x}}}", &context), "{\"a\":1}");
    }

    #[test]
    fn multiple_substitutions_in_one_template() {
        let context = ctx(&[("a", json!("1")), ("b", json!("2"))]);
        assert_eq!(render("{{a}}-{{b}}", &context), "1-2");
    }
}
