//! Template renderer: `{{expr}}` placeholder substitution.
//!
//! Strings are scanned for placeholder spans; each span's inner text is
//! evaluated (trimmed) against the scope and substituted in place. Non-scalar
//! results are JSON-stringified, evaluation failures become the empty string,
//! and the literal text around each span is always preserved. Arrays render
//! element-wise and plain objects render key-wise (recursively); every other
//! value passes through unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::eval::{Scope, to_display};

static SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern compiles"));

/// Render every `{{...}}` span inside a string.
pub fn render_str(text: &str, scope: &dyn Scope) -> String {
    SPAN.replace_all(text, |caps: &Captures<'_>| {
        let inner = caps[1].trim();
        match super::evaluate(inner, scope) {
            Ok(value) => to_display(&value),
            Err(err) => {
                tracing::warn!(expression = inner, error = %err, "template span failed to parse");
                String::new()
            }
        }
    })
    .into_owned()
}

/// Render placeholders recursively through a value.
pub fn render(value: &Value, scope: &dyn Scope) -> Value {
    match value {
        Value::String(text) => Value::String(render_str(text, scope)),
        Value::Array(items) => Value::Array(items.iter().map(|item| render(item, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), render(item, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}
