//! Runtime context: the mutable variable bag for one flow session.

use std::collections::HashMap;

use serde_json::Value;

use crate::expr::Scope;
use crate::expr::eval::lookup_path;

/// Per-session variable bag plus the session locale.
///
/// One context per running session; it is mutated by almost every node
/// handler and read by the evaluator and template renderer. Sessions never
/// share a context.
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    variables: HashMap<String, Value>,
    locale: String,
}

impl RuntimeContext {
    /// Create an empty context with no locale preference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty context for the given locale.
    pub fn with_locale(locale: impl Into<String>) -> Self {
        Self {
            variables: HashMap::new(),
            locale: locale.into(),
        }
    }

    /// The session locale used to pick localized node text.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Override the session locale.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
    }

    /// Write a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Read a variable by exact name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Remove a variable, returning its prior value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    /// Resolve a dotted path (exact key first, then descent through objects
    /// and array indices).
    pub fn get_path(&self, path: &str) -> Option<Value> {
        lookup_path(|key| self.variables.get(key), path)
    }

    /// Borrow the raw variable map.
    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Export a snapshot of the variable bag for external inspection (e.g. a
    /// debug panel). The snapshot is detached: later mutation is not
    /// reflected.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.variables
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

impl Scope for RuntimeContext {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_remove_roundtrip() {
        let mut ctx = RuntimeContext::new();
        ctx.set("name", json!("Ana"));
        assert_eq!(ctx.get("name"), Some(&json!("Ana")));
        assert_eq!(ctx.remove("name"), Some(json!("Ana")));
        assert_eq!(ctx.get("name"), None);
    }

    #[test]
    fn path_lookup_descends_nested_values() {
        let mut ctx = RuntimeContext::new();
        ctx.set("user", json!({"tags": ["vip", "beta"]}));
        assert_eq!(ctx.get_path("user.tags.1"), Some(json!("beta")));
        assert_eq!(ctx.get_path("user.missing"), None);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ctx = RuntimeContext::new();
        ctx.set("n", json!(1));
        let snapshot = ctx.snapshot();
        ctx.set("n", json!(2));
        assert_eq!(snapshot, json!({"n": 1}));
    }
}
