use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::DeepReadError;

/// String-keyed bag of values flowing between steps.
///
/// Each step reads what it needs and returns a fresh context with what it
/// produced; the executor merges that output on top of the accumulated
/// context, so later writers win.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipelineContext {
    values: Map<String, Value>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// A non-empty string value. Empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get_str(key).map(PathBuf::from)
    }

    /// Like [`get_str`](Self::get_str) but a missing value is a
    /// precondition failure attributed to `step`.
    pub fn require_str(&self, step: &str, key: &str) -> Result<&str, DeepReadError> {
        self.get_str(key)
            .ok_or_else(|| DeepReadError::missing_key(step, key))
    }

    /// Overlay `other` on `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: PipelineContext) {
        self.values.extend(other.values);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for PipelineContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_last_writer_wins() {
        let mut ctx = PipelineContext::new().with("x", 1).with("keep", "a");
        ctx.merge(PipelineContext::new().with("x", 2).with("new", true));

        assert_eq!(ctx.get("x"), Some(&json!(2)));
        assert_eq!(ctx.get_str("keep"), Some("a"));
        assert_eq!(ctx.get("new"), Some(&json!(true)));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn empty_strings_are_absent() {
        let ctx = PipelineContext::new().with("summary", "");
        assert_eq!(ctx.get_str("summary"), None);
        let err = ctx.require_str("save summary", "summary").unwrap_err();
        assert!(matches!(err, DeepReadError::MissingContextKey { .. }));
    }

    #[test]
    fn typed_accessors() {
        let ctx = PipelineContext::new()
            .with("markdown_length", 42u64)
            .with("markdown_path", "/tmp/full.md");
        assert_eq!(ctx.get_u64("markdown_length"), Some(42));
        assert_eq!(ctx.get_path("markdown_path"), Some(PathBuf::from("/tmp/full.md")));
        assert_eq!(ctx.get_u64("markdown_path"), None);
    }

    #[test]
    fn serializes_as_flat_object() {
        let ctx = PipelineContext::new().with("a", 1);
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"a": 1}));
    }
}
