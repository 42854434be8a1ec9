//! Documents and the keys that identify them.
//!
//! A [`Document`] is an ordered field mapping backed by a JSON object. One
//! field (chosen by whichever operand produced it) holds the document's
//! identity; its value, wrapped as a [`Key`], is what fusion deduplicates on.
//! The [`SIMILARITY`] field holds the score assigned by the last stage that
//! ranked the document.

use crate::error::FusionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Field holding a document's score. Higher is better.
pub const SIMILARITY: &str = "similarity";

/// An ordered field-name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, mostly for tests and fixtures.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// The key stored under `field`, if present.
    #[must_use]
    pub fn key(&self, field: &str) -> Option<Key> {
        self.0.get(field).cloned().map(Key)
    }

    /// Like [`Document::key`], but a missing field is a contract violation
    /// attributed to `source_name`.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::MissingKey`] when `field` is absent.
    pub fn require_key(&self, field: &str, source_name: &str) -> Result<Key, FusionError> {
        self.key(field).ok_or_else(|| FusionError::MissingKey {
            source_name: source_name.to_string(),
            field: field.to_string(),
        })
    }

    /// The numeric similarity, if present and numeric.
    #[must_use]
    pub fn similarity(&self) -> Option<f64> {
        self.0.get(SIMILARITY).and_then(Value::as_f64)
    }

    /// Replace the similarity with `score`. Non-finite scores serialize as
    /// `null`.
    pub fn set_similarity(&mut self, score: f64) {
        self.0.insert(SIMILARITY.to_string(), Value::from(score));
    }

    #[must_use]
    pub fn with_similarity(mut self, score: f64) -> Self {
        self.set_similarity(score);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = FusionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(FusionError::NotAnObject),
        }
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Self::Object(document.0)
    }
}

/// The value of a document's identity field.
///
/// Keys compare by JSON value equality: `1` and `"1"` are different keys, as
/// are `1` and `1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(Value);

impl Key {
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(Value::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Value::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

// Must agree with `Value`'s equality. Object equality ignores field order, so
// objects only contribute their length.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0_u8.hash(state),
        Value::Bool(b) => {
            1_u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2_u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3_u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4_u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5_u8.hash(state);
            map.len().hash(state);
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn key_equality_is_by_value() {
        let a = Document::new().with("id", 7);
        let b = Document::new().with("id", 7).with("title", "other");
        assert_eq!(a.key("id"), b.key("id"));

        let mut keys = HashSet::new();
        keys.insert(a.key("id").expect("key"));
        assert!(!keys.insert(b.key("id").expect("key")));
    }

    #[test]
    fn numeric_and_string_keys_differ() {
        assert_ne!(Key::from(1_i64), Key::from("1"));
    }

    #[test]
    fn object_keys_hash_consistently_regardless_of_field_order() {
        let a = Key::new(json!({"a": 1, "b": 2}));
        let b = Key::new(json!({"b": 2, "a": 1}));
        assert_eq!(a, b);

        let mut keys = HashSet::new();
        keys.insert(a);
        assert!(keys.contains(&b));
    }

    #[test]
    fn require_key_reports_source() {
        let doc = Document::new().with("title", "no id");
        let err = doc.require_key("id", "bm25").expect_err("missing key");
        assert_eq!(
            err,
            FusionError::MissingKey {
                source_name: "bm25".into(),
                field: "id".into()
            }
        );
    }

    #[test]
    fn similarity_roundtrips_through_field() {
        let mut doc = Document::new().with("id", "a").with(SIMILARITY, "high");
        assert_eq!(doc.similarity(), None);

        doc.set_similarity(0.25);
        assert_eq!(doc.similarity(), Some(0.25));
    }

    #[test]
    fn field_order_is_preserved() {
        let doc = Document::new().with("z", 1).with("a", 2).with("m", 3);
        let names: Vec<&str> = doc.fields().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn non_object_values_are_rejected() {
        assert_eq!(
            Document::try_from(json!([1, 2])),
            Err(FusionError::NotAnObject)
        );
        let doc = Document::try_from(json!({"id": 1})).expect("object");
        assert_eq!(doc.key("id"), Some(Key::from(1_i64)));
    }

    #[test]
    fn display_strips_string_quotes() {
        assert_eq!(Key::from("bn-001").to_string(), "bn-001");
        assert_eq!(Key::from(3_i64).to_string(), "3");
    }
}
