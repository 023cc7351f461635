//! Schemaless documents.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// A schemaless record: field names mapped to [`Value`]s.
///
/// Fields are kept sorted by name, so two documents with the same fields
/// compare equal regardless of the order the fields were written in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `field`, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a mutable reference to the value of `field`, if present.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Sets `field` to `value`, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Removes `field`, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Checks whether `field` is present.
    #[must_use]
    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Checks whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Iterates over field names in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
        self.fields.keys()
    }

    /// Parses a JSON object into a document.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] for malformed JSON and
    /// [`CodecError::NotAnObject`] when the top-level JSON value is not an
    /// object.
    pub fn from_json_str(json: &str) -> CodecResult<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(doc) => Ok(doc),
            other => Err(CodecError::NotAnObject { found: other.kind() }),
        }
    }

    /// Renders this document as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if serialization fails.
    pub fn to_json_string(&self) -> CodecResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Document {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.fields
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Parses a JSON array of objects, as sent for batch inserts.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON, or
/// [`CodecError::NotAnObject`] if the input is not an array of objects.
pub fn documents_from_json_str(json: &str) -> CodecResult<Vec<Document>> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                other => Err(CodecError::NotAnObject { found: other.kind() }),
            })
            .collect(),
        other => Err(CodecError::NotAnObject { found: other.kind() }),
    }
}

/// Renders a list of documents as a JSON array.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn documents_to_json_string(docs: &[Document]) -> CodecResult<String> {
    Ok(serde_json::to_string(docs)?)
}

/// Builds a [`Document`] from `field => value` pairs.
///
/// ```
/// use nanodb_codec::{doc, Value};
///
/// let user = doc! { "name" => "Kichu", "role" => "Dev" };
/// assert_eq!(user.get("name"), Some(&Value::from("Kichu")));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::Document::new();
        $(document.insert($field, $value);)+
        document
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn field_order_does_not_affect_equality() {
        let a = doc! { "name" => "Kichu", "role" => "Dev" };
        let b = doc! { "role" => "Dev", "name" => "Kichu" };
        assert_eq!(a, b);
        assert_eq!(a.keys().collect::<Vec<_>>(), ["name", "role"]);
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut d = doc! { "n" => 1 };
        assert_eq!(d.insert("n", 2), Some(Value::Integer(1)));
        assert_eq!(d.remove("n"), Some(Value::Integer(2)));
        assert!(d.is_empty());
    }

    #[test]
    fn json_object_roundtrip() {
        let d = Document::from_json_str(
            r#"{"name":"User","index":7,"score":1.5,"tags":["a"],"meta":{"ok":true},"none":null}"#,
        )
        .unwrap();

        assert_eq!(d.get("index"), Some(&Value::Integer(7)));
        assert_eq!(d.get("score"), Some(&Value::Float(1.5)));
        assert_eq!(d.get("none"), Some(&Value::Null));
        assert_eq!(
            d.get("meta").and_then(|m| m.get("ok")),
            Some(&Value::Bool(true))
        );

        let back = Document::from_json_str(&d.to_json_string().unwrap()).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn json_non_object_rejected() {
        assert_eq!(
            Document::from_json_str("[1,2]"),
            Err(CodecError::NotAnObject { found: "array" })
        );
        assert!(matches!(
            Document::from_json_str("{not json"),
            Err(CodecError::Json { .. })
        ));
    }

    #[test]
    fn json_document_lists() {
        let docs = documents_from_json_str(r#"[{"a":1},{"b":"x"}]"#).unwrap();
        assert_eq!(docs, vec![doc! { "a" => 1 }, doc! { "b" => "x" }]);
        assert_eq!(
            documents_to_json_string(&docs).unwrap(),
            r#"[{"a":1},{"b":"x"}]"#
        );
        assert_eq!(
            documents_from_json_str(r#"[{"a":1},3]"#),
            Err(CodecError::NotAnObject { found: "integer" })
        );
        assert_eq!(documents_to_json_string(&[]).unwrap(), "[]");
    }

    #[test]
    fn collect_and_extend() {
        let mut d: Document = vec![("a", 1), ("b", 2)].into_iter().collect();
        d.extend([("c", 3)]);
        assert_eq!(d.len(), 3);
        assert!(d.contains_key("c"));
    }
}
