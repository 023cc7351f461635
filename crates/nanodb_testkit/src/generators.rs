//! Property-based test generators using proptest.

use nanodb_codec::{Document, Value};
use proptest::prelude::*;

/// Generates document field values, nested up to three levels.
///
/// Floats are finite and never integral, so a generated float never
/// compares equal to a generated integer.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000i64..1_000).prop_map(Value::Integer),
        (-1_000i64..1_000).prop_map(|n| Value::Float(n as f64 + 0.5)),
        "[a-zA-Z0-9 ]{0,10}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,5}", inner, 0..4)
                .prop_map(|fields| Value::Object(Document::from(fields))),
        ]
    })
}

/// Generates documents without an `id` field.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z]{1,5}", value_strategy(), 0..6).prop_map(|mut fields| {
        fields.remove("id");
        Document::from(fields)
    })
}

/// Generates small flat documents drawn from few fields and values, so
/// filters built from them match a useful share of a collection.
pub fn flat_document_strategy() -> impl Strategy<Value = Document> {
    let field = prop_oneof![Just("team"), Just("level"), Just("active")];
    let value = prop_oneof![
        Just(Value::from("core")),
        Just(Value::from("web")),
        (0i64..3).prop_map(Value::Integer),
        any::<bool>().prop_map(Value::Bool),
    ];
    prop::collection::btree_map(field, value, 0..3)
        .prop_map(|fields| fields.into_iter().collect::<Document>())
}

/// Generates valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,31}"
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert a document.
    Insert(Document),
    /// Update the live document at this position (modulo the live count).
    Update(usize, Document),
    /// Delete the live document at this position (modulo the live count).
    Delete(usize),
    /// Update every document matching the filter.
    UpdateMany(Document, Document),
    /// Delete every document matching the filter.
    DeleteMany(Document),
}

/// Generates a single operation; inserts are the most common.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => flat_document_strategy().prop_map(Operation::Insert),
        2 => (any::<usize>(), flat_document_strategy())
            .prop_map(|(at, spec)| Operation::Update(at, spec)),
        2 => any::<usize>().prop_map(Operation::Delete),
        1 => (flat_document_strategy(), flat_document_strategy())
            .prop_map(|(filter, spec)| Operation::UpdateMany(filter, spec)),
        1 => flat_document_strategy().prop_map(Operation::DeleteMany),
    ]
}

/// Generates a sequence of operations.
pub fn operation_sequence_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(), 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanodb_core::validate_collection_name;

    proptest! {
        #[test]
        fn generated_names_are_valid(name in collection_name_strategy()) {
            prop_assert!(validate_collection_name(&name).is_ok());
        }

        #[test]
        fn generated_documents_have_no_id(doc in document_strategy()) {
            prop_assert!(!doc.contains_key("id"));
        }
    }
}
