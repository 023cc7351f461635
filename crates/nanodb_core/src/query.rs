//! Equality filters and update merging.
//!
//! A filter is itself a document. A candidate matches when, for every field
//! in the filter, the candidate has that field and the two values are deeply
//! equal. The empty filter matches everything.
//!
//! Equality is structural, with one relaxation: documents arrive as JSON,
//! which has a single number type, so `Integer(n)` equals `Float(f)` when
//! `f` is exactly the integer `n`.

use crate::id::ID_FIELD;
use nanodb_codec::{Document, Value};

/// Returns whether `doc` satisfies `filter`.
#[must_use]
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, expected)| {
        doc.get(field)
            .is_some_and(|actual| values_equal(actual, expected))
    })
}

/// Deep equality between two values.
///
/// Objects compare regardless of field order; arrays compare element by
/// element in order.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
            integer_equals_float(*i, *f)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(field, xv)| y.get(field).is_some_and(|yv| values_equal(xv, yv)))
        }
        _ => a == b,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integer_equals_float(i: i64, f: f64) -> bool {
    // [-2^63, 2^63) is exactly the range where `as i64` does not saturate.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) && f as i64 == i
}

/// Shallow-merges `spec` into `target`.
///
/// Each field of `spec` replaces the same-named field of `target` (or is
/// added); fields not named are kept. The reserved `id` field is ignored.
pub fn apply_update(target: &mut Document, spec: &Document) {
    for (field, value) in spec {
        if field != ID_FIELD {
            target.insert(field.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanodb_codec::doc;
    use proptest::prelude::*;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! {}, &doc! {}));
        assert!(matches(&doc! { "a" => 1 }, &doc! {}));
    }

    #[test]
    fn missing_field_and_type_mismatch() {
        let user = doc! { "name" => "Kichu", "role" => "Dev", "age" => 30 };
        assert!(matches(&user, &doc! { "role" => "Dev" }));
        assert!(!matches(&user, &doc! { "team" => "Core" }));
        assert!(!matches(&user, &doc! { "age" => "30" }));
        assert!(!matches(&user, &doc! { "role" => "Dev", "age" => 31 }));
        assert!(!matches(&user, &doc! { "role" => () }));
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert!(values_equal(&Value::Integer(3), &Value::Float(3.0)));
        assert!(values_equal(&Value::Float(-0.0), &Value::Integer(0)));
        assert!(!values_equal(&Value::Integer(3), &Value::Float(3.5)));
        assert!(!values_equal(
            &Value::Integer(i64::MAX),
            &Value::Float(9_223_372_036_854_775_808.0)
        ));
        assert!(!values_equal(
            &Value::Integer((1 << 53) + 1),
            &Value::Float(9_007_199_254_740_992.0)
        ));
        assert!(!values_equal(&Value::Integer(1), &Value::Bool(true)));
    }

    #[test]
    fn nested_values_compare_deeply() {
        let stored = doc! {
            "tags" => vec!["a", "b"],
            "address" => doc! { "city" => "Kochi", "zip" => 682_001 },
        };
        assert!(matches(
            &stored,
            &doc! { "address" => doc! { "zip" => 682_001.0, "city" => "Kochi" } }
        ));
        assert!(!matches(&stored, &doc! { "address" => doc! { "city" => "Kochi" } }));
        assert!(matches(&stored, &doc! { "tags" => vec!["a", "b"] }));
        assert!(!matches(&stored, &doc! { "tags" => vec!["b", "a"] }));
        assert!(!matches(&stored, &doc! { "tags" => vec!["a"] }));
    }

    #[test]
    fn update_merges_shallowly_and_keeps_id() {
        let mut target = doc! {
            "id" => 4,
            "name" => "Kichu",
            "profile" => doc! { "lang" => "rust", "level" => 1 },
        };
        apply_update(
            &mut target,
            &doc! { "id" => 99, "role" => "Lead", "profile" => doc! { "level" => 2 } },
        );

        assert_eq!(target.get("id"), Some(&Value::Integer(4)));
        assert_eq!(target.get("name"), Some(&Value::from("Kichu")));
        assert_eq!(target.get("role"), Some(&Value::from("Lead")));
        // Nested objects are replaced, not merged.
        assert_eq!(
            target.get("profile"),
            Some(&Value::from(doc! { "level" => 2 }))
        );
    }

    fn document_strategy() -> impl Strategy<Value = Document> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1000i64..1000).prop_map(Value::Integer),
            (-1000.0f64..1000.0).prop_map(Value::Float),
            "[a-z]{0,6}".prop_map(Value::Text),
        ];
        let value = leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(Document::from(m))),
            ]
        });
        prop::collection::btree_map("[a-z]{1,4}", value, 0..6).prop_map(Document::from)
    }

    proptest! {
        #[test]
        fn document_matches_itself_and_its_subsets(doc in document_strategy(), keep in any::<u64>()) {
            prop_assert!(matches(&doc, &doc));

            let subset: Document = doc
                .iter()
                .enumerate()
                .filter(|(i, _)| keep & (1 << (i % 64)) != 0)
                .map(|(_, (k, v))| (k.clone(), v.clone()))
                .collect();
            prop_assert!(matches(&doc, &subset));
        }

        #[test]
        fn extra_filter_field_never_matches(doc in document_strategy(), value in any::<i64>()) {
            let mut filter = doc.clone();
            filter.insert("not_a_field_name", value);
            prop_assert!(!matches(&doc, &filter));
        }

        #[test]
        fn update_then_match(mut doc in document_strategy(), spec in document_strategy()) {
            apply_update(&mut doc, &spec);
            let mut expected = spec.clone();
            expected.remove("id");
            prop_assert!(matches(&doc, &expected));
        }
    }
}
