//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random records, hashes and
//! predicates that keep the stored-layout invariants: every generated hash
//! carries a valid `id` and `_type`.

use proptest::prelude::*;
use relstore_codec::{CompositeId, PrimitiveId, StoredHash, Value, ID_FIELD, TYPE_FIELD};
use relstore_core::{Predicate, RecordSnapshot};
use std::collections::BTreeMap;

/// Strategy for generating type tags.
pub fn type_tag_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating field names that never collide with the
/// reserved `id` and `_type` fields.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be reserved", |s| {
            s != ID_FIELD && s != TYPE_FIELD
        })
}

/// Strategy for generating primitive ids, both integer and text.
pub fn primitive_id_strategy() -> impl Strategy<Value = PrimitiveId> {
    prop_oneof![
        any::<i64>().prop_map(PrimitiveId::Integer),
        prop::string::string_regex("[a-z0-9-]{1,36}")
            .expect("Invalid regex")
            .prop_map(PrimitiveId::Text),
    ]
}

/// Strategy for generating composite ids.
pub fn composite_id_strategy() -> impl Strategy<Value = CompositeId> {
    (type_tag_strategy(), primitive_id_strategy()).prop_map(|(tag, id)| CompositeId::new(tag, id))
}

/// Strategy for generating scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating values up to a few levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating attribute maps.
pub fn attributes_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..6)
}

/// Strategy for generating stored hashes of one type.
pub fn stored_hash_strategy(type_tag: &'static str) -> impl Strategy<Value = StoredHash> {
    (primitive_id_strategy(), attributes_strategy()).prop_map(move |(id, attributes)| {
        let mut hash = StoredHash::from(attributes);
        hash.set_identity(&CompositeId::new(type_tag, id));
        hash
    })
}

/// Strategy for generating records with an id, attributes and one
/// belongs-to and one has-many relationship.
pub fn record_strategy() -> impl Strategy<Value = RecordSnapshot> {
    (
        type_tag_strategy(),
        primitive_id_strategy(),
        attributes_strategy(),
        prop::option::of(primitive_id_strategy()),
        prop::collection::vec(primitive_id_strategy(), 0..5),
    )
        .prop_map(|(tag, id, attributes, parent, children)| {
            let mut record = RecordSnapshot::new(tag)
                .with_id(id)
                .belongs_to("owner", parent)
                .has_many("items", children);
            for (name, value) in attributes {
                record = record.attribute(name, value);
            }
            record
        })
}

/// Strategy for generating predicates over scalar fields.
pub fn predicate_strategy() -> impl Strategy<Value = Predicate> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..3)
}
