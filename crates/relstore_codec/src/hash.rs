//! Stored record hashes.

use crate::error::{CodecError, CodecResult};
use crate::key::{CompositeId, PrimitiveId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field holding the owning type's tag. The secondary index is built on it.
pub const TYPE_FIELD: &str = "_type";

/// Field holding the `[type_tag, primitive_id]` primary key.
pub const ID_FIELD: &str = "id";

/// The persisted form of a record: field name to value.
///
/// A hash is only accepted by a store once [`StoredHash::validate`] passes,
/// i.e. it carries a non-null `_type` and a well-formed `id` whose type tag
/// agrees with `_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredHash(BTreeMap<String, Value>);

impl StoredHash {
    /// Creates an empty hash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Gets a field mutably.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Returns true if the field is present (even if null).
    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the hash has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the `_type` tag, if set to text.
    pub fn type_tag(&self) -> Option<&str> {
        self.get(TYPE_FIELD).and_then(Value::as_text)
    }

    /// Parses the `id` field, if present and well formed.
    pub fn composite_id(&self) -> Option<CompositeId> {
        self.get(ID_FIELD)
            .and_then(|v| CompositeId::from_value(v).ok())
    }

    /// Returns the primitive part of the `id` field.
    pub fn primitive_id(&self) -> Option<PrimitiveId> {
        self.composite_id().map(|id| id.into_parts().1)
    }

    /// Sets both identity fields from a composite id.
    pub fn set_identity(&mut self, id: &CompositeId) {
        self.insert(ID_FIELD, id.to_value());
        self.insert(TYPE_FIELD, id.type_tag());
    }

    /// Checks the identity invariant and returns the key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHash` if `_type` is missing or not text, if `id` is
    /// missing or malformed, or if the two disagree on the type tag.
    pub fn validate(&self) -> CodecResult<CompositeId> {
        let type_tag = self
            .type_tag()
            .ok_or_else(|| CodecError::invalid_hash("missing or non-text _type"))?;
        let raw_id = self
            .get(ID_FIELD)
            .ok_or_else(|| CodecError::invalid_hash("missing id"))?;
        let id = CompositeId::from_value(raw_id)
            .map_err(|e| CodecError::invalid_hash(e.to_string()))?;
        if id.type_tag() != type_tag {
            return Err(CodecError::invalid_hash(format!(
                "_type {type_tag:?} does not match id type {:?}",
                id.type_tag()
            )));
        }
        Ok(id)
    }

    /// Consumes the hash, returning the field map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for StoredHash {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StoredHash {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<StoredHash> for Value {
    fn from(hash: StoredHash) -> Self {
        Value::Map(hash.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> StoredHash {
        let mut hash = StoredHash::new();
        hash.set_identity(&CompositeId::new("Post", id));
        hash.insert("title", "Hello");
        hash
    }

    #[test]
    fn identity_fields() {
        let hash = post("1");
        assert_eq!(hash.type_tag(), Some("Post"));
        assert_eq!(hash.composite_id(), Some(CompositeId::new("Post", "1")));
        assert_eq!(hash.primitive_id(), Some(PrimitiveId::from("1")));
        assert_eq!(hash.validate().unwrap(), CompositeId::new("Post", "1"));
    }

    #[test]
    fn validate_requires_type() {
        let mut hash = post("1");
        hash.remove(TYPE_FIELD);
        assert!(matches!(hash.validate(), Err(CodecError::InvalidHash { .. })));

        hash.insert(TYPE_FIELD, Value::Null);
        assert!(hash.validate().is_err());
    }

    #[test]
    fn validate_requires_id() {
        let mut hash = post("1");
        hash.remove(ID_FIELD);
        assert!(hash.validate().is_err());
        assert_eq!(hash.primitive_id(), None);
    }

    #[test]
    fn validate_rejects_mismatched_type() {
        let mut hash = post("1");
        hash.insert(TYPE_FIELD, "Comment");
        assert!(hash.validate().is_err());
    }
}
