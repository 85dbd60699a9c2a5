//! Record keys.
//!
//! Every record is stored under a [`CompositeId`]: the pair of its type tag
//! and its [`PrimitiveId`]. On disk the key is the two-element array
//! `[type_tag, primitive_id]`.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::fmt;

/// The per-type identifier of a record: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveId {
    /// Integer identifier.
    Integer(i64),
    /// Text identifier (client-generated ids are UUID strings).
    Text(String),
}

impl PrimitiveId {
    /// Interprets a value as a primitive id.
    ///
    /// Only integers and text are valid ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Self::Integer(*n)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts this id into its stored value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Integer(*n),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }

    /// Parses a command-line style id: integers become `Integer`, anything
    /// else is kept as text.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse::<i64>()
            .map_or_else(|_| Self::Text(raw.to_string()), Self::Integer)
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PrimitiveId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PrimitiveId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for PrimitiveId {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<PrimitiveId> for Value {
    fn from(id: PrimitiveId) -> Self {
        match id {
            PrimitiveId::Integer(n) => Value::Integer(n),
            PrimitiveId::Text(s) => Value::Text(s),
        }
    }
}

/// The primary key of a stored record: `(type_tag, primitive_id)`.
///
/// Unique across the whole store. Ordered by type tag first, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeId {
    type_tag: String,
    id: PrimitiveId,
}

impl CompositeId {
    /// Creates a composite id from a type tag and a primitive id.
    pub fn new(type_tag: impl Into<String>, id: impl Into<PrimitiveId>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: id.into(),
        }
    }

    /// Returns the type tag.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Returns the primitive id.
    pub fn id(&self) -> &PrimitiveId {
        &self.id
    }

    /// Splits into its parts.
    pub fn into_parts(self) -> (String, PrimitiveId) {
        (self.type_tag, self.id)
    }

    /// Encodes as the stored `[type_tag, id]` array.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![Value::Text(self.type_tag.clone()), self.id.to_value()])
    }

    /// Decodes the stored `[type_tag, id]` array.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` unless the value is a two-element array of a
    /// text tag and a text or integer id.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        let parts = value
            .as_array()
            .ok_or_else(|| CodecError::invalid_key(format!("expected array, got {}", value.kind())))?;

        match parts {
            [Value::Text(type_tag), raw_id] => {
                let id = PrimitiveId::from_value(raw_id).ok_or_else(|| {
                    CodecError::invalid_key(format!("id must be text or integer, got {}", raw_id.kind()))
                })?;
                Ok(Self::new(type_tag.clone(), id))
            }
            _ => Err(CodecError::invalid_key(format!(
                "expected [type, id], got {value}"
            ))),
        }
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_tag, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_roundtrip() {
        let key = CompositeId::new("Post", "1");
        assert_eq!(CompositeId::from_value(&key.to_value()).unwrap(), key);

        let numeric = CompositeId::new("Post", 7i64);
        assert_eq!(CompositeId::from_value(&numeric.to_value()).unwrap(), numeric);
    }

    #[test]
    fn text_and_integer_ids_are_distinct() {
        assert_ne!(CompositeId::new("Post", "1"), CompositeId::new("Post", 1i64));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(CompositeId::from_value(&Value::Text("Post".into())).is_err());
        assert!(CompositeId::from_value(&Value::from(vec!["Post"])).is_err());
        assert!(CompositeId::from_value(&Value::Array(vec![
            Value::Integer(1),
            Value::Integer(2)
        ]))
        .is_err());
        assert!(CompositeId::from_value(&Value::Array(vec![
            Value::Text("Post".into()),
            Value::Null
        ]))
        .is_err());
    }

    #[test]
    fn ordering_groups_by_type() {
        let mut keys = vec![
            CompositeId::new("Post", "2"),
            CompositeId::new("Comment", "9"),
            CompositeId::new("Post", "1"),
        ];
        keys.sort();
        assert_eq!(keys[0].type_tag(), "Comment");
        assert_eq!(keys[1], CompositeId::new("Post", "1"));
    }

    #[test]
    fn lenient_parse() {
        assert_eq!(PrimitiveId::parse_lenient("42"), PrimitiveId::Integer(42));
        assert_eq!(PrimitiveId::parse_lenient("c1"), PrimitiveId::Text("c1".into()));
    }

    #[test]
    fn display() {
        assert_eq!(CompositeId::new("Post", "1").to_string(), "Post:1");
    }
}
