//! The record model seam.
//!
//! The record manager owns live records; the adapter only needs to read
//! their type, id, attribute values and relationship ids. [`Record`] is that
//! read-only view, and [`RecordSnapshot`] is an owned copy of it taken when a
//! batch is built.

use relstore_codec::{CompositeId, PrimitiveId, Value};
use std::collections::BTreeMap;

/// Cardinality of a relationship, seen from the record that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Holds at most one related id.
    BelongsTo,
    /// Holds an ordered list of related ids.
    HasMany,
}

/// Current value of one relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    /// The related record's id, if any.
    BelongsTo(Option<PrimitiveId>),
    /// Related record ids, in order.
    HasMany(Vec<PrimitiveId>),
}

impl Relationship {
    /// Returns the relationship kind.
    #[must_use]
    pub fn kind(&self) -> RelationshipKind {
        match self {
            Self::BelongsTo(_) => RelationshipKind::BelongsTo,
            Self::HasMany(_) => RelationshipKind::HasMany,
        }
    }

    /// Stored form: an id or null for belongs-to, an id array for has-many.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::BelongsTo(Some(id)) => id.to_value(),
            Self::BelongsTo(None) => Value::Null,
            Self::HasMany(ids) => Value::Array(ids.iter().map(PrimitiveId::to_value).collect()),
        }
    }
}

/// Read-only view of a record held by the record manager.
///
/// Attribute values are already converted to [`Value`]s.
pub trait Record {
    /// Type tag, e.g. `"Post"`.
    fn type_tag(&self) -> &str;

    /// Primitive id, or `None` if not yet assigned.
    fn id(&self) -> Option<&PrimitiveId>;

    /// Plain attribute values by field name.
    fn attributes(&self) -> &BTreeMap<String, Value>;

    /// Relationships by name.
    fn relationships(&self) -> &BTreeMap<String, Relationship>;
}

/// An owned copy of a record.
///
/// # Example
///
/// ```rust
/// use relstore_core::{Record, RecordSnapshot};
///
/// let comment = RecordSnapshot::new("Comment")
///     .with_id("c1")
///     .attribute("body", "First!")
///     .belongs_to("post", Some("1".into()));
///
/// assert_eq!(comment.type_tag(), "Comment");
/// assert_eq!(comment.relationships().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    type_tag: String,
    id: Option<PrimitiveId>,
    attributes: BTreeMap<String, Value>,
    relationships: BTreeMap<String, Relationship>,
}

impl RecordSnapshot {
    /// Creates an empty record of the given type with no id.
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: None,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Copies any [`Record`].
    pub fn capture<R: Record + ?Sized>(record: &R) -> Self {
        Self {
            type_tag: record.type_tag().to_string(),
            id: record.id().cloned(),
            attributes: record.attributes().clone(),
            relationships: record.relationships().clone(),
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<PrimitiveId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets a belongs-to relationship.
    #[must_use]
    pub fn belongs_to(mut self, name: impl Into<String>, parent: Option<PrimitiveId>) -> Self {
        self.relationships
            .insert(name.into(), Relationship::BelongsTo(parent));
        self
    }

    /// Sets a has-many relationship.
    #[must_use]
    pub fn has_many<I, T>(mut self, name: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PrimitiveId>,
    {
        let ids = children.into_iter().map(Into::into).collect();
        self.relationships
            .insert(name.into(), Relationship::HasMany(ids));
        self
    }

    /// Assigns an id in place.
    pub fn set_id(&mut self, id: impl Into<PrimitiveId>) {
        self.id = Some(id.into());
    }

    /// Returns the composite key, if the record has an id.
    #[must_use]
    pub fn composite_id(&self) -> Option<CompositeId> {
        self.id
            .as_ref()
            .map(|id| CompositeId::new(self.type_tag.clone(), id.clone()))
    }

    /// Names of this record's belongs-to relationships.
    pub fn belongs_to_names(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|(_, rel)| rel.kind() == RelationshipKind::BelongsTo)
            .map(|(name, _)| name.as_str())
    }
}

impl Record for RecordSnapshot {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn id(&self) -> Option<&PrimitiveId> {
        self.id.as_ref()
    }

    fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    fn relationships(&self) -> &BTreeMap<String, Relationship> {
        &self.relationships
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_values() {
        assert_eq!(Relationship::BelongsTo(None).to_value(), Value::Null);
        assert_eq!(
            Relationship::BelongsTo(Some(7_i64.into())).to_value(),
            Value::Integer(7)
        );
        assert_eq!(
            Relationship::HasMany(vec!["a".into(), "b".into()]).to_value(),
            Value::from(vec!["a", "b"])
        );
    }

    #[test]
    fn snapshot_builder() {
        let post = RecordSnapshot::new("Post")
            .with_id("1")
            .attribute("title", "Hello")
            .has_many("comments", ["c1", "c2"]);

        assert_eq!(post.composite_id(), Some(CompositeId::new("Post", "1")));
        assert_eq!(post.attributes().get("title"), Some(&Value::from("Hello")));
        assert_eq!(
            post.relationships().get("comments").map(Relationship::kind),
            Some(RelationshipKind::HasMany)
        );
        assert_eq!(post.belongs_to_names().count(), 0);
    }

    #[test]
    fn capture_copies_everything() {
        let original = RecordSnapshot::new("Comment")
            .with_id("c1")
            .belongs_to("post", Some("1".into()));
        let copy = RecordSnapshot::capture(&original);
        assert_eq!(copy, original);
        assert_eq!(copy.belongs_to_names().collect::<Vec<_>>(), vec!["post"]);
    }

    #[test]
    fn unsaved_record_has_no_key() {
        assert_eq!(RecordSnapshot::new("Post").composite_id(), None);
    }
}
