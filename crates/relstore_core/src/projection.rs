//! Record projection: the stored shape of a record.
//!
//! A projected hash holds every attribute under its own name, each
//! belongs-to relationship as the related id (or null), and each has-many
//! relationship as an array of related ids. Relationship keys come from
//! [`FieldNaming`].

use crate::config::FieldNaming;
use crate::record::{Record, Relationship};
use relstore_codec::{CompositeId, PrimitiveId, StoredHash};

/// Projects a record into a storable hash.
///
/// With `include_id`, a record that has an id also gets its `id` and
/// `_type` fields set; otherwise neither is written.
pub fn to_storage_hash<R: Record + ?Sized>(
    record: &R,
    include_id: bool,
    naming: &FieldNaming,
) -> StoredHash {
    let mut hash = StoredHash::new();

    for (name, value) in record.attributes() {
        hash.insert(name.clone(), value.clone());
    }

    for (name, relationship) in record.relationships() {
        let key = match relationship {
            Relationship::BelongsTo(_) => naming.belongs_to_key(name),
            Relationship::HasMany(_) => naming.has_many_key(name),
        };
        hash.insert(key, relationship.to_value());
    }

    if include_id {
        if let Some(id) = record.id() {
            hash.set_identity(&CompositeId::new(record.type_tag(), id.clone()));
        }
    }

    hash
}

/// Returns the primitive id stored in a hash's `id` field.
///
/// Absent for hashes of records that were never persisted.
#[must_use]
pub fn extract_primitive_id(hash: &StoredHash) -> Option<PrimitiveId> {
    hash.primitive_id()
}
