//! Record identity.

use crate::config::IdFormat;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use relstore_codec::{CompositeId, PrimitiveId};
use uuid::Uuid;

/// Builds the storage key for a type tag and primitive id.
pub fn composite_id(type_tag: impl Into<String>, id: impl Into<PrimitiveId>) -> CompositeId {
    CompositeId::new(type_tag, id)
}

/// Returns the storage key of a record.
///
/// # Errors
///
/// Returns `Identity` if the record has no id yet.
pub fn composite_id_of<R: Record + ?Sized>(record: &R) -> CoreResult<CompositeId> {
    record
        .id()
        .map(|id| CompositeId::new(record.type_tag(), id.clone()))
        .ok_or_else(|| CoreError::identity(record.type_tag()))
}

/// Generates a fresh client-side id: a random (v4) UUID in `format`.
///
/// Collisions are not checked for.
#[must_use]
pub fn generate_id(format: IdFormat) -> String {
    format.render(Uuid::new_v4())
}
