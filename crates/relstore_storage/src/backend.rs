//! Object store trait definitions.

use crate::error::StoreResult;
use async_trait::async_trait;
use relstore_codec::{CompositeId, StoredHash};

/// A single logical object store keyed by [`CompositeId`].
///
/// The store keeps every hash under the key found in its `id` field and
/// maintains a non-unique secondary index on its `_type` field. This is the
/// layout the schema bootstrap guarantees; stores in this crate create it
/// implicitly.
///
/// # Invariants
///
/// - Only hashes passing [`StoredHash::validate`] are accepted
/// - Each call completes exactly once, with a value or an error
/// - Deleting an absent key succeeds
/// - Implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::MemoryObjectStore`] - For testing and ephemeral data
/// - [`super::LogObjectStore`] - Durable, file-backed
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Reads the hash stored under `id`.
    ///
    /// Returns `Ok(None)` if no record has that key.
    async fn get(&self, id: &CompositeId) -> StoreResult<Option<StoredHash>>;

    /// Stores a new hash.
    ///
    /// # Errors
    ///
    /// Returns `KeyConflict` if the key already exists.
    async fn add(&self, hash: StoredHash) -> StoreResult<()>;

    /// Stores a hash, replacing any existing one with the same key.
    async fn put(&self, hash: StoredHash) -> StoreResult<()>;

    /// Removes the hash stored under `id`.
    async fn delete(&self, id: &CompositeId) -> StoreResult<()>;

    /// Opens a forward cursor over every hash whose `_type` equals `type_tag`.
    async fn open_index_cursor(&self, type_tag: &str) -> StoreResult<Box<dyn IndexCursor>>;
}

/// A forward, non-restartable cursor over one value of the `_type` index.
///
/// `next` takes `&mut self`, so a step can only be requested once the
/// previous one has completed.
#[async_trait]
pub trait IndexCursor: Send {
    /// Advances the cursor.
    ///
    /// Returns `Ok(None)` once exhausted; exhaustion is terminal.
    async fn next(&mut self) -> StoreResult<Option<StoredHash>>;
}
