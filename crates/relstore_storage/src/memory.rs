//! In-memory object store for testing.

use crate::backend::{IndexCursor, ObjectStore};
use crate::error::{StoreError, StoreResult};
use crate::table::{RecordTable, SharedTable, TableCursor};
use async_trait::async_trait;
use relstore_codec::{CompositeId, StoredHash};
use std::sync::Arc;

/// An in-memory object store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral data that doesn't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
///
/// # Example
///
/// ```rust
/// use relstore_codec::{CompositeId, StoredHash};
/// use relstore_storage::{MemoryObjectStore, ObjectStore};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = MemoryObjectStore::new();
/// let mut hash = StoredHash::new();
/// hash.set_identity(&CompositeId::new("Post", "1"));
/// store.put(hash.clone()).await.unwrap();
/// assert_eq!(store.get(&CompositeId::new("Post", "1")).await.unwrap(), Some(hash));
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryObjectStore {
    shared: Arc<SharedTable>,
}

impl MemoryObjectStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Creates a new empty store with a name used in logs and errors.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SharedTable::new(name, RecordTable::default())),
        }
    }

    /// Creates a store pre-loaded with hashes.
    ///
    /// Useful for seeding "unloaded" records in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if any hash fails validation.
    pub fn with_records(records: impl IntoIterator<Item = StoredHash>) -> StoreResult<Self> {
        let mut table = RecordTable::default();
        for hash in records {
            let id = hash.validate()?;
            table.insert(id, hash);
        }
        Ok(Self {
            shared: Arc::new(SharedTable::new("memory", table)),
        })
    }

    /// Returns a copy of every stored hash, in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredHash> {
        self.shared.table.read().values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.table.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.shared.table.write().clear();
    }

    /// Closes the store. Every later operation, including steps of cursors
    /// that are already open, fails with `Unavailable`.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        self.shared.name()
    }

    async fn get(&self, id: &CompositeId) -> StoreResult<Option<StoredHash>> {
        self.shared.ensure_open()?;
        Ok(self.shared.table.read().get(id).cloned())
    }

    async fn add(&self, hash: StoredHash) -> StoreResult<()> {
        self.shared.ensure_open()?;
        let id = hash.validate()?;
        let mut table = self.shared.table.write();
        if table.contains(&id) {
            return Err(StoreError::KeyConflict { id });
        }
        table.insert(id, hash);
        Ok(())
    }

    async fn put(&self, hash: StoredHash) -> StoreResult<()> {
        self.shared.ensure_open()?;
        let id = hash.validate()?;
        self.shared.table.write().insert(id, hash);
        Ok(())
    }

    async fn delete(&self, id: &CompositeId) -> StoreResult<()> {
        self.shared.ensure_open()?;
        self.shared.table.write().remove(id);
        Ok(())
    }

    async fn open_index_cursor(&self, type_tag: &str) -> StoreResult<Box<dyn IndexCursor>> {
        let cursor = TableCursor::open(Arc::clone(&self.shared), type_tag)?;
        Ok(Box::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_codec::Value;

    fn post(id: &str, title: &str) -> StoredHash {
        let mut hash = StoredHash::new();
        hash.set_identity(&CompositeId::new("Post", id));
        hash.insert("title", title);
        hash
    }

    #[tokio::test]
    async fn memory_new_is_empty() {
        let store = MemoryObjectStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(&CompositeId::new("Post", "1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_put_then_get() {
        let store = MemoryObjectStore::new();
        store.put(post("1", "a")).await.unwrap();
        let got = store.get(&CompositeId::new("Post", "1")).await.unwrap();
        assert_eq!(got.unwrap().get("title"), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn memory_put_replaces() {
        let store = MemoryObjectStore::new();
        store.put(post("1", "a")).await.unwrap();
        store.put(post("1", "b")).await.unwrap();
        assert_eq!(store.len(), 1);
        let got = store.get(&CompositeId::new("Post", "1")).await.unwrap();
        assert_eq!(got.unwrap().get("title"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn memory_add_conflicts_on_existing_key() {
        let store = MemoryObjectStore::new();
        store.add(post("1", "a")).await.unwrap();
        let result = store.add(post("1", "b")).await;
        assert!(matches!(result, Err(StoreError::KeyConflict { .. })));
    }

    #[tokio::test]
    async fn memory_rejects_hash_without_identity() {
        let store = MemoryObjectStore::new();
        let mut hash = StoredHash::new();
        hash.insert("title", "orphan");
        assert!(matches!(store.put(hash).await, Err(StoreError::Codec(_))));
    }

    #[tokio::test]
    async fn memory_delete_missing_is_ok() {
        let store = MemoryObjectStore::new();
        store.delete(&CompositeId::new("Post", "9")).await.unwrap();
    }

    #[tokio::test]
    async fn memory_cursor_visits_only_requested_type() {
        let store = MemoryObjectStore::new();
        store.put(post("2", "b")).await.unwrap();
        store.put(post("1", "a")).await.unwrap();
        let mut comment = StoredHash::new();
        comment.set_identity(&CompositeId::new("Comment", "c1"));
        store.put(comment).await.unwrap();

        let mut cursor = store.open_index_cursor("Post").await.unwrap();
        let mut seen = Vec::new();
        while let Some(hash) = cursor.next().await.unwrap() {
            seen.push(hash.primitive_id().unwrap().to_string());
        }
        assert_eq!(seen, vec!["1", "2"]);
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_closed_store_is_unavailable() {
        let store = MemoryObjectStore::new();
        store.close();
        assert!(!store.is_open());
        assert!(matches!(
            store.get(&CompositeId::new("Post", "1")).await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.open_index_cursor("Post").await.is_err());
    }

    #[tokio::test]
    async fn memory_with_records() {
        let store = MemoryObjectStore::with_records([post("1", "a"), post("2", "b")]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.snapshot()[0].primitive_id(), Some("1".into()));
    }
}
