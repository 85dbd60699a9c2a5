//! Test fixtures and adapter helpers.
//!
//! Provides adapters over throwaway stores and a small blog schema:
//! a `Post` has many `comments` and a `Comment` belongs to a `post`.

use relstore_codec::{CompositeId, PrimitiveId, StoredHash, Value};
use relstore_core::{
    to_storage_hash, Adapter, Config, FieldNaming, RecordRef, RecordSnapshot, RelationshipChange,
};
use relstore_storage::{LogObjectStore, LogStoreOptions, MemoryObjectStore, ObjectStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Type tag of blog posts.
pub const POST: &str = "Post";
/// Type tag of comments.
pub const COMMENT: &str = "Comment";
/// Has-many relationship from a post to its comments.
pub const COMMENTS: &str = "comments";
/// Belongs-to relationship from a comment to its post.
pub const POST_FIELD: &str = "post";

/// A test adapter with automatic cleanup.
pub struct TestAdapter {
    /// The adapter instance.
    pub adapter: Adapter,
    store: Arc<dyn ObjectStore>,
    log: Option<Arc<LogObjectStore>>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestAdapter {
    /// Creates an adapter over a fresh in-memory store.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryObjectStore::new()))
    }

    /// Creates an adapter over the given store.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            adapter: Adapter::new(Config::default(), Arc::clone(&store)),
            store,
            log: None,
            temp_dir: None,
        }
    }

    /// Creates an adapter over a log store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("store.rslog");
        Self::open_log(&path, Some(temp_dir))
    }

    fn open_log(path: &Path, temp_dir: Option<TempDir>) -> Self {
        let log = Arc::new(
            LogObjectStore::open(path, LogStoreOptions::default())
                .expect("Failed to open log store"),
        );
        let store: Arc<dyn ObjectStore> = log.clone();
        Self {
            adapter: Adapter::new(Config::default(), Arc::clone(&store)),
            store,
            log: Some(log),
            temp_dir,
        }
    }

    /// Closes a file-backed fixture and opens its log again.
    ///
    /// # Panics
    ///
    /// Panics for memory-backed fixtures.
    pub fn reopen(self) -> Self {
        let Self {
            adapter,
            store,
            log,
            temp_dir,
        } = self;
        let path = log
            .as_ref()
            .map(|log| log.path().to_path_buf())
            .expect("Only file-backed fixtures can be reopened");

        // Every handle must go before the lock can be taken again.
        drop(adapter);
        drop(store);
        drop(log);

        Self::open_log(&path, temp_dir)
    }

    /// Returns the log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.log.as_ref().map(|log| log.path().to_path_buf())
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Returns the log store, if file-based.
    pub fn log(&self) -> Option<&LogObjectStore> {
        self.log.as_deref()
    }

    /// Writes hashes straight to the store, bypassing the adapter.
    ///
    /// Seeded records model data persisted earlier that the record manager
    /// has not loaded.
    pub async fn seed(&self, hashes: impl IntoIterator<Item = StoredHash>) {
        for hash in hashes {
            self.store.put(hash).await.expect("Failed to seed record");
        }
    }

    /// Reads a hash straight from the store.
    pub async fn stored(&self, id: &CompositeId) -> Option<StoredHash> {
        self.store.get(id).await.expect("Failed to read record")
    }

    /// Reads a stored has-many field. Missing or null fields read as empty.
    ///
    /// # Panics
    ///
    /// Panics if the record is not stored or the field is not an id array.
    pub async fn has_many(&self, id: &CompositeId, field: &str) -> Vec<PrimitiveId> {
        let hash = self
            .stored(id)
            .await
            .unwrap_or_else(|| panic!("{id} is not stored"));
        match hash.get(field) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => value
                .as_array()
                .expect("has-many field is not an array")
                .iter()
                .map(|v| PrimitiveId::from_value(v).expect("has-many entry is not an id"))
                .collect(),
        }
    }

    /// Reads a stored belongs-to field.
    ///
    /// # Panics
    ///
    /// Panics if the record is not stored.
    pub async fn belongs_to(&self, id: &CompositeId, field: &str) -> Option<PrimitiveId> {
        let hash = self
            .stored(id)
            .await
            .unwrap_or_else(|| panic!("{id} is not stored"));
        hash.get(field).and_then(PrimitiveId::from_value)
    }
}

impl std::ops::Deref for TestAdapter {
    type Target = Adapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

/// Collects ids into a list of primitive ids.
pub fn id_list<I, T>(ids: I) -> Vec<PrimitiveId>
where
    I: IntoIterator<Item = T>,
    T: Into<PrimitiveId>,
{
    ids.into_iter().map(Into::into).collect()
}

/// Key of a post.
pub fn post_id(id: impl Into<PrimitiveId>) -> CompositeId {
    CompositeId::new(POST, id)
}

/// Key of a comment.
pub fn comment_id(id: impl Into<PrimitiveId>) -> CompositeId {
    CompositeId::new(COMMENT, id)
}

/// A post with a title and the given comments.
pub fn post(id: impl Into<PrimitiveId>, comments: &[&str]) -> RecordSnapshot {
    let id = id.into();
    RecordSnapshot::new(POST)
        .attribute("title", format!("Post {id}"))
        .has_many(COMMENTS, comments.iter().copied())
        .with_id(id)
}

/// A comment, optionally attached to a post.
pub fn comment(id: impl Into<PrimitiveId>, post: Option<&str>) -> RecordSnapshot {
    let id = id.into();
    RecordSnapshot::new(COMMENT)
        .attribute("body", format!("Comment {id}"))
        .belongs_to(POST_FIELD, post.map(PrimitiveId::from))
        .with_id(id)
}

/// The stored form of [`post`].
pub fn stored_post(id: impl Into<PrimitiveId>, comments: &[&str]) -> StoredHash {
    to_storage_hash(&post(id, comments), true, &FieldNaming::plain())
}

/// The stored form of [`comment`].
pub fn stored_comment(id: impl Into<PrimitiveId>, post: Option<&str>) -> StoredHash {
    to_storage_hash(&comment(id, post), true, &FieldNaming::plain())
}

/// A change of the `post`/`comments` relationship of one comment.
pub fn comment_change(
    child: RecordRef,
    old_parent: Option<RecordRef>,
    new_parent: Option<RecordRef>,
) -> Arc<RelationshipChange> {
    let mut change = RelationshipChange::new(POST_FIELD, COMMENTS).child(child);
    if let Some(parent) = old_parent {
        change = change.old_parent(parent);
    }
    if let Some(parent) = new_parent {
        change = change.new_parent(parent);
    }
    Arc::new(change)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A memory fixture holding `posts` unloaded posts, each with
    /// `comments_per_post` comments named `p{post}-c{n}`.
    pub async fn blog(posts: usize, comments_per_post: usize) -> TestAdapter {
        let fixture = TestAdapter::memory();
        for p in 0..posts {
            let post_key = p.to_string();
            let comment_ids: Vec<String> = (0..comments_per_post)
                .map(|c| format!("p{p}-c{c}"))
                .collect();
            let refs: Vec<&str> = comment_ids.iter().map(String::as_str).collect();

            fixture
                .seed(refs.iter().map(|c| stored_comment(*c, Some(post_key.as_str()))))
                .await;
            fixture.seed([stored_post(post_key.as_str(), &refs)]).await;
        }
        fixture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fixture_starts_empty() {
        let fixture = TestAdapter::memory();
        assert!(fixture.find_all(POST).await.unwrap().is_empty());
        assert!(fixture.path().is_none());
    }

    #[tokio::test]
    async fn seeded_records_are_readable() {
        let fixture = TestAdapter::memory();
        fixture.seed([stored_post("1", &["c1", "c2"])]).await;

        assert_eq!(
            fixture.has_many(&post_id("1"), COMMENTS).await,
            id_list(["c1", "c2"])
        );
        assert_eq!(
            fixture.find_by_id(POST, "1").await.unwrap().unwrap().id,
            post_id("1")
        );
    }

    #[tokio::test]
    async fn comment_builder_sets_foreign_key() {
        let fixture = TestAdapter::memory();
        fixture.seed([stored_comment("c1", Some("1"))]).await;
        assert_eq!(
            fixture.belongs_to(&comment_id("c1"), POST_FIELD).await,
            Some(PrimitiveId::from("1"))
        );
    }

    #[tokio::test]
    async fn file_fixture_reopens_with_data() {
        let fixture = TestAdapter::file();
        fixture.create_record(&post("1", &[])).await.unwrap();
        let path = fixture.path().unwrap();

        let fixture = fixture.reopen();
        assert_eq!(fixture.path().unwrap(), path);
        assert!(fixture.stored(&post_id("1")).await.is_some());
    }

    #[tokio::test]
    async fn blog_scenario() {
        let fixture = scenarios::blog(3, 2).await;
        assert_eq!(fixture.find_all(POST).await.unwrap().len(), 3);
        assert_eq!(fixture.find_all(COMMENT).await.unwrap().len(), 6);
        assert_eq!(
            fixture.has_many(&post_id("2"), COMMENTS).await,
            id_list(["p2-c0", "p2-c1"])
        );
    }
}
