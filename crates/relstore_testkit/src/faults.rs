//! Fault injection for object stores.
//!
//! [`FlakyStore`] wraps any [`ObjectStore`] and fails chosen operations
//! with an I/O error, optionally delaying reads so concurrent
//! read-modify-write cycles overlap.

use async_trait::async_trait;
use parking_lot::Mutex;
use relstore_codec::{CompositeId, StoredHash};
use relstore_storage::{IndexCursor, ObjectStore, StoreError, StoreResult};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// An operation to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Reads of this key fail.
    Get(CompositeId),
    /// Creates of this key fail.
    Add(CompositeId),
    /// Upserts of this key fail.
    Put(CompositeId),
    /// Deletes of this key fail.
    Delete(CompositeId),
    /// Opening a cursor over this type fails.
    OpenCursor(String),
    /// Cursors over this type fail after yielding `after` records.
    CursorStep {
        /// Type tag of the index.
        type_tag: String,
        /// Records yielded before the failure.
        after: usize,
    },
}

/// Operation counts seen by a [`FlakyStore`], failed ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// `get` calls.
    pub gets: usize,
    /// `add` calls.
    pub adds: usize,
    /// `put` calls.
    pub puts: usize,
    /// `delete` calls.
    pub deletes: usize,
    /// Cursors opened.
    pub cursors: usize,
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    adds: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    cursors: AtomicUsize,
}

/// A store wrapper that fails on demand.
///
/// # Example
///
/// ```rust
/// use relstore_codec::CompositeId;
/// use relstore_storage::{MemoryObjectStore, ObjectStore};
/// use relstore_testkit::{Fault, FlakyStore};
/// use std::sync::Arc;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = FlakyStore::new(Arc::new(MemoryObjectStore::new()));
/// let id = CompositeId::new("Post", "1");
/// store.inject(Fault::Get(id.clone()));
///
/// assert!(store.get(&id).await.is_err());
/// assert_eq!(store.counts().gets, 1);
/// # });
/// ```
pub struct FlakyStore {
    inner: Arc<dyn ObjectStore>,
    faults: Mutex<Vec<Fault>>,
    get_delay: Mutex<Option<Duration>>,
    counters: Counters,
}

impl FlakyStore {
    /// Wraps `inner` with no faults.
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            get_delay: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Adds a fault. It stays active until [`clear`](Self::clear).
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Removes every fault and delay.
    pub fn clear(&self) {
        self.faults.lock().clear();
        *self.get_delay.lock() = None;
    }

    /// Delays every read by `delay` before it reaches the inner store.
    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock() = Some(delay);
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    /// Returns the operation counts so far.
    pub fn counts(&self) -> OpCounts {
        OpCounts {
            gets: self.counters.gets.load(Ordering::SeqCst),
            adds: self.counters.adds.load(Ordering::SeqCst),
            puts: self.counters.puts.load(Ordering::SeqCst),
            deletes: self.counters.deletes.load(Ordering::SeqCst),
            cursors: self.counters.cursors.load(Ordering::SeqCst),
        }
    }

    fn check(&self, fault: &Fault) -> StoreResult<()> {
        if self.faults.lock().contains(fault) {
            return Err(injected(fault));
        }
        Ok(())
    }

    fn step_limit(&self, type_tag: &str) -> Option<usize> {
        self.faults.lock().iter().find_map(|fault| match fault {
            Fault::CursorStep { type_tag: tag, after } if tag == type_tag => Some(*after),
            _ => None,
        })
    }
}

fn injected(fault: &Fault) -> StoreError {
    StoreError::Io(io::Error::other(format!("injected fault: {fault:?}")))
}

fn hash_key(hash: &StoredHash) -> StoreResult<CompositeId> {
    hash.validate().map_err(StoreError::from)
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, id: &CompositeId) -> StoreResult<Option<StoredHash>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(&Fault::Get(id.clone()))?;
        self.inner.get(id).await
    }

    async fn add(&self, hash: StoredHash) -> StoreResult<()> {
        self.counters.adds.fetch_add(1, Ordering::SeqCst);
        self.check(&Fault::Add(hash_key(&hash)?))?;
        self.inner.add(hash).await
    }

    async fn put(&self, hash: StoredHash) -> StoreResult<()> {
        self.counters.puts.fetch_add(1, Ordering::SeqCst);
        self.check(&Fault::Put(hash_key(&hash)?))?;
        self.inner.put(hash).await
    }

    async fn delete(&self, id: &CompositeId) -> StoreResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check(&Fault::Delete(id.clone()))?;
        self.inner.delete(id).await
    }

    async fn open_index_cursor(&self, type_tag: &str) -> StoreResult<Box<dyn IndexCursor>> {
        self.counters.cursors.fetch_add(1, Ordering::SeqCst);
        self.check(&Fault::OpenCursor(type_tag.to_string()))?;
        let inner = self.inner.open_index_cursor(type_tag).await?;
        match self.step_limit(type_tag) {
            Some(after) => Ok(Box::new(FlakyCursor {
                inner,
                type_tag: type_tag.to_string(),
                remaining: after,
            })),
            None => Ok(inner),
        }
    }
}

struct FlakyCursor {
    inner: Box<dyn IndexCursor>,
    type_tag: String,
    remaining: usize,
}

#[async_trait]
impl IndexCursor for FlakyCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredHash>> {
        if self.remaining == 0 {
            return Err(injected(&Fault::CursorStep {
                type_tag: self.type_tag.clone(),
                after: 0,
            }));
        }
        self.remaining -= 1;
        self.inner.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{post_id, stored_post, POST};
    use relstore_storage::MemoryObjectStore;

    fn flaky() -> FlakyStore {
        FlakyStore::new(Arc::new(MemoryObjectStore::new()))
    }

    #[tokio::test]
    async fn passes_through_without_faults() {
        let store = flaky();
        store.put(stored_post("1", &[])).await.unwrap();
        assert!(store.get(&post_id("1")).await.unwrap().is_some());
        assert_eq!(
            store.counts(),
            OpCounts {
                gets: 1,
                puts: 1,
                ..OpCounts::default()
            }
        );
    }

    #[tokio::test]
    async fn put_fault_hits_only_its_key() {
        let store = flaky();
        store.inject(Fault::Put(post_id("1")));

        let err = store.put(stored_post("1", &[])).await.unwrap_err();
        assert!(err.is_io_failure());
        store.put(stored_post("2", &[])).await.unwrap();
        assert!(store.get(&post_id("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_faults() {
        let store = flaky();
        store.inject(Fault::Delete(post_id("1")));
        assert!(store.delete(&post_id("1")).await.is_err());

        store.clear();
        store.delete(&post_id("1")).await.unwrap();
    }

    #[tokio::test]
    async fn cursor_fails_after_limit() {
        let store = flaky();
        for id in ["1", "2", "3"] {
            store.put(stored_post(id, &[])).await.unwrap();
        }
        store.inject(Fault::CursorStep {
            type_tag: POST.to_string(),
            after: 2,
        });

        let mut cursor = store.open_index_cursor(POST).await.unwrap();
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.is_err());
    }

    #[tokio::test]
    async fn open_cursor_fault() {
        let store = flaky();
        store.inject(Fault::OpenCursor(POST.to_string()));
        assert!(store.open_index_cursor(POST).await.is_err());
        assert!(store.open_index_cursor("Comment").await.is_ok());
    }
}
