//! Transactional store gateway.
//!
//! Every store operation runs inside its own [`Scope`]. A scope is opened by
//! [`Gateway::open_scope`] and consumed by the single operation it carries,
//! so no two operations ever share one. There is no multi-operation
//! atomicity at this layer.

use crate::backend::{IndexCursor, ObjectStore};
use crate::error::StoreResult;
use relstore_codec::{CompositeId, StoredHash};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifier of a gateway scope, unique per gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Entry point to the single logical object store.
///
/// Cloning is cheap; clones share the store and the scope counter.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn ObjectStore>,
    next_scope: Arc<AtomicU64>,
}

impl Gateway {
    /// Creates a gateway over `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            next_scope: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Opens a scope valid for exactly one operation.
    #[must_use]
    pub fn open_scope(&self) -> Scope {
        let id = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed));
        trace!(scope = %id, store = self.store.name(), "scope opened");
        Scope {
            id,
            store: Arc::clone(&self.store),
        }
    }

    /// Reads a hash in a fresh scope.
    pub async fn get(&self, id: &CompositeId) -> StoreResult<Option<StoredHash>> {
        self.open_scope().get(id).await
    }

    /// Creates a hash in a fresh scope.
    pub async fn add(&self, hash: StoredHash) -> StoreResult<()> {
        self.open_scope().add(hash).await
    }

    /// Writes a hash in a fresh scope.
    pub async fn put(&self, hash: StoredHash) -> StoreResult<()> {
        self.open_scope().put(hash).await
    }

    /// Deletes a hash in a fresh scope.
    pub async fn delete(&self, id: &CompositeId) -> StoreResult<()> {
        self.open_scope().delete(id).await
    }

    /// Opens an index cursor in a fresh scope.
    pub async fn open_index_cursor(&self, type_tag: &str) -> StoreResult<CursorHandle> {
        self.open_scope().open_index_cursor(type_tag).await
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("store", &self.store.name())
            .field("next_scope", &self.next_scope.load(Ordering::Relaxed))
            .finish()
    }
}

/// A single-use handle on the object store.
///
/// Each operation takes `self`, so a scope cannot be reused.
pub struct Scope {
    id: ScopeId,
    store: Arc<dyn ObjectStore>,
}

impl Scope {
    /// Returns this scope's identifier.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Reads the hash stored under `id`.
    pub async fn get(self, id: &CompositeId) -> StoreResult<Option<StoredHash>> {
        let result = self.store.get(id).await;
        debug!(scope = %self.id, %id, found = matches!(result, Ok(Some(_))), ok = result.is_ok(), "get");
        result
    }

    /// Stores a new hash; fails with `KeyConflict` if the key exists.
    pub async fn add(self, hash: StoredHash) -> StoreResult<()> {
        let result = self.store.add(hash).await;
        debug!(scope = %self.id, ok = result.is_ok(), "add");
        result
    }

    /// Stores a hash, replacing any existing one.
    pub async fn put(self, hash: StoredHash) -> StoreResult<()> {
        let result = self.store.put(hash).await;
        debug!(scope = %self.id, ok = result.is_ok(), "put");
        result
    }

    /// Removes the hash stored under `id`.
    pub async fn delete(self, id: &CompositeId) -> StoreResult<()> {
        let result = self.store.delete(id).await;
        debug!(scope = %self.id, %id, ok = result.is_ok(), "delete");
        result
    }

    /// Opens a forward cursor over the `_type` index for `type_tag`.
    ///
    /// The returned handle keeps this scope's identifier for logging.
    pub async fn open_index_cursor(self, type_tag: &str) -> StoreResult<CursorHandle> {
        let inner = self.store.open_index_cursor(type_tag).await?;
        debug!(scope = %self.id, type_tag, "cursor opened");
        Ok(CursorHandle {
            scope: self.id,
            type_tag: type_tag.to_string(),
            inner,
            steps: 0,
            exhausted: false,
        })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("store", &self.store.name())
            .finish()
    }
}

/// Forward cursor over one type's records.
///
/// Once `next` has returned `Ok(None)` every later call does too, without
/// touching the store.
pub struct CursorHandle {
    scope: ScopeId,
    type_tag: String,
    inner: Box<dyn IndexCursor>,
    steps: u64,
    exhausted: bool,
}

impl CursorHandle {
    /// Advances one step.
    pub async fn next(&mut self) -> StoreResult<Option<StoredHash>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.inner.next().await? {
            Some(hash) => {
                self.steps += 1;
                trace!(scope = %self.scope, type_tag = %self.type_tag, step = self.steps, "cursor step");
                Ok(Some(hash))
            }
            None => {
                self.exhausted = true;
                debug!(scope = %self.scope, type_tag = %self.type_tag, steps = self.steps, "cursor exhausted");
                Ok(None)
            }
        }
    }

    /// The type tag this cursor scans.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Number of hashes yielded so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns true once the cursor has reported exhaustion.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The scope the cursor was opened in.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorHandle")
            .field("scope", &self.scope)
            .field("type_tag", &self.type_tag)
            .field("steps", &self.steps)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
