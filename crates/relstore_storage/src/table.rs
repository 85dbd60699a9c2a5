//! In-memory record table shared by the store implementations.

use crate::backend::IndexCursor;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use relstore_codec::{CompositeId, StoredHash};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Primary map plus the `_type` secondary index.
#[derive(Debug, Default)]
pub(crate) struct RecordTable {
    primary: BTreeMap<CompositeId, StoredHash>,
    by_type: BTreeMap<String, BTreeSet<CompositeId>>,
}

impl RecordTable {
    pub(crate) fn get(&self, id: &CompositeId) -> Option<&StoredHash> {
        self.primary.get(id)
    }

    pub(crate) fn contains(&self, id: &CompositeId) -> bool {
        self.primary.contains_key(id)
    }

    /// Inserts a validated hash under `id`.
    ///
    /// `id` must be the key parsed from the hash, so its type tag is the
    /// hash's `_type`.
    pub(crate) fn insert(&mut self, id: CompositeId, hash: StoredHash) -> Option<StoredHash> {
        self.by_type
            .entry(id.type_tag().to_string())
            .or_default()
            .insert(id.clone());
        self.primary.insert(id, hash)
    }

    pub(crate) fn remove(&mut self, id: &CompositeId) -> Option<StoredHash> {
        let removed = self.primary.remove(id)?;
        if let Some(keys) = self.by_type.get_mut(id.type_tag()) {
            keys.remove(id);
            if keys.is_empty() {
                self.by_type.remove(id.type_tag());
            }
        }
        Some(removed)
    }

    /// Keys carrying `type_tag`, in index order.
    pub(crate) fn keys_of_type(&self, type_tag: &str) -> VecDeque<CompositeId> {
        self.by_type
            .get(type_tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.primary.len()
    }

    pub(crate) fn type_counts(&self) -> BTreeMap<String, usize> {
        self.by_type
            .iter()
            .map(|(tag, keys)| (tag.clone(), keys.len()))
            .collect()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &StoredHash> {
        self.primary.values()
    }

    pub(crate) fn clear(&mut self) {
        self.primary.clear();
        self.by_type.clear();
    }
}

/// Table state plus the open flag, shared with live cursors.
#[derive(Debug)]
pub(crate) struct SharedTable {
    name: String,
    pub(crate) table: RwLock<RecordTable>,
    open: AtomicBool,
}

impl SharedTable {
    pub(crate) fn new(name: impl Into<String>, table: RecordTable) -> Self {
        Self {
            name: name.into(),
            table: RwLock::new(table),
            open: AtomicBool::new(true),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable(&self.name))
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Cursor over one `_type` value.
///
/// The key set is captured when the cursor opens; each value is read when
/// its step is taken, so records deleted mid-scan are skipped and records
/// updated mid-scan are seen in their latest form.
pub(crate) struct TableCursor {
    shared: Arc<SharedTable>,
    pending: VecDeque<CompositeId>,
}

impl TableCursor {
    pub(crate) fn open(shared: Arc<SharedTable>, type_tag: &str) -> StoreResult<Self> {
        shared.ensure_open()?;
        let pending = shared.table.read().keys_of_type(type_tag);
        Ok(Self { shared, pending })
    }
}

#[async_trait]
impl IndexCursor for TableCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredHash>> {
        self.shared.ensure_open()?;
        let table = self.shared.table.read();
        while let Some(id) = self.pending.pop_front() {
            if let Some(hash) = table.get(&id) {
                return Ok(Some(hash.clone()));
            }
        }
        Ok(None)
    }
}
