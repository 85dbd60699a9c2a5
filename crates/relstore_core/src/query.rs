//! Read path: lookups and `_type` index scans.
//!
//! Every scan walks the type's index cursor to the end, keeps the hashes
//! that match, and delivers them in cursor order as one [`LoadedBatch`].
//! A scan that matches nothing still succeeds; a cursor failure is a
//! [`CoreError::Query`].

use crate::error::{CoreError, CoreResult};
use relstore_codec::{CompositeId, PrimitiveId, StoredHash, Value};
use relstore_storage::{CursorHandle, Gateway};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// Field equality filter for [`QueryEngine::find_query`].
///
/// A hash matches when every key is present with a strictly equal value.
/// An empty predicate matches everything.
pub type Predicate = BTreeMap<String, Value>;

/// One record read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRecord {
    /// Storage key.
    pub id: CompositeId,
    /// Stored hash.
    pub hash: StoredHash,
}

/// Records of one type delivered by a read.
///
/// Keeps delivery order and an index from key to position, so lookups by
/// [`CompositeId`] are constant time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBatch {
    type_tag: String,
    records: Vec<LoadedRecord>,
    positions: HashMap<CompositeId, usize>,
    state: ScanState,
}

impl LoadedBatch {
    fn empty(type_tag: impl Into<String>) -> Self {
        Self::delivered(type_tag, Vec::new())
    }

    fn delivered(type_tag: impl Into<String>, records: Vec<LoadedRecord>) -> Self {
        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id.clone(), pos))
            .collect();
        Self {
            type_tag: type_tag.into(),
            records,
            positions,
            state: ScanState::Delivered,
        }
    }

    /// Type of every record in the batch.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Records in delivery order.
    #[must_use]
    pub fn records(&self) -> &[LoadedRecord] {
        &self.records
    }

    /// Looks up a record by key.
    #[must_use]
    pub fn get(&self, id: &CompositeId) -> Option<&StoredHash> {
        self.positions.get(id).map(|&pos| &self.records[pos].hash)
    }

    /// State the scan ended in. Always [`ScanState::Delivered`]; a failed
    /// scan surfaces as [`CoreError::Query`] instead of a batch.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Primitive ids in delivery order.
    pub fn ids(&self) -> impl Iterator<Item = &PrimitiveId> {
        self.records.iter().map(|r| r.id.id())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the batch.
    #[must_use]
    pub fn into_records(self) -> Vec<LoadedRecord> {
        self.records
    }
}

/// Progress of one index scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Cursor open, nothing matched yet.
    Scanning,
    /// At least one match collected.
    Accumulating,
    /// Cursor exhausted and results handed over.
    Delivered,
    /// The cursor failed.
    Failed,
}

/// One pass over a type's index.
///
/// The state outlives [`Scan::run`], so a finished scan reports whether it
/// delivered or failed.
struct Scan {
    type_tag: String,
    state: ScanState,
    records: Vec<LoadedRecord>,
    visited: u64,
}

impl Scan {
    fn new(type_tag: &str) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            state: ScanState::Scanning,
            records: Vec::new(),
            visited: 0,
        }
    }

    fn state(&self) -> ScanState {
        self.state
    }

    async fn run<F>(&mut self, mut cursor: CursorHandle, mut matches: F) -> CoreResult<LoadedBatch>
    where
        F: FnMut(&CompositeId, &StoredHash) -> bool,
    {
        loop {
            let step = match cursor.next().await {
                Ok(step) => step,
                Err(err) => {
                    self.state = ScanState::Failed;
                    self.records.clear();
                    debug!(type_tag = %self.type_tag, visited = self.visited, error = %err, "scan failed");
                    return Err(CoreError::query(self.type_tag.clone(), err));
                }
            };
            let Some(hash) = step else { break };
            self.visited += 1;

            let Some(id) = hash.composite_id() else {
                trace!(type_tag = %self.type_tag, "skipping hash without id");
                continue;
            };
            if matches(&id, &hash) {
                self.state = ScanState::Accumulating;
                self.records.push(LoadedRecord { id, hash });
            }
        }

        self.state = ScanState::Delivered;
        let batch = LoadedBatch::delivered(self.type_tag.clone(), std::mem::take(&mut self.records));
        debug!(
            type_tag = %self.type_tag,
            visited = self.visited,
            matched = batch.len(),
            state = ?self.state,
            "scan delivered"
        );
        Ok(batch)
    }
}

/// Answers reads against the object store.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    gateway: Gateway,
}

impl QueryEngine {
    /// Creates a query engine reading through `gateway`.
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Reads one record.
    ///
    /// Returns `Ok(None)` when no record is stored under the key, or when
    /// the stored hash has no usable id.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the read fails.
    pub async fn find_by_id(
        &self,
        type_tag: &str,
        id: impl Into<PrimitiveId>,
    ) -> CoreResult<Option<LoadedRecord>> {
        let key = CompositeId::new(type_tag, id);
        let hash = self.gateway.open_scope().get(&key).await?;
        Ok(hash.and_then(|hash| {
            hash.composite_id()
                .map(|id| LoadedRecord { id, hash })
        }))
    }

    /// Reads the records of `type_tag` whose ids are in `ids`.
    ///
    /// Results follow index order, not the order of `ids`, and contain each
    /// record once.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_many<I>(&self, type_tag: &str, ids: I) -> CoreResult<LoadedBatch>
    where
        I: IntoIterator,
        I::Item: Into<PrimitiveId>,
    {
        let wanted: HashSet<PrimitiveId> = ids.into_iter().map(Into::into).collect();
        if wanted.is_empty() {
            return Ok(LoadedBatch::empty(type_tag));
        }
        self.scan(type_tag, |id, _| wanted.contains(id.id())).await
    }

    /// Reads every record of `type_tag`.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_all(&self, type_tag: &str) -> CoreResult<LoadedBatch> {
        self.scan(type_tag, |_, _| true).await
    }

    /// Reads the records of `type_tag` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_query(&self, type_tag: &str, predicate: &Predicate) -> CoreResult<LoadedBatch> {
        self.scan(type_tag, |_, hash| matches_predicate(hash, predicate))
            .await
    }

    async fn scan<F>(&self, type_tag: &str, matches: F) -> CoreResult<LoadedBatch>
    where
        F: FnMut(&CompositeId, &StoredHash) -> bool,
    {
        let cursor = self
            .gateway
            .open_scope()
            .open_index_cursor(type_tag)
            .await
            .map_err(|err| CoreError::query(type_tag, err))?;
        Scan::new(type_tag).run(cursor, matches).await
    }
}

/// Strict field equality against every predicate entry.
#[must_use]
pub fn matches_predicate(hash: &StoredHash, predicate: &Predicate) -> bool {
    predicate
        .iter()
        .all(|(field, expected)| hash.get(field) == Some(expected))
}
