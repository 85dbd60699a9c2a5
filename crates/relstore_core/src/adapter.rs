//! The adapter: entry point for the record manager.

use crate::batch::CommitBatch;
use crate::config::Config;
use crate::consistency::{ConsistencyEngine, PatchOutcome, PatchSide};
use crate::error::{CoreError, CoreResult};
use crate::events::{AdapterEvent, EventFeed, EventRecord};
use crate::identity::{composite_id_of, generate_id};
use crate::projection::to_storage_hash;
use crate::query::{LoadedBatch, LoadedRecord, Predicate, QueryEngine};
use crate::record::{Record, RecordSnapshot};
use futures_util::future::{join, join_all};
use relstore_codec::{CompositeId, PrimitiveId, StoredHash};
use relstore_storage::{Gateway, MemoryObjectStore, ObjectStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of a successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Batch number.
    pub batch: u64,
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Out-of-batch relationship patches applied.
    pub patches: usize,
    /// Relationship changes settled by this save.
    pub settled: usize,
}

/// One in-batch write.
enum WriteOp {
    Create(CompositeId, StoredHash),
    Update(CompositeId, StoredHash),
    Delete(CompositeId),
}

/// Persists record batches and answers reads.
///
/// # Example
///
/// ```rust
/// use relstore_core::{Adapter, CommitBatch, Config, RecordSnapshot};
/// use relstore_storage::MemoryObjectStore;
/// use std::sync::Arc;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let adapter = Adapter::new(Config::default(), Arc::new(MemoryObjectStore::new()));
///
/// let post = RecordSnapshot::new("Post")
///     .with_id(adapter.generate_id_for_record())
///     .attribute("title", "Hello");
/// adapter.create_record(&post).await.unwrap();
///
/// let all = adapter.find_all("Post").await.unwrap();
/// assert_eq!(all.len(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct Adapter {
    config: Config,
    gateway: Gateway,
    consistency: ConsistencyEngine,
    query: QueryEngine,
    events: EventFeed,
    next_batch: AtomicU64,
}

impl Adapter {
    /// Creates an adapter over `store`.
    pub fn new(config: Config, store: Arc<dyn ObjectStore>) -> Self {
        let gateway = Gateway::new(store);
        info!(
            database = %config.database_name,
            store = gateway.store().name(),
            "adapter ready"
        );
        Self {
            consistency: ConsistencyEngine::new(gateway.clone(), config.naming),
            query: QueryEngine::new(gateway.clone()),
            events: EventFeed::with_max_history(config.event_history),
            next_batch: AtomicU64::new(1),
            gateway,
            config,
        }
    }

    /// Creates an adapter over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Config::default(), Arc::new(MemoryObjectStore::new()))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store gateway.
    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Returns the event feed.
    #[must_use]
    pub fn events(&self) -> &EventFeed {
        &self.events
    }

    /// Subscribes to adapter events.
    pub fn subscribe(&self) -> Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Client-side id hook for new records.
    #[must_use]
    pub fn generate_id_for_record(&self) -> String {
        generate_id(self.config.id_format)
    }

    /// Persists a commit batch.
    ///
    /// Relationship patches for out-of-batch records are registered first,
    /// then every in-batch write and every patch runs concurrently. All of
    /// them run to completion before the outcome is reported. On success
    /// each record gets one `RecordSaved` event; on failure the batch gets
    /// one `BatchFailed` event and the first error is returned. Writes that
    /// already succeeded are not rolled back.
    ///
    /// # Errors
    ///
    /// - `Identity` if a record has no id
    /// - `InvalidOperation` if a change was already settled
    /// - `Store` if a write fails, e.g. `KeyConflict` on a duplicate create
    /// - `DanglingReference` or `CorruptHash` from a relationship patch
    pub async fn save(&self, batch: &CommitBatch) -> CoreResult<SaveReport> {
        let batch_no = self.next_batch.fetch_add(1, Ordering::Relaxed);
        debug!(
            batch = batch_no,
            created = batch.created().len(),
            updated = batch.updated().len(),
            deleted = batch.deleted().len(),
            changes = batch.changes().len(),
            "saving batch"
        );

        let prepared = self.prepare_writes(batch).and_then(|writes| {
            self.consistency
                .begin(batch)
                .map(|patches| (writes, patches))
        });
        let (writes, patches) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.fail_batch(batch_no, batch, err)),
        };
        let patch_count = patches.len();

        let (write_results, patch_results) = join(
            join_all(writes.into_iter().map(|op| self.write(op))),
            join_all(patches.into_iter().map(|patch| self.consistency.run(patch))),
        )
        .await;

        let mut events = Vec::new();
        let mut first_error = None;
        for result in write_results {
            match result {
                Ok(event) => events.push(event),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        let mut outcomes = Vec::with_capacity(patch_count);
        for result in patch_results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(self.fail_batch(batch_no, batch, err));
        }

        let mut settled = outcomes.iter().filter(|o| o.settled).count();
        for change in batch.changes() {
            if change.settle().is_ok() {
                settled += 1;
            }
        }

        events.extend(relationship_events(batch, &outcomes));
        self.events.emit_batch(events);

        let report = SaveReport {
            batch: batch_no,
            created: batch.created().len(),
            updated: batch.updated().len(),
            deleted: batch.deleted().len(),
            patches: patch_count,
            settled,
        };
        info!(
            batch = batch_no,
            records = batch.len(),
            patches = report.patches,
            settled = report.settled,
            "batch saved"
        );
        Ok(report)
    }

    /// Creates one record.
    ///
    /// # Errors
    ///
    /// As [`save`](Self::save).
    pub async fn create_record<R: Record + ?Sized>(&self, record: &R) -> CoreResult<SaveReport> {
        let batch = CommitBatch::builder()
            .created(RecordSnapshot::capture(record))
            .build()?;
        self.save(&batch).await
    }

    /// Updates one record.
    ///
    /// # Errors
    ///
    /// As [`save`](Self::save).
    pub async fn update_record<R: Record + ?Sized>(&self, record: &R) -> CoreResult<SaveReport> {
        let batch = CommitBatch::builder()
            .updated(RecordSnapshot::capture(record))
            .build()?;
        self.save(&batch).await
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// As [`save`](Self::save).
    pub async fn delete_record<R: Record + ?Sized>(&self, record: &R) -> CoreResult<SaveReport> {
        let batch = CommitBatch::builder()
            .deleted(RecordSnapshot::capture(record))
            .build()?;
        self.save(&batch).await
    }

    /// Reads one record. See [`QueryEngine::find_by_id`].
    ///
    /// # Errors
    ///
    /// Returns `Store` if the read fails.
    pub async fn find_by_id(
        &self,
        type_tag: &str,
        id: impl Into<PrimitiveId>,
    ) -> CoreResult<Option<LoadedRecord>> {
        self.query.find_by_id(type_tag, id).await
    }

    /// Reads several records by id. See [`QueryEngine::find_many`].
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_many<I>(&self, type_tag: &str, ids: I) -> CoreResult<LoadedBatch>
    where
        I: IntoIterator,
        I::Item: Into<PrimitiveId>,
    {
        self.query.find_many(type_tag, ids).await
    }

    /// Reads every record of a type.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_all(&self, type_tag: &str) -> CoreResult<LoadedBatch> {
        self.query.find_all(type_tag).await
    }

    /// Reads the records of a type matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `Query` if the scan fails.
    pub async fn find_query(&self, type_tag: &str, predicate: &Predicate) -> CoreResult<LoadedBatch> {
        self.query.find_query(type_tag, predicate).await
    }

    fn prepare_writes(&self, batch: &CommitBatch) -> CoreResult<Vec<WriteOp>> {
        let naming = &self.config.naming;
        let mut writes = Vec::with_capacity(batch.len());
        for record in batch.created() {
            let id = composite_id_of(record)?;
            writes.push(WriteOp::Create(id, to_storage_hash(record, true, naming)));
        }
        for record in batch.updated() {
            let id = composite_id_of(record)?;
            writes.push(WriteOp::Update(id, to_storage_hash(record, true, naming)));
        }
        for record in batch.deleted() {
            writes.push(WriteOp::Delete(composite_id_of(record)?));
        }
        Ok(writes)
    }

    async fn write(&self, op: WriteOp) -> CoreResult<AdapterEvent> {
        let scope = self.gateway.open_scope();
        match op {
            WriteOp::Create(id, hash) => {
                scope.add(hash.clone()).await?;
                Ok(AdapterEvent::RecordSaved { id, hash: Some(hash) })
            }
            WriteOp::Update(id, hash) => {
                scope.put(hash.clone()).await?;
                Ok(AdapterEvent::RecordSaved { id, hash: Some(hash) })
            }
            WriteOp::Delete(id) => {
                scope.delete(&id).await?;
                Ok(AdapterEvent::RecordSaved { id, hash: None })
            }
        }
    }

    fn fail_batch(&self, batch_no: u64, batch: &CommitBatch, err: CoreError) -> CoreError {
        for change in batch.changes() {
            change.fail(format!("batch {batch_no} failed: {err}"));
        }
        warn!(batch = batch_no, error = %err, fatal = err.is_fatal(), "batch failed");
        self.events.emit(AdapterEvent::BatchFailed {
            batch: batch_no,
            error: err.to_string(),
        });
        err
    }
}

/// `RelationshipUpdated` events for a saved batch: every belongs-to of every
/// created or updated record, then every child-side patch that changed a
/// stored belongs-to field.
fn relationship_events(batch: &CommitBatch, outcomes: &[PatchOutcome]) -> Vec<AdapterEvent> {
    let mut events = Vec::new();
    for record in batch.created().iter().chain(batch.updated()) {
        let Some(id) = record.composite_id() else {
            continue;
        };
        for name in record.belongs_to_names() {
            events.push(AdapterEvent::RelationshipUpdated {
                id: id.clone(),
                name: name.to_string(),
            });
        }
    }
    for outcome in outcomes {
        if outcome.side == PatchSide::Child && outcome.changed {
            events.push(AdapterEvent::RelationshipUpdated {
                id: outcome.target.clone(),
                name: outcome.relationship.clone(),
            });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::{ChangeState, RecordRef, RelationshipChange};
    use relstore_codec::Value;
    use relstore_storage::StoreError;

    fn post(id: &str) -> RecordSnapshot {
        RecordSnapshot::new("Post").with_id(id).attribute("title", id)
    }

    fn drain(rx: &Receiver<EventRecord>) -> Vec<AdapterEvent> {
        rx.try_iter().map(|r| r.event).collect()
    }

    #[tokio::test]
    async fn create_then_find() {
        let adapter = Adapter::in_memory();
        adapter.create_record(&post("1")).await.unwrap();

        let found = adapter.find_by_id("Post", "1").await.unwrap().unwrap();
        assert_eq!(found.hash.get("title"), Some(&Value::from("1")));
        assert_eq!(found.hash.type_tag(), Some("Post"));
    }

    #[tokio::test]
    async fn duplicate_create_is_a_key_conflict() {
        let adapter = Adapter::in_memory();
        adapter.create_record(&post("1")).await.unwrap();

        let rx = adapter.subscribe();
        let err = adapter.create_record(&post("1")).await.unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::KeyConflict { .. })));
        assert!(matches!(drain(&rx).as_slice(), [AdapterEvent::BatchFailed { .. }]));
    }

    #[tokio::test]
    async fn one_saved_event_per_record() {
        let adapter = Adapter::in_memory();
        adapter.create_record(&post("3")).await.unwrap();
        let rx = adapter.subscribe();

        let batch = CommitBatch::builder()
            .created(post("1"))
            .created(post("2"))
            .deleted(post("3"))
            .build()
            .unwrap();
        let report = adapter.save(&batch).await.unwrap();
        assert_eq!((report.created, report.deleted), (2, 1));

        let events = drain(&rx);
        assert_eq!(events.len(), 3);
        assert!(events.contains(&AdapterEvent::RecordSaved {
            id: CompositeId::new("Post", "3"),
            hash: None,
        }));
        assert!(adapter.find_by_id("Post", "3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn belongs_to_of_saved_records_is_reported() {
        let adapter = Adapter::in_memory();
        let rx = adapter.subscribe();
        let comment = RecordSnapshot::new("Comment")
            .with_id("c1")
            .belongs_to("post", Some("1".into()));

        adapter.create_record(&comment).await.unwrap();
        let events = drain(&rx);
        assert!(events.contains(&AdapterEvent::RelationshipUpdated {
            id: CompositeId::new("Comment", "c1"),
            name: "post".to_string(),
        }));
    }

    #[tokio::test]
    async fn change_without_patches_settles_after_writes() {
        let adapter = Adapter::in_memory();
        let change = Arc::new(
            RelationshipChange::new("post", "comments")
                .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
                .new_parent(RecordRef::loaded(CompositeId::new("Post", "1"))),
        );
        let batch = CommitBatch::builder()
            .created(post("1").has_many("comments", ["c1"]))
            .created(RecordSnapshot::new("Comment").with_id("c1").belongs_to("post", Some("1".into())))
            .change(Arc::clone(&change))
            .build()
            .unwrap();

        let report = adapter.save(&batch).await.unwrap();
        assert_eq!(report.patches, 0);
        assert_eq!(report.settled, 1);
        assert_eq!(change.state(), ChangeState::Settled);
    }

    #[tokio::test]
    async fn saving_a_settled_change_again_is_rejected_before_writing() {
        let adapter = Adapter::in_memory();
        adapter.create_record(&post("2")).await.unwrap();
        let change = Arc::new(
            RelationshipChange::new("post", "comments")
                .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
                .new_parent(RecordRef::unloaded(CompositeId::new("Post", "2"))),
        );
        let batch = CommitBatch::builder()
            .created(RecordSnapshot::new("Comment").with_id("c1"))
            .change(change)
            .build()
            .unwrap();

        adapter.save(&batch).await.unwrap();
        let err = adapter.save(&batch).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn dangling_parent_fails_the_whole_batch() {
        let adapter = Adapter::in_memory();
        let rx = adapter.subscribe();
        let change = Arc::new(
            RelationshipChange::new("post", "comments")
                .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
                .new_parent(RecordRef::unloaded(CompositeId::new("Post", "404"))),
        );
        let batch = CommitBatch::builder()
            .created(RecordSnapshot::new("Comment").with_id("c1"))
            .change(Arc::clone(&change))
            .build()
            .unwrap();

        let err = adapter.save(&batch).await.unwrap_err();
        assert!(matches!(err, CoreError::DanglingReference { .. }));
        assert!(matches!(change.state(), ChangeState::Failed { .. }));

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AdapterEvent::BatchFailed { .. }));
    }

    #[test]
    fn generated_ids_follow_config() {
        let adapter = Adapter::new(
            Config::new().id_format(crate::config::IdFormat::Simple),
            Arc::new(MemoryObjectStore::new()),
        );
        assert_eq!(adapter.generate_id_for_record().len(), 32);
    }
}
