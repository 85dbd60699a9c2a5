//! Commit batches.

use crate::error::{CoreError, CoreResult};
use crate::identity::composite_id_of;
use crate::record::RecordSnapshot;
use crate::relationship::RelationshipChange;
use relstore_codec::CompositeId;
use std::collections::HashSet;
use std::sync::Arc;

/// What the record manager wants persisted in one save.
///
/// The created, updated and deleted sets are disjoint, and every record in
/// them has an id. Built with [`CommitBatch::builder`].
///
/// # Example
///
/// ```rust
/// use relstore_core::{CommitBatch, RecordSnapshot};
///
/// let batch = CommitBatch::builder()
///     .created(RecordSnapshot::new("Post").with_id("1"))
///     .build()
///     .unwrap();
/// assert_eq!(batch.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    created: Vec<RecordSnapshot>,
    updated: Vec<RecordSnapshot>,
    deleted: Vec<RecordSnapshot>,
    changes: Vec<Arc<RelationshipChange>>,
    members: HashSet<CompositeId>,
}

impl CommitBatch {
    /// Starts a new batch.
    #[must_use]
    pub fn builder() -> CommitBatchBuilder {
        CommitBatchBuilder::default()
    }

    /// Records to create.
    #[must_use]
    pub fn created(&self) -> &[RecordSnapshot] {
        &self.created
    }

    /// Records to update.
    #[must_use]
    pub fn updated(&self) -> &[RecordSnapshot] {
        &self.updated
    }

    /// Records to delete.
    #[must_use]
    pub fn deleted(&self) -> &[RecordSnapshot] {
        &self.deleted
    }

    /// Relationship changes, in order.
    #[must_use]
    pub fn changes(&self) -> &[Arc<RelationshipChange>] {
        &self.changes
    }

    /// True if `id` is in any of the three record sets.
    #[must_use]
    pub fn contains(&self, id: &CompositeId) -> bool {
        self.members.contains(id)
    }

    /// Number of records across all three sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the batch holds no records and no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.changes.is_empty()
    }
}

/// Builder for [`CommitBatch`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CommitBatchBuilder {
    created: Vec<RecordSnapshot>,
    updated: Vec<RecordSnapshot>,
    deleted: Vec<RecordSnapshot>,
    changes: Vec<Arc<RelationshipChange>>,
}

impl CommitBatchBuilder {
    /// Adds a record to create.
    #[must_use]
    pub fn created(mut self, record: RecordSnapshot) -> Self {
        self.created.push(record);
        self
    }

    /// Adds a record to update.
    #[must_use]
    pub fn updated(mut self, record: RecordSnapshot) -> Self {
        self.updated.push(record);
        self
    }

    /// Adds a record to delete.
    #[must_use]
    pub fn deleted(mut self, record: RecordSnapshot) -> Self {
        self.deleted.push(record);
        self
    }

    /// Adds a relationship change.
    #[must_use]
    pub fn change(mut self, change: Arc<RelationshipChange>) -> Self {
        self.changes.push(change);
        self
    }

    /// Validates and freezes the batch.
    ///
    /// # Errors
    ///
    /// - `Identity` if a record has no id
    /// - `InvalidBatch` if a record appears more than once
    pub fn build(self) -> CoreResult<CommitBatch> {
        let mut members = HashSet::new();
        for record in self.created.iter().chain(&self.updated).chain(&self.deleted) {
            let id = composite_id_of(record)?;
            if !members.insert(id.clone()) {
                return Err(CoreError::invalid_batch(format!(
                    "{id} appears more than once"
                )));
            }
        }

        Ok(CommitBatch {
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
            changes: self.changes,
            members,
        })
    }
}
