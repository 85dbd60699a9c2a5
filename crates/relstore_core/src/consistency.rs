//! Relationship consistency engine.
//!
//! When a relationship changes, both sides of the edge have to be written:
//! the child's belongs-to field and the has-many fields of its old and new
//! parents. Sides that are part of the commit batch are written by the batch
//! itself. Sides that are not are patched here, directly in the store:
//!
//! 1. **Child**: set the belongs-to field to the new parent's id, or null.
//! 2. **Old parent**: remove the child's id from the has-many field.
//! 3. **New parent**: append the child's id to the has-many field if absent.
//!
//! Every patch of a batch is registered with its change (`wait`) before any
//! of them runs, so a fast patch can never settle a change early. Each patch
//! then takes the per-key gate for its target, reads, mutates, writes back,
//! releases the gate and confirms (`done`).

use crate::batch::CommitBatch;
use crate::config::FieldNaming;
use crate::error::{CoreError, CoreResult};
use crate::gate::KeyGate;
use crate::relationship::{RecordRef, RelationshipChange};
use relstore_codec::{CompositeId, PrimitiveId, StoredHash, Value};
use relstore_storage::Gateway;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Which side of an edge a patch writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchSide {
    /// The child's belongs-to field.
    Child,
    /// The old parent's has-many field.
    OldParent,
    /// The new parent's has-many field.
    NewParent,
}

impl fmt::Display for PatchSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Child => write!(f, "child"),
            Self::OldParent => write!(f, "old-parent"),
            Self::NewParent => write!(f, "new-parent"),
        }
    }
}

/// Mutation applied to a stored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchMutation {
    /// Point a belongs-to field at a parent, or clear it.
    SetBelongsTo {
        /// Stored field name.
        field: String,
        /// New parent id.
        parent: Option<PrimitiveId>,
    },
    /// Remove a child id from a has-many field.
    RemoveFromHasMany {
        /// Stored field name.
        field: String,
        /// Child id to remove.
        child: PrimitiveId,
    },
    /// Append a child id to a has-many field unless already there.
    AddToHasMany {
        /// Stored field name.
        field: String,
        /// Child id to add.
        child: PrimitiveId,
    },
}

impl PatchMutation {
    /// Stored field this mutation writes.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::SetBelongsTo { field, .. }
            | Self::RemoveFromHasMany { field, .. }
            | Self::AddToHasMany { field, .. } => field,
        }
    }

    /// Applies the mutation to `hash`, which is the stored hash of `target`.
    /// Returns true if the hash changed.
    ///
    /// Has-many edits treat a missing or null field as an empty list and
    /// never duplicate an id, so applying a mutation twice has the same
    /// effect as applying it once.
    ///
    /// # Errors
    ///
    /// Returns `CorruptHash` if a has-many field holds something other than
    /// an array.
    pub fn apply(&self, target: &CompositeId, hash: &mut StoredHash) -> CoreResult<bool> {
        match self {
            Self::SetBelongsTo { field, parent } => {
                let value = parent.as_ref().map_or(Value::Null, PrimitiveId::to_value);
                let previous = hash.insert(field.clone(), value.clone());
                Ok(previous.as_ref() != Some(&value))
            }
            Self::RemoveFromHasMany { field, child } => {
                let child = child.to_value();
                match has_many_mut(target, hash, field)? {
                    Some(ids) => {
                        let before = ids.len();
                        ids.retain(|id| *id != child);
                        Ok(ids.len() != before)
                    }
                    None => Ok(false),
                }
            }
            Self::AddToHasMany { field, child } => {
                let child = child.to_value();
                match has_many_mut(target, hash, field)? {
                    Some(ids) if ids.contains(&child) => Ok(false),
                    Some(ids) => {
                        ids.push(child);
                        Ok(true)
                    }
                    None => {
                        hash.insert(field.clone(), Value::Array(vec![child]));
                        Ok(true)
                    }
                }
            }
        }
    }
}

/// The id array of a has-many field, or `None` if the field is missing or
/// null.
fn has_many_mut<'a>(
    target: &CompositeId,
    hash: &'a mut StoredHash,
    field: &str,
) -> CoreResult<Option<&'a mut Vec<Value>>> {
    match hash.get_mut(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(ids)) => Ok(Some(ids)),
        Some(other) => Err(CoreError::corrupt_hash(
            target.clone(),
            format!("has-many field {field:?} holds {}", other.kind()),
        )),
    }
}

/// One planned read-modify-write on an out-of-batch record.
#[derive(Debug, Clone)]
pub struct PendingPatch {
    target: CompositeId,
    side: PatchSide,
    mutation: PatchMutation,
    change: Arc<RelationshipChange>,
}

impl PendingPatch {
    /// Record being patched.
    #[must_use]
    pub fn target(&self) -> &CompositeId {
        &self.target
    }

    /// Side of the edge.
    #[must_use]
    pub fn side(&self) -> PatchSide {
        self.side
    }

    /// The mutation.
    #[must_use]
    pub fn mutation(&self) -> &PatchMutation {
        &self.mutation
    }

    /// The change this patch belongs to.
    #[must_use]
    pub fn change(&self) -> &Arc<RelationshipChange> {
        &self.change
    }
}

/// Result of one successful patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Record that was patched.
    pub target: CompositeId,
    /// Side of the edge.
    pub side: PatchSide,
    /// Relationship name on the patched record.
    pub relationship: String,
    /// Whether the stored hash changed.
    pub changed: bool,
    /// Whether this patch settled its change.
    pub settled: bool,
}

/// Plans and runs relationship patches.
#[derive(Debug)]
pub struct ConsistencyEngine {
    gateway: Gateway,
    gate: KeyGate,
    naming: FieldNaming,
}

impl ConsistencyEngine {
    /// Creates an engine writing through `gateway`.
    pub fn new(gateway: Gateway, naming: FieldNaming) -> Self {
        Self {
            gateway,
            gate: KeyGate::new(),
            naming,
        }
    }

    /// Returns the per-key gate.
    #[must_use]
    pub fn gate(&self) -> &KeyGate {
        &self.gate
    }

    /// Lists the patches `batch` needs, without registering them.
    ///
    /// A side needs a patch when it is present and not one of the batch's
    /// records. Parent sides also need a child to add or remove.
    #[must_use]
    pub fn plan(&self, batch: &CommitBatch) -> Vec<PendingPatch> {
        batch
            .changes()
            .iter()
            .flat_map(|change| self.plan_change(batch, change))
            .collect()
    }

    fn plan_change(&self, batch: &CommitBatch, change: &Arc<RelationshipChange>) -> Vec<PendingPatch> {
        let unloaded = |side: Option<&RecordRef>| side.filter(|r| !batch.contains(r.id())).cloned();
        let mut patches = Vec::new();

        if let Some(child) = unloaded(change.child_ref()) {
            patches.push(PendingPatch {
                target: child.id().clone(),
                side: PatchSide::Child,
                mutation: PatchMutation::SetBelongsTo {
                    field: self.naming.belongs_to_key(change.belongs_to_name()),
                    parent: change.new_parent_ref().map(|p| p.primitive_id().clone()),
                },
                change: Arc::clone(change),
            });
        }

        let Some(child) = change.child_ref() else {
            return patches;
        };
        let has_many = self.naming.has_many_key(change.has_many_name());

        if let Some(old_parent) = unloaded(change.old_parent_ref()) {
            patches.push(PendingPatch {
                target: old_parent.id().clone(),
                side: PatchSide::OldParent,
                mutation: PatchMutation::RemoveFromHasMany {
                    field: has_many.clone(),
                    child: child.primitive_id().clone(),
                },
                change: Arc::clone(change),
            });
        }

        if let Some(new_parent) = unloaded(change.new_parent_ref()) {
            patches.push(PendingPatch {
                target: new_parent.id().clone(),
                side: PatchSide::NewParent,
                mutation: PatchMutation::AddToHasMany {
                    field: has_many,
                    child: child.primitive_id().clone(),
                },
                change: Arc::clone(change),
            });
        }

        patches
    }

    /// Plans the batch's patches and registers each with its change.
    ///
    /// Call this before starting any write of the batch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if a change has already settled or failed;
    /// nothing has been written at that point.
    pub fn begin(&self, batch: &CommitBatch) -> CoreResult<Vec<PendingPatch>> {
        let patches = self.plan(batch);
        for patch in &patches {
            patch.change.wait()?;
        }
        debug!(
            changes = batch.changes().len(),
            patches = patches.len(),
            "planned relationship patches"
        );
        Ok(patches)
    }

    /// Runs one registered patch and confirms it to its change.
    ///
    /// On failure the change is marked failed.
    ///
    /// # Errors
    ///
    /// - `DanglingReference` if the target is not stored
    /// - `CorruptHash` if the target's has-many field is malformed
    /// - `Store` if the read or write fails
    pub async fn run(&self, patch: PendingPatch) -> CoreResult<PatchOutcome> {
        match self.read_modify_write(&patch).await {
            Ok(changed) => {
                let settled = patch.change.done()?;
                trace!(record = %patch.target, side = %patch.side, changed, settled, "patch applied");
                Ok(PatchOutcome {
                    relationship: match patch.side {
                        PatchSide::Child => patch.change.belongs_to_name().to_string(),
                        PatchSide::OldParent | PatchSide::NewParent => {
                            patch.change.has_many_name().to_string()
                        }
                    },
                    target: patch.target,
                    side: patch.side,
                    changed,
                    settled,
                })
            }
            Err(err) => {
                warn!(record = %patch.target, side = %patch.side, error = %err, "patch failed");
                patch.change.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn read_modify_write(&self, patch: &PendingPatch) -> CoreResult<bool> {
        let _guard = self.gate.acquire(&patch.target).await;

        let mut hash = self
            .gateway
            .open_scope()
            .get(&patch.target)
            .await?
            .ok_or_else(|| CoreError::DanglingReference {
                id: patch.target.clone(),
            })?;

        let changed = patch.mutation.apply(&patch.target, &mut hash)?;
        self.gateway.open_scope().put(hash).await?;
        Ok(changed)
    }
}
