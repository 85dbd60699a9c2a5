//! One-to-many relationship changes.
//!
//! A [`RelationshipChange`] describes one edge mutation: a child moving from
//! an old parent to a new one. When a side of the edge is not part of the
//! commit batch the adapter has to patch its stored hash directly, and the
//! change stays pending until every such patch has confirmed.
//!
//! ```text
//! Open ──wait──▶ Waiting{n} ──done (n=1)──▶ Settled
//!   │               │  ▲
//!   │               └──┘ wait / done (n>1)
//!   │               │
//!   └──settle──▶ Settled          Waiting ──fail──▶ Failed
//! ```

use crate::error::{CoreError, CoreResult};
use relstore_codec::{CompositeId, PrimitiveId};
use tokio::sync::watch;

/// Reference to one side of a relationship.
///
/// Whether a side gets patched depends only on the commit batch: sides whose
/// key is not in the batch are patched. The materialized flag records what
/// the caller knew and never changes that decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    id: CompositeId,
    materialized: bool,
}

impl RecordRef {
    /// A record the record manager has loaded.
    pub fn loaded(id: CompositeId) -> Self {
        Self {
            id,
            materialized: true,
        }
    }

    /// A record known only by its key.
    pub fn unloaded(id: CompositeId) -> Self {
        Self {
            id,
            materialized: false,
        }
    }

    /// Storage key of the referenced record.
    #[must_use]
    pub fn id(&self) -> &CompositeId {
        &self.id
    }

    /// Primitive id of the referenced record.
    #[must_use]
    pub fn primitive_id(&self) -> &PrimitiveId {
        self.id.id()
    }

    /// Whether the record manager holds this record in memory.
    ///
    /// Informational only; patch planning ignores it.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }
}

/// Lifecycle of a [`RelationshipChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeState {
    /// No patch has been registered.
    Open,
    /// Patches registered but not yet confirmed.
    Waiting {
        /// Patches still running.
        outstanding: usize,
    },
    /// Every patch confirmed, or none was needed.
    Settled,
    /// A patch failed.
    Failed {
        /// Why.
        reason: String,
    },
}

impl ChangeState {
    /// True for `Settled` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed { .. })
    }
}

/// A one-to-many relationship change.
///
/// Shared between the record manager and the adapter as an
/// `Arc<RelationshipChange>`; state transitions are atomic.
///
/// # Example
///
/// ```rust
/// use relstore_codec::CompositeId;
/// use relstore_core::{ChangeState, RecordRef, RelationshipChange};
///
/// let change = RelationshipChange::new("post", "comments")
///     .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
///     .new_parent(RecordRef::unloaded(CompositeId::new("Post", "2")));
///
/// change.wait().unwrap();
/// assert!(change.done().unwrap());
/// assert_eq!(change.state(), ChangeState::Settled);
/// ```
#[derive(Debug)]
pub struct RelationshipChange {
    child: Option<RecordRef>,
    old_parent: Option<RecordRef>,
    new_parent: Option<RecordRef>,
    belongs_to: String,
    has_many: String,
    state: watch::Sender<ChangeState>,
}

impl RelationshipChange {
    /// Creates a change for the edge named `belongs_to` on the child and
    /// `has_many` on the parents. All sides start absent.
    pub fn new(belongs_to: impl Into<String>, has_many: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ChangeState::Open);
        Self {
            child: None,
            old_parent: None,
            new_parent: None,
            belongs_to: belongs_to.into(),
            has_many: has_many.into(),
            state,
        }
    }

    /// Sets the child.
    #[must_use]
    pub fn child(mut self, child: RecordRef) -> Self {
        self.child = Some(child);
        self
    }

    /// Sets the parent the child is leaving.
    #[must_use]
    pub fn old_parent(mut self, parent: RecordRef) -> Self {
        self.old_parent = Some(parent);
        self
    }

    /// Sets the parent the child is joining.
    #[must_use]
    pub fn new_parent(mut self, parent: RecordRef) -> Self {
        self.new_parent = Some(parent);
        self
    }

    /// The child, if present.
    #[must_use]
    pub fn child_ref(&self) -> Option<&RecordRef> {
        self.child.as_ref()
    }

    /// The old parent, if present.
    #[must_use]
    pub fn old_parent_ref(&self) -> Option<&RecordRef> {
        self.old_parent.as_ref()
    }

    /// The new parent, if present.
    #[must_use]
    pub fn new_parent_ref(&self) -> Option<&RecordRef> {
        self.new_parent.as_ref()
    }

    /// Name of the child's belongs-to relationship.
    #[must_use]
    pub fn belongs_to_name(&self) -> &str {
        &self.belongs_to
    }

    /// Name of the parents' has-many relationship.
    #[must_use]
    pub fn has_many_name(&self) -> &str {
        &self.has_many
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ChangeState {
        self.state.borrow().clone()
    }

    /// True until the change settles or fails.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.state.borrow().is_terminal()
    }

    /// Registers one more outstanding patch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` once the change has settled or failed.
    pub fn wait(&self) -> CoreResult<()> {
        self.transition("wait", |state| match state {
            ChangeState::Open => Some(ChangeState::Waiting { outstanding: 1 }),
            ChangeState::Waiting { outstanding } => Some(ChangeState::Waiting {
                outstanding: outstanding + 1,
            }),
            _ => None,
        })
        .map(|_| ())
    }

    /// Confirms one outstanding patch. Returns true if this settled the
    /// change.
    ///
    /// A change that already failed stays failed and returns false.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if no patch is outstanding.
    pub fn done(&self) -> CoreResult<bool> {
        let result = self.transition("done", |state| match state {
            ChangeState::Waiting { outstanding: 1 } => Some(ChangeState::Settled),
            ChangeState::Waiting { outstanding } => Some(ChangeState::Waiting {
                outstanding: outstanding - 1,
            }),
            _ => None,
        });
        match result {
            Ok(state) => Ok(state == ChangeState::Settled),
            // Failed is terminal, so this check cannot race.
            Err(_) if matches!(self.state(), ChangeState::Failed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Settles a change that needed no patches.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the change is `Open`; in particular
    /// a change cannot be settled twice.
    pub fn settle(&self) -> CoreResult<()> {
        self.transition("settle", |state| match state {
            ChangeState::Open => Some(ChangeState::Settled),
            _ => None,
        })
        .map(|_| ())
    }

    /// Marks the change failed. Returns false if it had already reached a
    /// terminal state, which is left unchanged.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ChangeState::Failed { reason };
                true
            }
        })
    }

    /// Waits until the change settles or fails and returns the final state.
    pub async fn finished(&self) -> ChangeState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(ChangeState::is_terminal).await;
        match result {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    fn transition(
        &self,
        op: &str,
        next: impl FnOnce(&ChangeState) -> Option<ChangeState>,
    ) -> CoreResult<ChangeState> {
        let mut outcome = Err(ChangeState::Open);
        self.state.send_if_modified(|state| match next(state) {
            Some(new_state) => {
                *state = new_state.clone();
                outcome = Ok(new_state);
                true
            }
            None => {
                outcome = Err(state.clone());
                false
            }
        });
        outcome.map_err(|state| {
            CoreError::invalid_operation(format!(
                "cannot {op} relationship change {}/{} in state {state:?}",
                self.belongs_to, self.has_many
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn change() -> RelationshipChange {
        RelationshipChange::new("post", "comments")
            .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
    }

    #[test]
    fn settles_only_after_every_done() {
        let change = change();
        change.wait().unwrap();
        change.wait().unwrap();
        assert_eq!(change.state(), ChangeState::Waiting { outstanding: 2 });

        assert!(!change.done().unwrap());
        assert!(change.is_pending());
        assert!(change.done().unwrap());
        assert_eq!(change.state(), ChangeState::Settled);
    }

    #[test]
    fn cannot_settle_twice() {
        let change = change();
        change.settle().unwrap();
        assert!(matches!(
            change.settle(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn cannot_settle_with_outstanding_patches() {
        let change = change();
        change.wait().unwrap();
        assert!(change.settle().is_err());
        assert_eq!(change.state(), ChangeState::Waiting { outstanding: 1 });
    }

    #[test]
    fn done_without_wait_is_rejected() {
        let change = change();
        assert!(change.done().is_err());
        assert_eq!(change.state(), ChangeState::Open);
    }

    #[test]
    fn no_waits_after_terminal() {
        let change = change();
        change.wait().unwrap();
        change.done().unwrap();
        assert!(change.wait().is_err());
    }

    #[test]
    fn fail_is_terminal_and_sticky() {
        let change = change();
        change.wait().unwrap();
        assert!(change.fail("disk full"));
        assert!(!change.fail("again"));
        assert!(!change.done().unwrap());
        assert_eq!(
            change.state(),
            ChangeState::Failed {
                reason: "disk full".to_string()
            }
        );
    }

    #[test]
    fn references() {
        let parent = CompositeId::new("Post", "2");
        let change = change().new_parent(RecordRef::unloaded(parent.clone()));
        assert_eq!(change.new_parent_ref().map(RecordRef::id), Some(&parent));
        assert!(!change.new_parent_ref().unwrap().is_materialized());
        assert!(change.old_parent_ref().is_none());
        assert_eq!(change.child_ref().unwrap().primitive_id(), &PrimitiveId::from("c1"));
        assert_eq!(change.belongs_to_name(), "post");
        assert_eq!(change.has_many_name(), "comments");
    }

    #[tokio::test]
    async fn finished_resolves_on_settle() {
        let change = Arc::new(change());
        change.wait().unwrap();

        let observer = {
            let change = Arc::clone(&change);
            tokio::spawn(async move { change.finished().await })
        };

        tokio::task::yield_now().await;
        change.done().unwrap();
        assert_eq!(observer.await.unwrap(), ChangeState::Settled);
    }

    #[tokio::test]
    async fn finished_returns_immediately_when_terminal() {
        let change = change();
        change.settle().unwrap();
        assert_eq!(change.finished().await, ChangeState::Settled);
    }
}
