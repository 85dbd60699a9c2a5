//! # RelStore Core
//!
//! Relationship-consistent persistence for typed records.
//!
//! This crate provides:
//! - Record identity and projection into stored hashes
//! - Commit batches and one-to-many relationship changes
//! - The consistency engine that patches unloaded sides of relationships
//! - Lookups and `_type` index scans
//! - The [`Adapter`] entry point and its event feed
//!
//! ## Example
//!
//! ```rust
//! use relstore_codec::CompositeId;
//! use relstore_core::{Adapter, CommitBatch, RecordRef, RecordSnapshot, RelationshipChange};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let adapter = Adapter::in_memory();
//! adapter
//!     .create_record(&RecordSnapshot::new("Post").with_id("1"))
//!     .await
//!     .unwrap();
//!
//! // Post 1 is not loaded, so the adapter patches its `comments` itself.
//! let change = Arc::new(
//!     RelationshipChange::new("post", "comments")
//!         .child(RecordRef::loaded(CompositeId::new("Comment", "c1")))
//!         .new_parent(RecordRef::unloaded(CompositeId::new("Post", "1"))),
//! );
//! let batch = CommitBatch::builder()
//!     .created(RecordSnapshot::new("Comment").with_id("c1").belongs_to("post", Some("1".into())))
//!     .change(Arc::clone(&change))
//!     .build()
//!     .unwrap();
//! adapter.save(&batch).await.unwrap();
//!
//! let post = adapter.find_by_id("Post", "1").await.unwrap().unwrap();
//! assert_eq!(post.hash.get("comments").unwrap().as_array().unwrap().len(), 1);
//! assert!(!change.is_pending());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod batch;
mod config;
mod consistency;
mod error;
mod events;
mod gate;
mod identity;
mod projection;
mod query;
mod record;
mod relationship;

pub use adapter::{Adapter, SaveReport};
pub use batch::{CommitBatch, CommitBatchBuilder};
pub use config::{Config, FieldNaming, IdFormat};
pub use consistency::{ConsistencyEngine, PatchMutation, PatchOutcome, PatchSide, PendingPatch};
pub use error::{CoreError, CoreResult};
pub use events::{AdapterEvent, EventFeed, EventRecord};
pub use gate::{KeyGate, KeyGuard};
pub use identity::{composite_id, composite_id_of, generate_id};
pub use projection::{extract_primitive_id, to_storage_hash};
pub use query::{matches_predicate, LoadedBatch, LoadedRecord, Predicate, QueryEngine, ScanState};
pub use record::{Record, RecordSnapshot, Relationship, RelationshipKind};
pub use relationship::{ChangeState, RecordRef, RelationshipChange};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
