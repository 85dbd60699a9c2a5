//! # RelStore Storage
//!
//! The transactional store gateway for RelStore.
//!
//! This crate owns the single logical object store that records are
//! persisted into. Every record is a [`StoredHash`](relstore_codec::StoredHash)
//! kept under its `[type, id]` key, with a non-unique secondary index on
//! `_type`.
//!
//! ## Design Principles
//!
//! - Every operation completes exactly once, with a value or a [`StoreError`]
//! - Each operation runs in its own single-use [`Scope`]
//! - Index cursors advance one step at a time and never restart
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryObjectStore`] - For testing and ephemeral data
//! - [`LogObjectStore`] - Durable, backed by an append-only log file
//!
//! ## Example
//!
//! ```rust
//! use relstore_codec::{CompositeId, StoredHash};
//! use relstore_storage::{Gateway, MemoryObjectStore};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let gateway = Gateway::new(Arc::new(MemoryObjectStore::new()));
//!
//! let mut hash = StoredHash::new();
//! hash.set_identity(&CompositeId::new("Post", "1"));
//! gateway.open_scope().put(hash).await.unwrap();
//!
//! let mut cursor = gateway.open_scope().open_index_cursor("Post").await.unwrap();
//! assert!(cursor.next().await.unwrap().is_some());
//! assert!(cursor.next().await.unwrap().is_none());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod gateway;
mod log;
mod memory;
mod table;

pub use backend::{IndexCursor, ObjectStore};
pub use error::{StoreError, StoreResult};
pub use gateway::{CursorHandle, Gateway, Scope, ScopeId};
pub use log::{LogObjectStore, LogStats, LogStoreOptions};
pub use memory::MemoryObjectStore;
