//! # RelStore Testkit
//!
//! Test utilities for RelStore.
//!
//! This crate provides:
//! - Adapter fixtures over memory and log-file stores
//! - Blog-style `Post`/`Comment` record builders
//! - Property-based test generators using proptest
//! - A fault-injecting store wrapper
//!
//! ## Usage
//!
//! ```rust
//! use relstore_testkit::prelude::*;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let fixture = TestAdapter::memory();
//! fixture.seed([stored_post("1", &["c1"])]).await;
//! assert_eq!(fixture.has_many(&post_id("1"), COMMENTS).await, id_list(["c1"]));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
