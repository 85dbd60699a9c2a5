//! # RelStore Codec
//!
//! Value model, record keys and CBOR encoding for RelStore.
//!
//! This crate provides:
//! - [`Value`], the dynamic field value (no floats, strict equality)
//! - [`PrimitiveId`] and [`CompositeId`], the record key types
//! - [`StoredHash`], the persisted form of a record
//! - CBOR framing of hashes via `ciborium`
//!
//! ## Usage
//!
//! ```
//! use relstore_codec::{decode_hash, encode_hash, CompositeId, StoredHash, Value};
//!
//! let mut hash = StoredHash::new();
//! hash.set_identity(&CompositeId::new("Post", "1"));
//! hash.insert("comments", Value::from(vec!["c1"]));
//!
//! let bytes = encode_hash(&hash).unwrap();
//! assert_eq!(decode_hash(&bytes).unwrap(), hash);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod hash;
mod key;
mod value;

pub use error::{CodecError, CodecResult};
pub use frame::{decode_hash, encode_hash, from_cbor, to_cbor};
pub use hash::{StoredHash, ID_FIELD, TYPE_FIELD};
pub use key::{CompositeId, PrimitiveId};
pub use value::Value;
