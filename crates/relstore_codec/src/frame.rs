//! CBOR encoding of values and hashes.
//!
//! Encoding goes through `serde`, so anything that serializes can be framed.
//! Maps come out key-sorted because `Value::Map` and `StoredHash` are backed
//! by ordered maps.

use crate::error::{CodecError, CodecResult};
use crate::hash::StoredHash;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode any serializable value to CBOR bytes.
///
/// # Errors
///
/// Returns `EncodingFailed` if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns `DecodingFailed` on malformed input, floats, or integers that
/// overflow `i64`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Encode a stored hash.
pub fn encode_hash(hash: &StoredHash) -> CodecResult<Vec<u8>> {
    to_cbor(hash)
}

/// Decode a stored hash.
pub fn decode_hash(bytes: &[u8]) -> CodecResult<StoredHash> {
    from_cbor(bytes)
}
