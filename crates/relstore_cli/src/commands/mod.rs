//! CLI command implementations.

pub mod compact;
pub mod get;
pub mod inspect;
pub mod query;

use relstore_codec::StoredHash;
use relstore_core::{Adapter, Config};
use relstore_storage::{LogObjectStore, LogStoreOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing log store. Commands never create one.
///
/// A read-only store leaves the file byte-for-byte as it found it.
pub fn open_store(path: &Path, read_only: bool) -> CliResult<LogObjectStore> {
    let options = LogStoreOptions::default()
        .create_if_missing(false)
        .read_only(read_only);
    debug!(path = %path.display(), read_only, "opening store");
    Ok(LogObjectStore::open(path, options)?)
}

/// Opens a read-only adapter over an existing log store.
pub fn open_adapter(path: &Path) -> CliResult<Adapter> {
    let store = open_store(path, true)?;
    Ok(Adapter::new(Config::default(), Arc::new(store)))
}

/// Renders a stored hash as JSON.
pub fn hash_to_json(hash: &StoredHash) -> CliResult<serde_json::Value> {
    Ok(serde_json::to_value(hash)?)
}
