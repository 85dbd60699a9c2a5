//! Get command implementation.

use super::{hash_to_json, open_adapter, CliResult};
use relstore_codec::PrimitiveId;
use std::path::Path;

/// Runs the get command.
pub async fn run(path: &Path, type_tag: &str, id: &str) -> CliResult<()> {
    let adapter = open_adapter(path)?;
    let id = PrimitiveId::parse_lenient(id);

    match adapter.find_by_id(type_tag, id.clone()).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&hash_to_json(&record.hash)?)?);
            Ok(())
        }
        None => Err(format!("No {type_tag} record with id {id}").into()),
    }
}
