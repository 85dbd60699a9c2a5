//! Query command implementation.

use super::{hash_to_json, open_adapter, CliResult};
use relstore_codec::Value;
use relstore_core::Predicate;
use std::path::Path;

/// Runs the query command.
pub async fn run(path: &Path, type_tag: &str, conditions: &[String]) -> CliResult<()> {
    let predicate = parse_predicate(conditions)?;
    let adapter = open_adapter(path)?;

    let batch = adapter.find_query(type_tag, &predicate).await?;
    let records = batch
        .records()
        .iter()
        .map(|record| hash_to_json(&record.hash))
        .collect::<CliResult<Vec<_>>>()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} {type_tag} record(s) matched", records.len());
    Ok(())
}

/// Parses `field=value` conditions into a predicate.
///
/// Later conditions on the same field win.
pub fn parse_predicate(conditions: &[String]) -> CliResult<Predicate> {
    let mut predicate = Predicate::new();
    for condition in conditions {
        let (field, raw) = condition
            .split_once('=')
            .ok_or_else(|| format!("Condition '{condition}' is not field=value"))?;
        if field.is_empty() {
            return Err(format!("Condition '{condition}' has no field name").into());
        }
        predicate.insert(field.to_string(), parse_literal(raw));
    }
    Ok(predicate)
}

/// Reads a condition value.
///
/// JSON literals keep their type, so `1` is an integer and `"1"` is text.
/// Anything that is not a JSON literal is taken as plain text.
pub fn parse_literal(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|json| from_json(&json))
        .unwrap_or_else(|| Value::Text(raw.to_string()))
}

fn from_json(json: &serde_json::Value) -> Option<Value> {
    Some(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        // Stored values have no floats.
        serde_json::Value::Number(n) => Value::Integer(n.as_i64()?),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(from_json).collect::<Option<_>>()?)
        }
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<_>>()?,
        ),
    })
}
