//! Inspect command implementation.

use super::{open_store, CliResult};
use relstore_storage::LogStats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log file path.
    pub path: String,
    /// Log file size in bytes.
    pub file_size: u64,
    /// Frames in the log.
    pub frames: u64,
    /// Frames no longer holding a live record.
    pub superseded_frames: u64,
    /// Number of live records.
    pub live_records: usize,
    /// Live records per type tag.
    pub types: BTreeMap<String, usize>,
}

impl InspectResult {
    fn new(path: &Path, stats: LogStats) -> Self {
        Self {
            path: path.display().to_string(),
            file_size: stats.file_size,
            frames: stats.frames,
            superseded_frames: stats.frames.saturating_sub(stats.live_records as u64),
            live_records: stats.live_records,
            types: stats.types,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let store = open_store(path, true)?;
    let result = InspectResult::new(path, store.stats());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("RelStore Inspection");
    println!("===================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Log:");
    println!("  Frames:            {}", result.frames);
    println!("  Superseded frames: {}", result.superseded_frames);
    println!("  Live records:      {}", result.live_records);

    if !result.types.is_empty() {
        println!();
        println!("Types:");
        for (type_tag, count) in &result.types {
            println!("  {type_tag}: {count}");
        }
    }
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superseded_frames_count() {
        let stats = LogStats {
            frames: 7,
            live_records: 3,
            file_size: 512,
            types: BTreeMap::from([("Post".to_string(), 2), ("Comment".to_string(), 1)]),
        };
        let result = InspectResult::new(Path::new("blog.rslog"), stats);
        assert_eq!(result.superseded_frames, 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["types"]["Post"], 2);
        assert_eq!(json["path"], "blog.rslog");
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("absent.rslog"), "text").is_err());
    }
}
