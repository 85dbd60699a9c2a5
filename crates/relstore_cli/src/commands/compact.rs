//! Compact command implementation.

use super::inspect::format_size;
use super::{open_store, CliResult};
use std::path::Path;

/// Runs the compact command.
pub async fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    let store = open_store(path, dry_run)?;
    let before = store.stats();

    println!("Compacting {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();
    println!("  Frames:       {}", before.frames);
    println!("  Live records: {}", before.live_records);
    println!(
        "  Superseded:   {}",
        before.frames.saturating_sub(before.live_records as u64)
    );

    if dry_run {
        return Ok(());
    }

    let after = store.compact().await?;
    println!();
    println!("  Size before: {}", format_size(before.file_size));
    println!("  Size after:  {}", format_size(after.file_size));
    println!(
        "  Space saved: {}",
        format_size(before.file_size.saturating_sub(after.file_size))
    );
    Ok(())
}
