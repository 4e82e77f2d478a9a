//! Sync command implementation.

use super::build_driver;
use crate::env::EnvConfig;
use mapsync_sync_engine::SyncReport;

/// Runs one sync and prints its report.
pub fn run(config: &EnvConfig) -> Result<SyncReport, Box<dyn std::error::Error>> {
    let driver = build_driver(config)?;
    let report = driver.run()?;

    println!("Sync complete ({})", report.mode);
    println!("  Fetches:  {}", report.fetches);
    println!("  Pages:    {}", report.pages);
    println!("  Inserted: {}", report.inserted);
    println!("  Updated:  {}", report.updated);
    println!("  Skipped:  {}", report.skipped);
    match &report.previous_cursor {
        Some(previous) => println!("  Cursor:   {previous} -> {}", report.cursor),
        None => println!("  Cursor:   (none) -> {}", report.cursor),
    }
    println!("  Elapsed:  {:?}", report.duration);

    Ok(report)
}
