//! Show sync status.

use anyhow::Result;
use std::path::Path;
use stride_sync_client::{SyncEngine, SyncSettings};

/// Run the status command.
pub async fn run(engine: &SyncEngine, settings: &SyncSettings, data_dir: &Path) -> Result<()> {
    let status = engine.status().await?;

    println!("=== stride-sync status ===");
    println!();

    match &status.user {
        Some(user) => println!("Session: signed in as {}", user),
        None => {
            println!("Session: NOT SIGNED IN");
            println!();
            println!("Run 'stride-sync login --user <id> --access-token <token>' to sign in.");
        }
    }
    println!();

    println!("Storage:");
    println!("  Data dir: {}", data_dir.display());
    println!("  Database: {}", settings.storage.database.display());
    println!("  Runs:     {}", status.runs);
    println!();

    println!("Sync:");
    println!("  Service:           {}", settings.remote.base_url);
    println!("  Pending creations: {}", status.pending_creations);
    println!("  Pending deletions: {}", status.pending_deletions);
    println!("  Scheduled jobs:    {}", status.jobs);

    Ok(())
}
