//! Refresh, reconcile and run the background worker.

use anyhow::Result;
use stride_sync_client::{RunRepository, SyncEngine};

/// Run the refresh command: fetch all remote runs.
pub async fn refresh(engine: &SyncEngine) -> Result<()> {
    engine.repository().fetch_runs().await?;
    let status = engine.status().await?;
    println!("Fetched. {} runs stored locally.", status.runs);
    Ok(())
}

/// Run the sync command: push pending work, then fetch.
pub async fn sync(engine: &SyncEngine) -> Result<()> {
    engine.sync_now().await?;

    let status = engine.status().await?;
    println!("Synced. {} runs stored locally.", status.runs);
    if status.pending_creations + status.pending_deletions > 0 {
        println!(
            "Still pending: {} creations, {} deletions",
            status.pending_creations, status.pending_deletions
        );
    }
    Ok(())
}

/// Run the worker command.
///
/// With `once` set, runs every due job a single time and exits. Otherwise
/// starts the background executor and runs until Ctrl-C.
pub async fn worker(engine: &SyncEngine, once: bool) -> Result<()> {
    if once {
        let ran = engine.run_pending_jobs().await?;
        println!("Ran {} due jobs.", ran);
        return Ok(());
    }

    if let Some(startup) = engine.start().await? {
        startup.await?;
    }
    let executor = engine.start_executor();
    println!("Worker running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down worker");
    executor.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::session::login;
    use crate::config::{load_settings, open_engine};
    use tempfile::tempdir;

    #[tokio::test]
    async fn offline_refresh_fails() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        login(&engine, "u1", "a", "r").await.unwrap();

        assert!(refresh(&engine).await.is_err());
    }

    #[tokio::test]
    async fn worker_once_leaves_periodic_fetch_scheduled() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        login(&engine, "u1", "a", "r").await.unwrap();

        worker(&engine, true).await.unwrap();

        assert_eq!(engine.status().await.unwrap().jobs, 1);
    }
}
