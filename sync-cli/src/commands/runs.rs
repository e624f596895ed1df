//! Record, delete and list runs.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use stride_sync_client::{Run, RunId, RunRepository, SessionStorage, SyncEngine};
use stride_sync_types::Location;

/// Measurements of a run to record.
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Distance in meters.
    pub distance_meters: u32,
    /// Duration.
    pub duration: Duration,
    /// Start position.
    pub location: Location,
    /// Top speed in km/h.
    pub max_speed_kmh: f64,
    /// Elevation gain in meters.
    pub total_elevation_meters: u32,
}

/// Run the record command.
pub async fn record(engine: &SyncEngine, input: RunInput, map_picture: Option<&Path>) -> Result<RunId> {
    let owner = engine
        .session()
        .user_id()
        .context("Not signed in. Run 'stride-sync login' first.")?;

    let map_picture = match map_picture {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read map picture {}", path.display()))?,
        None => Vec::new(),
    };

    let (duration_ms, started_at) = timing(now_millis(), input.duration)?;
    let run = Run {
        id: RunId::new(),
        owner_id: owner,
        started_at,
        duration_ms,
        distance_meters: input.distance_meters,
        location: input.location,
        max_speed_kmh: input.max_speed_kmh,
        total_elevation_meters: input.total_elevation_meters,
        map_picture_url: None,
    };
    let local_id = run.id.clone();

    let id = engine.repository().upsert_run(run, map_picture).await?;
    if id == local_id {
        println!("Recorded run {} (queued for upload)", id);
    } else {
        println!("Recorded run {}", id);
    }
    Ok(id)
}

/// Run the delete command.
pub async fn delete(engine: &SyncEngine, id: &str) -> Result<()> {
    engine.repository().delete_run(&RunId::from(id)).await?;
    println!("Deleted run {}", id);
    Ok(())
}

/// Run the list command.
pub async fn list(engine: &SyncEngine) -> Result<()> {
    let runs = engine.repository().observe_runs().current();
    if runs.is_empty() {
        println!("No runs.");
        return Ok(());
    }

    for run in &runs {
        let synced = if run.id.is_local_uuid() { "*" } else { " " };
        println!(
            "{}{}  {:>8.2} km  {:>8}  {:>8}  {:>5.1} km/h  {}",
            synced,
            run.id,
            f64::from(run.distance_meters) / 1000.0,
            format_duration(run.duration()),
            format_pace(run.pace()),
            run.avg_speed_kmh(),
            format_timestamp(run.started_at),
        );
    }
    println!();
    println!("{} runs (* = not yet uploaded)", runs.len());
    Ok(())
}

/// Duration in milliseconds and the start time of a run that ends at `now`.
fn timing(now: i64, duration: Duration) -> Result<(u64, i64)> {
    let Ok(duration_ms) = i64::try_from(duration.as_millis()) else {
        bail!("Duration of {}s is too long", duration.as_secs());
    };
    let Some(started_at) = now.checked_sub(duration_ms) else {
        bail!("Duration of {}s is too long", duration.as_secs());
    };
    // Non-negative after the conversion above
    Ok((duration_ms.unsigned_abs(), started_at))
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or_default()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn format_pace(pace: Option<Duration>) -> String {
    match pace {
        Some(pace) => {
            let secs = pace.as_secs();
            format!("{}:{:02} /km", secs / 60, secs % 60)
        }
        None => "-".to_string(),
    }
}

/// Format an epoch-millisecond timestamp relative to now.
fn format_timestamp(epoch_millis: i64) -> String {
    let diff = now_millis().saturating_sub(epoch_millis).max(0) / 1000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::session::login;
    use crate::config::{load_settings, open_engine};
    use tempfile::tempdir;

    fn input() -> RunInput {
        RunInput {
            distance_meters: 5_000,
            duration: Duration::from_secs(25 * 60),
            location: Location::new(52.52, 13.405),
            max_speed_kmh: 15.0,
            total_elevation_meters: 20,
        }
    }

    #[tokio::test]
    async fn record_requires_login() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();

        assert!(record(&engine, input(), None).await.is_err());
    }

    #[tokio::test]
    async fn record_offline_queues_upload() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        login(&engine, "u1", "a", "r").await.unwrap();

        let picture = dir.path().join("map.jpg");
        std::fs::write(&picture, b"jpeg").unwrap();
        let id = record(&engine, input(), Some(picture.as_path())).await.unwrap();

        assert!(id.is_local_uuid());
        let status = engine.status().await.unwrap();
        assert_eq!(status.runs, 1);
        assert_eq!(status.pending_creations, 1);
        list(&engine).await.unwrap();
    }

    #[tokio::test]
    async fn delete_unsynced_run_leaves_nothing_pending() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        login(&engine, "u1", "a", "r").await.unwrap();
        let id = record(&engine, input(), None).await.unwrap();

        delete(&engine, id.as_str()).await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.runs, 0);
        assert_eq!((status.pending_creations, status.pending_deletions), (0, 0));
    }

    #[tokio::test]
    async fn oversized_duration_is_rejected() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        login(&engine, "u1", "a", "r").await.unwrap();

        let huge = RunInput {
            duration: Duration::from_secs(u64::MAX),
            ..input()
        };
        assert!(record(&engine, huge, None).await.is_err());
        assert_eq!(engine.status().await.unwrap().runs, 0);
    }

    #[test]
    fn timing_checks_bounds() {
        assert_eq!(
            timing(10_000, Duration::from_secs(4)).unwrap(),
            (4_000, 6_000)
        );
        assert!(timing(i64::MIN + 1, Duration::from_secs(1)).is_err());
        assert!(timing(0, Duration::from_millis(i64::MAX as u64 + 1)).is_err());
    }

    #[test]
    fn durations_and_timestamps_format() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_pace(Some(Duration::from_secs(332))), "5:32 /km");
        assert_eq!(format_pace(None), "-");
        assert_eq!(format_timestamp(now_millis()), "just now");
        assert!(format_timestamp(now_millis() - 7_200_000).contains("hours"));
    }
}
