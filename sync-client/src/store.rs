//! Local run store.
//!
//! The durable source of truth for runs. Every mutation republishes the full
//! run list to live subscribers.

use crate::db::Database;
use crate::error::StorageError;
use async_trait::async_trait;
use futures_util::Stream;
use stride_sync_types::{Location, Run, RunId, UserId};
use tokio::sync::{watch, Mutex};

/// Local run storage.
#[async_trait]
pub trait LocalRunStore: Send + Sync {
    /// Subscribe to the live run list.
    fn observe_runs(&self) -> RunSubscription;

    /// Look up one run.
    async fn run(&self, id: &RunId) -> Result<Option<Run>, StorageError>;

    /// Insert or replace a run, returning the id it is stored under.
    async fn upsert_run(&self, run: &Run) -> Result<RunId, StorageError>;

    /// Insert or replace many runs in one transaction.
    async fn upsert_runs(&self, runs: &[Run]) -> Result<Vec<RunId>, StorageError>;

    /// Atomically remove `old_id` and store `run` under its own id.
    async fn replace_run(&self, old_id: &RunId, run: &Run) -> Result<(), StorageError>;

    /// Delete a run. Deleting a missing run is not an error.
    async fn delete_run(&self, id: &RunId) -> Result<(), StorageError>;

    /// Delete every run.
    async fn delete_all_runs(&self) -> Result<(), StorageError>;
}

/// Live view of the run list.
///
/// The first call to [`next`](Self::next) yields the current list, later
/// calls wait for the next mutation. Snapshots published faster than they
/// are consumed coalesce into the newest one. Dropping a subscription
/// affects nothing but itself.
#[derive(Debug, Clone)]
pub struct RunSubscription {
    rx: watch::Receiver<Vec<Run>>,
    started: bool,
}

impl RunSubscription {
    fn new(rx: watch::Receiver<Vec<Run>>) -> Self {
        Self { rx, started: false }
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` only once the store itself has been dropped.
    pub async fn next(&mut self) -> Option<Vec<Run>> {
        if !self.started {
            self.started = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// The newest snapshot, without waiting.
    pub fn current(&self) -> Vec<Run> {
        self.rx.borrow().clone()
    }

    /// Turn the subscription into a `Stream` of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = Vec<Run>> + Send {
        futures_util::stream::unfold(self, |mut sub| async move {
            let snapshot = sub.next().await?;
            Some((snapshot, sub))
        })
    }
}

/// SQLite-backed run store.
pub struct SqliteRunStore {
    db: Database,
    tx: watch::Sender<Vec<Run>>,
    /// Serializes each mutation with its publish so subscribers never see
    /// snapshots out of order.
    write_lock: Mutex<()>,
}

impl SqliteRunStore {
    /// Create a store over an open database.
    pub async fn new(db: Database) -> Result<Self, StorageError> {
        let initial = load_all(&db).await?;
        let (tx, _rx) = watch::channel(initial);
        Ok(Self {
            db,
            tx,
            write_lock: Mutex::new(()),
        })
    }

    /// Number of stored runs.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count as u64)
    }

    async fn publish(&self) -> Result<(), StorageError> {
        match load_all(&self.db).await {
            Ok(runs) => {
                self.tx.send_replace(runs);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to refresh run list for subscribers: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LocalRunStore for SqliteRunStore {
    fn observe_runs(&self) -> RunSubscription {
        RunSubscription::new(self.tx.subscribe())
    }

    async fn run(&self, id: &RunId) -> Result<Option<Run>, StorageError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, owner_id, started_at, duration_ms, distance_meters, latitude, longitude,
                   max_speed_kmh, total_elevation_meters, map_picture_url
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(Run::try_from).transpose()
    }

    async fn upsert_run(&self, run: &Run) -> Result<RunId, StorageError> {
        let columns = RunColumns::check(run)?;
        let _guard = self.write_lock.lock().await;
        upsert_query(run, &columns).execute(self.db.pool()).await?;
        self.publish().await?;
        tracing::debug!("Stored run {}", run.id);
        Ok(run.id.clone())
    }

    async fn upsert_runs(&self, runs: &[Run]) -> Result<Vec<RunId>, StorageError> {
        let columns = runs
            .iter()
            .map(RunColumns::check)
            .collect::<Result<Vec<_>, _>>()?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.pool().begin().await?;
        for (run, columns) in runs.iter().zip(&columns) {
            upsert_query(run, columns).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.publish().await?;
        tracing::debug!("Stored {} runs", runs.len());
        Ok(runs.iter().map(|run| run.id.clone()).collect())
    }

    async fn replace_run(&self, old_id: &RunId, run: &Run) -> Result<(), StorageError> {
        let columns = RunColumns::check(run)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM runs WHERE id = ?1")
            .bind(old_id.as_str())
            .execute(&mut *tx)
            .await?;
        upsert_query(run, &columns).execute(&mut *tx).await?;
        tx.commit().await?;
        self.publish().await?;
        tracing::debug!("Replaced run {} with {}", old_id, run.id);
        Ok(())
    }

    async fn delete_run(&self, id: &RunId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM runs WHERE id = ?1")
            .bind(id.as_str())
            .execute(self.db.pool())
            .await?;
        self.publish().await?;
        Ok(())
    }

    async fn delete_all_runs(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM runs")
            .execute(self.db.pool())
            .await?;
        self.publish().await?;
        tracing::debug!("Deleted {} local runs", result.rows_affected());
        Ok(())
    }
}

/// Integer columns of a run, checked against SQLite's signed 64-bit range.
struct RunColumns {
    duration_ms: i64,
    distance_meters: i64,
    total_elevation_meters: i64,
}

impl RunColumns {
    fn check(run: &Run) -> Result<Self, StorageError> {
        let duration_ms =
            i64::try_from(run.duration_ms).map_err(|_| StorageError::OutOfRange {
                field: "duration_ms",
                value: run.duration_ms.to_string(),
            })?;
        Ok(Self {
            duration_ms,
            distance_meters: i64::from(run.distance_meters),
            total_elevation_meters: i64::from(run.total_elevation_meters),
        })
    }
}

fn upsert_query<'a>(
    run: &'a Run,
    columns: &RunColumns,
) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
    sqlx::query(
        r#"
        INSERT INTO runs (id, owner_id, started_at, duration_ms, distance_meters, latitude,
                          longitude, max_speed_kmh, total_elevation_meters, map_picture_url)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            owner_id = excluded.owner_id,
            started_at = excluded.started_at,
            duration_ms = excluded.duration_ms,
            distance_meters = excluded.distance_meters,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            max_speed_kmh = excluded.max_speed_kmh,
            total_elevation_meters = excluded.total_elevation_meters,
            map_picture_url = excluded.map_picture_url
        "#,
    )
    .bind(run.id.as_str())
    .bind(run.owner_id.as_str())
    .bind(run.started_at)
    .bind(columns.duration_ms)
    .bind(columns.distance_meters)
    .bind(run.location.lat)
    .bind(run.location.long)
    .bind(run.max_speed_kmh)
    .bind(columns.total_elevation_meters)
    .bind(run.map_picture_url.as_deref())
}

async fn load_all(db: &Database) -> Result<Vec<Run>, StorageError> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, owner_id, started_at, duration_ms, distance_meters, latitude, longitude,
               max_speed_kmh, total_elevation_meters, map_picture_url
        FROM runs
        ORDER BY started_at DESC, id ASC
        "#,
    )
    .fetch_all(db.pool())
    .await?;

    rows.into_iter().map(Run::try_from).collect()
}

/// Database row for a run.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    owner_id: String,
    started_at: i64,
    duration_ms: i64,
    distance_meters: i64,
    latitude: f64,
    longitude: f64,
    max_speed_kmh: f64,
    total_elevation_meters: i64,
    map_picture_url: Option<String>,
}

impl TryFrom<RunRow> for Run {
    type Error = StorageError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StorageError::CorruptRow {
            table: "runs",
            reason: format!("{} for run {}", reason, row.id),
        };

        let duration_ms = u64::try_from(row.duration_ms).map_err(|_| corrupt("negative duration"))?;
        let distance_meters =
            u32::try_from(row.distance_meters).map_err(|_| corrupt("distance out of range"))?;
        let total_elevation_meters = u32::try_from(row.total_elevation_meters)
            .map_err(|_| corrupt("elevation out of range"))?;

        Ok(Run {
            id: RunId::from_string(row.id),
            owner_id: UserId::new(row.owner_id),
            started_at: row.started_at,
            duration_ms,
            distance_meters,
            location: Location::new(row.latitude, row.longitude),
            max_speed_kmh: row.max_speed_kmh,
            total_elevation_meters,
            map_picture_url: row.map_picture_url,
        })
    }
}
