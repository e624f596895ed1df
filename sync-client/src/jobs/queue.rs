//! SQLite-backed job queue.

use super::{JobHandle, JobRunner, StoredJob};
use crate::db::{millis, now_millis, Database};
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stride_sync_core::{BackoffPolicy, JobConstraints, JobIntent, JobRequest};
use tokio::sync::Notify;

const STATE_QUEUED: &str = "queued";
const STATE_DISPATCHED: &str = "dispatched";

/// Durable job queue over the `sync_jobs` table.
///
/// A row exists from submission until the job succeeds, gives up or is
/// cancelled, so "active" means "has a row".
#[derive(Clone)]
pub struct SqliteJobQueue {
    db: Database,
    notify: Arc<Notify>,
}

impl SqliteJobQueue {
    /// Create a queue over an open database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signalled on every submission.
    pub fn submissions(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Queued jobs due at `now` (unix millis), oldest first.
    pub async fn due_jobs(&self, now: i64, limit: u32) -> Result<Vec<StoredJob>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, tag, intent, requires_network, backoff_base_ms, period_ms, attempt,
                   next_run_at, state
            FROM sync_jobs
            WHERE state = ?1 AND next_run_at <= ?2
            ORDER BY next_run_at ASC, id ASC
            LIMIT ?3
            "#,
        )
        .bind(STATE_QUEUED)
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(StoredJob::try_from).collect()
    }

    /// All jobs, queued and dispatched.
    pub async fn jobs(&self) -> Result<Vec<StoredJob>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, tag, intent, requires_network, backoff_base_ms, period_ms, attempt,
                   next_run_at, state
            FROM sync_jobs
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(StoredJob::try_from).collect()
    }

    /// Claim a queued job for a worker. `false` when the job is gone or
    /// already claimed.
    pub async fn mark_dispatched(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE sync_jobs SET state = ?1 WHERE id = ?2 AND state = ?3")
            .bind(STATE_DISPATCHED)
            .bind(id)
            .bind(STATE_QUEUED)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Put a job back in the queue. `false` when the job was cancelled in
    /// the meantime.
    pub async fn reschedule(&self, id: i64, attempt: u32, delay: Duration) -> Result<bool, StorageError> {
        let next_run_at = now_millis().saturating_add(millis(delay));
        let result = sqlx::query(
            "UPDATE sync_jobs SET state = ?1, attempt = ?2, next_run_at = ?3 WHERE id = ?4",
        )
        .bind(STATE_QUEUED)
        .bind(i64::from(attempt))
        .bind(next_run_at)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a job. `false` when it was already gone.
    pub async fn remove(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM sync_jobs WHERE id = ?1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Return jobs left dispatched by a crash to the queue, due now.
    pub async fn recover_interrupted(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("UPDATE sync_jobs SET state = ?1, next_run_at = ?2 WHERE state = ?3")
            .bind(STATE_QUEUED)
            .bind(now_millis())
            .bind(STATE_DISPATCHED)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!("Recovered {} interrupted jobs", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobRunner for SqliteJobQueue {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, StorageError> {
        let intent = request.intent.to_bytes()?;
        let now = now_millis();
        let next_run_at = now.saturating_add(millis(request.initial_delay));

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sync_jobs (tag, intent, requires_network, backoff_base_ms, period_ms,
                                   attempt, next_run_at, state, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(&request.tag)
        .bind(intent)
        .bind(request.constraints.requires_network)
        .bind(millis(request.backoff.base()))
        .bind(request.period.map(millis))
        .bind(next_run_at)
        .bind(STATE_QUEUED)
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;

        tracing::debug!("Submitted job {} ({:?}) tagged {}", id, request.intent, request.tag);
        self.notify.notify_one();
        Ok(JobHandle(id))
    }

    async fn cancel_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM sync_jobs")
            .execute(self.db.pool())
            .await?;

        tracing::info!("Cancelled {} sync jobs", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn is_active_by_tag(&self, tag: &str) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_jobs WHERE tag = ?1")
            .bind(tag)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count > 0)
    }
}

/// Database row for a job.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    tag: String,
    intent: Vec<u8>,
    requires_network: bool,
    backoff_base_ms: i64,
    period_ms: Option<i64>,
    attempt: i64,
    next_run_at: i64,
    state: String,
}

impl TryFrom<JobRow> for StoredJob {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StorageError::CorruptRow {
            table: "sync_jobs",
            reason,
        };

        let dispatched = match row.state.as_str() {
            STATE_QUEUED => false,
            STATE_DISPATCHED => true,
            other => return Err(corrupt(format!("unknown state {} of job {}", other, row.id))),
        };
        let backoff_base_ms = u64::try_from(row.backoff_base_ms)
            .map_err(|_| corrupt(format!("negative backoff of job {}", row.id)))?;
        let attempt = u32::try_from(row.attempt)
            .map_err(|_| corrupt(format!("attempt out of range for job {}", row.id)))?;
        let period = row
            .period_ms
            .map(|ms| {
                u64::try_from(ms)
                    .map(Duration::from_millis)
                    .map_err(|_| corrupt(format!("negative period of job {}", row.id)))
            })
            .transpose()?;

        Ok(StoredJob {
            id: row.id,
            tag: row.tag,
            intent: JobIntent::from_bytes(&row.intent)?,
            constraints: JobConstraints {
                requires_network: row.requires_network,
            },
            backoff: BackoffPolicy::exponential(Duration::from_millis(backoff_base_ms)),
            period,
            attempt,
            next_run_at: row.next_run_at,
            dispatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_sync_core::{JobState, CREATE_WORK_TAG, FETCH_WORK_TAG};
    use stride_sync_types::RunId;

    async fn create_queue() -> SqliteJobQueue {
        SqliteJobQueue::new(Database::in_memory().await.unwrap())
    }

    fn create_request(id: &str) -> JobRequest {
        JobRequest::one_time(JobIntent::CreateRun {
            run_id: RunId::from(id),
        })
        .with_constraints(JobConstraints::network_connected())
        .with_backoff(BackoffPolicy::exponential(Duration::from_millis(2000)))
    }

    #[tokio::test]
    async fn submitted_job_is_due_and_active() {
        let queue = create_queue().await;
        let handle = queue.submit(create_request("r1")).await.unwrap();

        let due = queue.due_jobs(now_millis(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, handle.0);
        assert_eq!(due[0].tag, CREATE_WORK_TAG);
        assert!(due[0].constraints.requires_network);
        assert_eq!(due[0].backoff.base(), Duration::from_secs(2));
        assert_eq!(due[0].state(), JobState::Queued { attempt: 0 });
        assert!(queue.is_active_by_tag(CREATE_WORK_TAG).await.unwrap());
        assert!(!queue.is_active_by_tag(FETCH_WORK_TAG).await.unwrap());
    }

    #[tokio::test]
    async fn initial_delay_defers_job() {
        let queue = create_queue().await;
        let request = JobRequest::periodic(JobIntent::FetchRuns, Duration::from_secs(1800))
            .with_initial_delay(Duration::from_secs(1800));
        queue.submit(request).await.unwrap();

        assert!(queue.due_jobs(now_millis(), 10).await.unwrap().is_empty());
        let later = now_millis() + 1_800_001;
        let due = queue.due_jobs(later, 10).await.unwrap();
        assert_eq!(due[0].period, Some(Duration::from_secs(1800)));
        assert!(queue.is_active_by_tag(FETCH_WORK_TAG).await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_is_claimed_once() {
        let queue = create_queue().await;
        let handle = queue.submit(create_request("r1")).await.unwrap();

        assert!(queue.mark_dispatched(handle.0).await.unwrap());
        assert!(!queue.mark_dispatched(handle.0).await.unwrap());
        assert!(queue.due_jobs(now_millis(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reschedule_returns_job_to_queue() {
        let queue = create_queue().await;
        let handle = queue.submit(create_request("r1")).await.unwrap();
        queue.mark_dispatched(handle.0).await.unwrap();

        assert!(queue.reschedule(handle.0, 1, Duration::ZERO).await.unwrap());

        let due = queue.due_jobs(now_millis(), 10).await.unwrap();
        assert_eq!(due[0].attempt, 1);
        assert!(!due[0].dispatched);
    }

    #[tokio::test]
    async fn cancel_all_removes_everything() {
        let queue = create_queue().await;
        let first = queue.submit(create_request("r1")).await.unwrap();
        queue.submit(create_request("r2")).await.unwrap();
        queue.mark_dispatched(first.0).await.unwrap();

        assert_eq!(queue.cancel_all().await.unwrap(), 2);
        assert!(!queue.is_active_by_tag(CREATE_WORK_TAG).await.unwrap());

        // In-flight results land on a missing row
        assert!(!queue.reschedule(first.0, 1, Duration::ZERO).await.unwrap());
        assert!(!queue.remove(first.0).await.unwrap());
    }

    #[tokio::test]
    async fn interrupted_jobs_are_recovered() {
        let queue = create_queue().await;
        let handle = queue.submit(create_request("r1")).await.unwrap();
        queue.mark_dispatched(handle.0).await.unwrap();

        assert_eq!(queue.recover_interrupted().await.unwrap(), 1);

        let jobs = queue.jobs().await.unwrap();
        assert_eq!(jobs[0].state(), JobState::Queued { attempt: 0 });
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let queue = SqliteJobQueue::new(Database::open(&path).await.unwrap());
        queue.submit(create_request("r1")).await.unwrap();
        drop(queue);

        let queue = SqliteJobQueue::new(Database::open(&path).await.unwrap());
        let jobs = queue.jobs().await.unwrap();
        assert_eq!(
            jobs[0].intent,
            JobIntent::CreateRun {
                run_id: RunId::from("r1")
            }
        );
    }

    #[tokio::test]
    async fn unknown_state_is_corrupt() {
        let queue = create_queue().await;
        let handle = queue.submit(create_request("r1")).await.unwrap();
        sqlx::query("UPDATE sync_jobs SET state = 'weird' WHERE id = ?1")
            .bind(handle.0)
            .execute(queue.db.pool())
            .await
            .unwrap();

        assert!(matches!(
            queue.jobs().await,
            Err(StorageError::CorruptRow { table: "sync_jobs", .. })
        ));
    }
}
