//! Sync scheduler.
//!
//! Decides *when* deferred work runs, never what it means: creation and
//! deletion intents are written to the pending-operation queue and a
//! network-constrained job is submitted to push them later.

use crate::error::StorageError;
use crate::jobs::JobRunner;
use crate::pending::{PendingCreation, PendingDeletion, PendingSyncStore};
use crate::session::SessionStorage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stride_sync_core::{BackoffPolicy, JobConstraints, JobIntent, JobRequest, FETCH_WORK_TAG};
use stride_sync_types::{Run, RunId};

/// Kind of deferred sync work.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncType {
    /// Push the creation of a run that failed to reach the service.
    CreateRun {
        /// Run as saved locally.
        run: Run,
        /// Map snapshot to upload with it.
        map_picture: Vec<u8>,
    },
    /// Push the deletion of a run that failed to reach the service.
    DeleteRun {
        /// Run to delete.
        run_id: RunId,
    },
    /// Periodically fetch all runs.
    FetchRuns {
        /// Repeat interval.
        interval: Duration,
    },
}

/// Scheduling interface used by the repository and the engine.
#[async_trait]
pub trait SyncRunScheduler: Send + Sync {
    /// Schedule deferred work.
    async fn schedule_sync(&self, sync: SyncType) -> Result<(), StorageError>;

    /// Cancel every outstanding and future job.
    async fn cancel_all_syncs(&self) -> Result<(), StorageError>;
}

/// Scheduler backed by the durable job runner.
pub struct JobSyncScheduler {
    pending: Arc<dyn PendingSyncStore>,
    jobs: Arc<dyn JobRunner>,
    session: Arc<dyn SessionStorage>,
    backoff: BackoffPolicy,
    fetch_initial_delay: Duration,
}

impl JobSyncScheduler {
    /// Create a scheduler.
    pub fn new(
        pending: Arc<dyn PendingSyncStore>,
        jobs: Arc<dyn JobRunner>,
        session: Arc<dyn SessionStorage>,
        backoff: BackoffPolicy,
        fetch_initial_delay: Duration,
    ) -> Self {
        Self {
            pending,
            jobs,
            session,
            backoff,
            fetch_initial_delay,
        }
    }

    async fn schedule_create(&self, run: Run, map_picture: Vec<u8>) -> Result<(), StorageError> {
        let Some(owner_id) = self.session.user_id() else {
            tracing::warn!("No session, not scheduling creation of run {}", run.id);
            return Ok(());
        };

        let run_id = run.id.clone();
        self.pending
            .upsert_pending_creation(&PendingCreation {
                run,
                map_picture,
                owner_id,
            })
            .await?;

        self.submit(JobIntent::CreateRun { run_id }).await
    }

    async fn schedule_delete(&self, run_id: RunId) -> Result<(), StorageError> {
        let Some(owner_id) = self.session.user_id() else {
            tracing::warn!("No session, not scheduling deletion of run {}", run_id);
            return Ok(());
        };

        self.pending
            .upsert_pending_deletion(&PendingDeletion {
                run_id: run_id.clone(),
                owner_id,
            })
            .await?;

        self.submit(JobIntent::DeleteRun { run_id }).await
    }

    async fn schedule_fetch(&self, interval: Duration) -> Result<(), StorageError> {
        if self.jobs.is_active_by_tag(FETCH_WORK_TAG).await? {
            tracing::debug!("Periodic fetch already scheduled");
            return Ok(());
        }

        let request = JobRequest::periodic(JobIntent::FetchRuns, interval)
            .with_constraints(JobConstraints::network_connected())
            .with_backoff(self.backoff)
            .with_initial_delay(self.fetch_initial_delay);
        self.jobs.submit(request).await?;
        tracing::info!("Scheduled periodic fetch every {}s", interval.as_secs());
        Ok(())
    }

    async fn submit(&self, intent: JobIntent) -> Result<(), StorageError> {
        let request = JobRequest::one_time(intent)
            .with_constraints(JobConstraints::network_connected())
            .with_backoff(self.backoff);
        self.jobs.submit(request).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncRunScheduler for JobSyncScheduler {
    async fn schedule_sync(&self, sync: SyncType) -> Result<(), StorageError> {
        match sync {
            SyncType::CreateRun { run, map_picture } => self.schedule_create(run, map_picture).await,
            SyncType::DeleteRun { run_id } => self.schedule_delete(run_id).await,
            SyncType::FetchRuns { interval } => self.schedule_fetch(interval).await,
        }
    }

    async fn cancel_all_syncs(&self) -> Result<(), StorageError> {
        self.jobs.cancel_all().await?;
        Ok(())
    }
}
