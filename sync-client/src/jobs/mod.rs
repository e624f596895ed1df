//! Durable job runner.
//!
//! Deferred sync work is stored as rows of the `sync_jobs` table so it
//! survives process restarts. [`SqliteJobQueue`] owns the rows and
//! [`JobExecutor`] drives them: it dispatches due jobs whose constraints
//! hold, runs the worker built for each job's intent and feeds the worker's
//! result through the pure [`JobState`] machine.

mod executor;
mod queue;

pub use executor::{ExecutorHandle, JobExecutor};
pub use queue::SqliteJobQueue;

use crate::error::StorageError;
use async_trait::async_trait;
use std::time::Duration;
use stride_sync_core::{
    BackoffPolicy, JobConstraints, JobIntent, JobRequest, JobSchedule, JobState, WorkResult,
};

/// Handle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub i64);

/// Job submission interface used by the scheduler.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Persist a job. It runs once its delay has passed and its constraints
    /// hold.
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, StorageError>;

    /// Cancel every job, queued or running. Returns how many were cancelled.
    async fn cancel_all(&self) -> Result<u64, StorageError>;

    /// Whether a job with the given tag is queued or running.
    async fn is_active_by_tag(&self, tag: &str) -> Result<bool, StorageError>;
}

/// One unit of deferred work, built for a single job execution.
#[async_trait]
pub trait SyncWorker: Send + Sync {
    /// Perform the work. `attempt` counts previous runs of the same job.
    async fn do_work(&self, attempt: u32) -> WorkResult;
}

/// Builds the worker for a job's intent.
pub trait WorkerFactory: Send + Sync {
    /// Create a worker for `intent`.
    fn create(&self, intent: &JobIntent) -> Box<dyn SyncWorker>;
}

/// A job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJob {
    /// Row id.
    pub id: i64,
    /// Query/cancellation tag.
    pub tag: String,
    /// What the job does.
    pub intent: JobIntent,
    /// When the job may run.
    pub constraints: JobConstraints,
    /// Retry timing.
    pub backoff: BackoffPolicy,
    /// Repeat interval of a periodic job.
    pub period: Option<Duration>,
    /// Number of completed runs since the last success.
    pub attempt: u32,
    /// Unix millis at which the job becomes due.
    pub next_run_at: i64,
    /// Whether a worker currently holds the job.
    pub dispatched: bool,
}

impl StoredJob {
    /// Timing parameters for the state machine.
    pub fn schedule(&self) -> JobSchedule {
        JobSchedule {
            backoff: self.backoff,
            period: self.period,
        }
    }

    /// Lifecycle state of the row.
    pub fn state(&self) -> JobState {
        if self.dispatched {
            JobState::Dispatched {
                attempt: self.attempt,
            }
        } else {
            JobState::Queued {
                attempt: self.attempt,
            }
        }
    }
}
