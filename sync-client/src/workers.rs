//! Background workers.
//!
//! Each worker pushes one pending-queue row to the remote service. Workers
//! are idempotent under at-least-once execution: a row that is already gone
//! means another path confirmed it, and the worker succeeds without touching
//! the network.

use crate::jobs::{SyncWorker, WorkerFactory};
use crate::locks::RunLocks;
use crate::pending::PendingSyncStore;
use crate::remote::RemoteRunSource;
use crate::repository::{OfflineFirstRunRepository, RunRepository};
use crate::session::SessionStorage;
use crate::store::LocalRunStore;
use async_trait::async_trait;
use std::sync::Arc;
use stride_sync_core::{is_exhausted, JobIntent, WorkResult};
use stride_sync_types::{DataError, RunId, UserId};

/// What happened to a pending row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// The remote service confirmed the operation and the row is gone.
    Confirmed,
    /// No row for the run; nothing to do.
    NothingPending,
    /// The row belongs to another user and was left alone.
    ForeignOwner,
}

/// Pushes single pending rows to the remote service.
///
/// Shared by the workers and the repository's reconciliation pass so both
/// confirm rows the same way, under the same per-run lock.
#[derive(Clone)]
pub(crate) struct PendingPusher {
    pub(crate) local: Arc<dyn LocalRunStore>,
    pub(crate) remote: Arc<dyn RemoteRunSource>,
    pub(crate) pending: Arc<dyn PendingSyncStore>,
    pub(crate) locks: RunLocks,
}

impl PendingPusher {
    /// Push the pending creation of `run_id`, if `owner` owns it.
    ///
    /// On success the local row moves to the remote-issued id before the
    /// pending row is removed, so a crash in between only causes a repeated
    /// (idempotent) remote create.
    pub(crate) async fn push_creation(
        &self,
        run_id: &RunId,
        owner: &UserId,
    ) -> Result<PushOutcome, DataError> {
        let _guard = self.locks.lock(run_id).await;

        let Some(creation) = self.pending.pending_creation(run_id).await? else {
            return Ok(PushOutcome::NothingPending);
        };
        if &creation.owner_id != owner {
            return Ok(PushOutcome::ForeignOwner);
        }

        let created = self
            .remote
            .create_run(&creation.run, &creation.map_picture)
            .await?;
        self.local.replace_run(run_id, &created).await?;
        self.locks.record_rename(run_id, &created.id);
        self.pending.delete_pending_creation(run_id).await?;

        tracing::info!("Run {} confirmed remotely as {}", run_id, created.id);
        Ok(PushOutcome::Confirmed)
    }

    /// Push the pending deletion of `run_id`, if `owner` owns it.
    pub(crate) async fn push_deletion(
        &self,
        run_id: &RunId,
        owner: &UserId,
    ) -> Result<PushOutcome, DataError> {
        let _guard = self.locks.lock(run_id).await;

        let Some(deletion) = self.pending.pending_deletion(run_id).await? else {
            return Ok(PushOutcome::NothingPending);
        };
        if &deletion.owner_id != owner {
            return Ok(PushOutcome::ForeignOwner);
        }

        self.remote.delete_run(run_id).await?;
        self.pending.delete_pending_deletion(run_id).await?;

        tracing::info!("Deletion of run {} confirmed remotely", run_id);
        Ok(PushOutcome::Confirmed)
    }
}

fn to_work_result(intent: &str, run_id: &RunId, outcome: Result<PushOutcome, DataError>) -> WorkResult {
    match outcome {
        Ok(PushOutcome::Confirmed | PushOutcome::NothingPending) => WorkResult::Success,
        Ok(PushOutcome::ForeignOwner) => {
            tracing::warn!("Pending {} of run {} belongs to another user", intent, run_id);
            WorkResult::Failure
        }
        Err(e) => {
            let result = WorkResult::from_data_error(&e);
            tracing::debug!("Pending {} of run {} failed: {} ({:?})", intent, run_id, e, result);
            result
        }
    }
}

/// Pushes one pending run creation.
pub struct CreateRunWorker {
    run_id: RunId,
    pusher: PendingPusher,
    session: Arc<dyn SessionStorage>,
    max_attempts: u32,
}

#[async_trait]
impl SyncWorker for CreateRunWorker {
    async fn do_work(&self, attempt: u32) -> WorkResult {
        if is_exhausted(attempt, self.max_attempts) {
            tracing::warn!(
                "Giving up on creation of run {} after {} attempts, left for reconciliation",
                self.run_id,
                attempt
            );
            return WorkResult::Failure;
        }
        let Some(owner) = self.session.user_id() else {
            tracing::warn!("No session, dropping creation job for run {}", self.run_id);
            return WorkResult::Failure;
        };

        let outcome = self.pusher.push_creation(&self.run_id, &owner).await;
        to_work_result("creation", &self.run_id, outcome)
    }
}

/// Pushes one pending run deletion.
pub struct DeleteRunWorker {
    run_id: RunId,
    pusher: PendingPusher,
    session: Arc<dyn SessionStorage>,
    max_attempts: u32,
}

#[async_trait]
impl SyncWorker for DeleteRunWorker {
    async fn do_work(&self, attempt: u32) -> WorkResult {
        if is_exhausted(attempt, self.max_attempts) {
            tracing::warn!(
                "Giving up on deletion of run {} after {} attempts, left for reconciliation",
                self.run_id,
                attempt
            );
            return WorkResult::Failure;
        }
        let Some(owner) = self.session.user_id() else {
            tracing::warn!("No session, dropping deletion job for run {}", self.run_id);
            return WorkResult::Failure;
        };

        let outcome = self.pusher.push_deletion(&self.run_id, &owner).await;
        to_work_result("deletion", &self.run_id, outcome)
    }
}

/// Fetches all runs into the local store. Never touches the pending queue.
pub struct FetchRunsWorker {
    repository: OfflineFirstRunRepository,
}

#[async_trait]
impl SyncWorker for FetchRunsWorker {
    async fn do_work(&self, _attempt: u32) -> WorkResult {
        match self.repository.fetch_runs().await {
            Ok(()) => WorkResult::Success,
            Err(e) => {
                tracing::debug!("Periodic fetch failed: {}", e);
                WorkResult::from_data_error(&e)
            }
        }
    }
}

/// Builds workers for job intents.
pub struct SyncWorkerFactory {
    repository: OfflineFirstRunRepository,
    session: Arc<dyn SessionStorage>,
    max_attempts: u32,
}

impl SyncWorkerFactory {
    /// Create a factory whose workers share the repository's stores.
    pub fn new(
        repository: OfflineFirstRunRepository,
        session: Arc<dyn SessionStorage>,
        max_attempts: u32,
    ) -> Self {
        Self {
            repository,
            session,
            max_attempts,
        }
    }
}

impl WorkerFactory for SyncWorkerFactory {
    fn create(&self, intent: &JobIntent) -> Box<dyn SyncWorker> {
        match intent {
            JobIntent::CreateRun { run_id } => Box::new(CreateRunWorker {
                run_id: run_id.clone(),
                pusher: self.repository.pusher(),
                session: Arc::clone(&self.session),
                max_attempts: self.max_attempts,
            }),
            JobIntent::DeleteRun { run_id } => Box::new(DeleteRunWorker {
                run_id: run_id.clone(),
                pusher: self.repository.pusher(),
                session: Arc::clone(&self.session),
                max_attempts: self.max_attempts,
            }),
            JobIntent::FetchRuns => Box::new(FetchRunsWorker {
                repository: self.repository.clone(),
            }),
        }
    }
}
