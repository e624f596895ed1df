//! Offline-first run repository.
//!
//! The single entry point for reading and writing runs. Reads always come
//! from the local store. Writes commit locally first, then try the remote
//! service once; when that fails the write is queued for a background job
//! and the call still succeeds. Local storage failures are the only write
//! failures a caller ever sees.
//!
//! Writes run inside the [`AppScope`], so a caller that goes away mid-write
//! never leaves local and remote state inconsistent.

use crate::locks::RunLocks;
use crate::pending::PendingSyncStore;
use crate::remote::RemoteRunSource;
use crate::scheduler::{SyncRunScheduler, SyncType};
use crate::scope::AppScope;
use crate::session::SessionStorage;
use crate::store::{LocalRunStore, RunSubscription};
use crate::workers::{PendingPusher, PushOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use stride_sync_types::{DataError, LocalError, NetworkError, Run, RunId};

/// Read/write access to runs.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Live list of all local runs. Never touches the network.
    fn observe_runs(&self) -> RunSubscription;

    /// Fetch all remote runs into the local store.
    ///
    /// Network failures are returned and leave local data untouched.
    async fn fetch_runs(&self) -> Result<(), DataError>;

    /// Save a run and its map snapshot.
    ///
    /// Returns the id the run is stored under: the remote id when the
    /// service confirmed it right away, the local id otherwise.
    async fn upsert_run(&self, run: Run, map_picture: Vec<u8>) -> Result<RunId, DataError>;

    /// Delete a run locally and remotely.
    async fn delete_run(&self, id: &RunId) -> Result<(), DataError>;

    /// Delete every local run. Remote state is not touched.
    async fn delete_all_runs(&self) -> Result<(), DataError>;

    /// Push every pending creation and deletion of the signed-in user.
    async fn sync_pending_runs(&self) -> Result<(), DataError>;

    /// End the session on the remote service and forget the token.
    async fn logout(&self) -> Result<(), NetworkError>;
}

/// Repository over a local store, a remote source and the sync scheduler.
#[derive(Clone)]
pub struct OfflineFirstRunRepository {
    local: Arc<dyn LocalRunStore>,
    remote: Arc<dyn RemoteRunSource>,
    pending: Arc<dyn PendingSyncStore>,
    scheduler: Arc<dyn SyncRunScheduler>,
    session: Arc<dyn SessionStorage>,
    locks: RunLocks,
    scope: AppScope,
}

impl OfflineFirstRunRepository {
    /// Create a repository.
    pub fn new(
        local: Arc<dyn LocalRunStore>,
        remote: Arc<dyn RemoteRunSource>,
        pending: Arc<dyn PendingSyncStore>,
        scheduler: Arc<dyn SyncRunScheduler>,
        session: Arc<dyn SessionStorage>,
        scope: AppScope,
    ) -> Self {
        Self {
            local,
            remote,
            pending,
            scheduler,
            session,
            locks: RunLocks::new(),
            scope,
        }
    }

    pub(crate) fn pusher(&self) -> PendingPusher {
        PendingPusher {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            pending: Arc::clone(&self.pending),
            locks: self.locks.clone(),
        }
    }

    /// Drop credentials the remote source holds for the previous session.
    pub(crate) fn forget_remote_credentials(&self) {
        self.remote.clear_token();
    }

    async fn save(&self, run: Run, map_picture: Vec<u8>) -> Result<RunId, DataError> {
        let _guard = self.locks.lock(&run.id).await;

        let id = self.local.upsert_run(&run).await?;
        let run = if id == run.id { run } else { run.with_id(id) };

        match self.remote.create_run(&run, &map_picture).await {
            Ok(created) => {
                self.local.replace_run(&run.id, &created).await?;
                self.locks.record_rename(&run.id, &created.id);
                tracing::debug!("Run {} created remotely as {}", run.id, created.id);
                Ok(created.id)
            }
            Err(e) => {
                tracing::info!("Creation of run {} deferred: {}", run.id, e);
                let id = run.id.clone();
                self.scheduler
                    .schedule_sync(SyncType::CreateRun { run, map_picture })
                    .await?;
                Ok(id)
            }
        }
    }

    async fn delete(&self, id: RunId) -> Result<(), DataError> {
        let _guard = self.locks.lock(&id).await;

        // Confirmed remotely while we waited: delete the run under its new id
        let (id, _renamed_guard) = match self.locks.renamed(&id) {
            Some(current) => {
                tracing::debug!("Run {} was confirmed as {}, deleting that", id, current);
                let guard = self.locks.lock(&current).await;
                (current, Some(guard))
            }
            None => (id, None),
        };

        self.local.delete_run(&id).await?;

        // Never reached the service: dropping the queued creation is enough
        if self.pending.pending_creation(&id).await?.is_some() {
            self.pending.delete_pending_creation(&id).await?;
            tracing::debug!("Dropped pending creation of deleted run {}", id);
            return Ok(());
        }

        if let Err(e) = self.remote.delete_run(&id).await {
            tracing::info!("Deletion of run {} deferred: {}", id, e);
            self.scheduler
                .schedule_sync(SyncType::DeleteRun { run_id: id })
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunRepository for OfflineFirstRunRepository {
    fn observe_runs(&self) -> RunSubscription {
        self.local.observe_runs()
    }

    async fn fetch_runs(&self) -> Result<(), DataError> {
        let runs = self.remote.fetch_runs().await?;

        // A run whose deletion is still queued must not come back
        let runs = match self.session.user_id() {
            Some(owner) => {
                let doomed = self.pending.pending_deletions(&owner).await?;
                runs.into_iter()
                    .filter(|run| !doomed.iter().any(|d| d.run_id == run.id))
                    .collect()
            }
            None => runs,
        };

        let local = Arc::clone(&self.local);
        let count = runs.len();
        self.scope
            .run(async move { local.upsert_runs(&runs).await })
            .await??;
        tracing::debug!("Fetched {} runs", count);
        Ok(())
    }

    async fn upsert_run(&self, run: Run, map_picture: Vec<u8>) -> Result<RunId, DataError> {
        let this = self.clone();
        self.scope
            .run(async move { this.save(run, map_picture).await })
            .await?
    }

    async fn delete_run(&self, id: &RunId) -> Result<(), DataError> {
        let this = self.clone();
        let id = id.clone();
        self.scope.run(async move { this.delete(id).await }).await?
    }

    async fn delete_all_runs(&self) -> Result<(), DataError> {
        let local = Arc::clone(&self.local);
        self.scope
            .run(async move { local.delete_all_runs().await })
            .await??;
        Ok(())
    }

    async fn sync_pending_runs(&self) -> Result<(), DataError> {
        let Some(owner) = self.session.user_id() else {
            tracing::debug!("No session, nothing to reconcile");
            return Ok(());
        };

        let (creations, deletions) = tokio::try_join!(
            self.pending.pending_creations(&owner),
            self.pending.pending_deletions(&owner),
        )?;
        if creations.is_empty() && deletions.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "Reconciling {} pending creations and {} pending deletions",
            creations.len(),
            deletions.len()
        );

        let pusher = self.pusher();
        let mut tasks = Vec::with_capacity(creations.len() + deletions.len());
        for creation in creations {
            let (pusher, owner) = (pusher.clone(), owner.clone());
            let id = creation.run.id;
            tasks.push(self.scope.launch(async move {
                let outcome = pusher.push_creation(&id, &owner).await;
                (id, outcome)
            }));
        }
        for deletion in deletions {
            let (pusher, owner) = (pusher.clone(), owner.clone());
            let id = deletion.run_id;
            tasks.push(self.scope.launch(async move {
                let outcome = pusher.push_deletion(&id, &owner).await;
                (id, outcome)
            }));
        }

        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok((_, Ok(PushOutcome::Confirmed | PushOutcome::NothingPending))) => {}
                Ok((id, Ok(PushOutcome::ForeignOwner))) => {
                    tracing::warn!("Pending row of run {} changed owner during reconciliation", id)
                }
                Ok((id, Err(DataError::Network(e)))) => {
                    tracing::debug!("Run {} stays pending: {}", id, e)
                }
                Ok((id, Err(e))) => {
                    tracing::warn!("Reconciling run {} failed: {}", id, e);
                    first_error.get_or_insert(e);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => {
                    first_error.get_or_insert(DataError::Local(LocalError::Interrupted));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn logout(&self) -> Result<(), NetworkError> {
        let result = self.remote.logout().await;
        self.remote.clear_token();
        result
    }
}
