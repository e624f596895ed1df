//! Sync engine facade.
//!
//! Wires the database, stores, remote source, session, scheduler,
//! repository, workers and job executor together and owns the session
//! lifecycle.

use crate::config::{SchedulingSettings, SyncSettings};
use crate::connectivity::Connectivity;
use crate::db::Database;
use crate::error::EngineError;
use crate::jobs::{ExecutorHandle, JobExecutor, SqliteJobQueue};
use crate::pending::SqlitePendingStore;
use crate::remote::{HttpRemoteSource, RemoteRunSource};
use crate::repository::{OfflineFirstRunRepository, RunRepository};
use crate::scheduler::{JobSyncScheduler, SyncRunScheduler, SyncType};
use crate::scope::AppScope;
use crate::session::SessionStorage;
use crate::store::SqliteRunStore;
use crate::workers::SyncWorkerFactory;
use std::sync::Arc;
use std::time::Duration;
use stride_sync_types::{AuthInfo, UserId};
use tokio::task::JoinHandle;

/// Snapshot of the engine's local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Signed-in user, if any.
    pub user: Option<UserId>,
    /// Runs in the local store.
    pub runs: u64,
    /// Creations waiting for the remote service.
    pub pending_creations: u64,
    /// Deletions waiting for the remote service.
    pub pending_deletions: u64,
    /// Jobs queued or running.
    pub jobs: usize,
}

/// The offline-first sync engine.
pub struct SyncEngine {
    session: Arc<dyn SessionStorage>,
    local: Arc<SqliteRunStore>,
    pending: Arc<SqlitePendingStore>,
    queue: SqliteJobQueue,
    scheduler: Arc<JobSyncScheduler>,
    repository: OfflineFirstRunRepository,
    executor: JobExecutor,
    scope: AppScope,
    fetch_interval: Duration,
}

impl SyncEngine {
    /// Open the engine on the configured database and HTTP service.
    pub async fn open(
        settings: &SyncSettings,
        session: Arc<dyn SessionStorage>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, EngineError> {
        let db = Database::open(&settings.storage.database).await?;
        let remote = HttpRemoteSource::new(
            &settings.remote.base_url,
            settings.remote.request_timeout(),
            Arc::clone(&session),
        )
        .map_err(|e| EngineError::Remote(e.to_string()))?;

        tracing::info!(
            "Opened {} against {}",
            settings.storage.database.display(),
            remote.base_url()
        );
        Self::new(db, &settings.sync, session, Arc::new(remote), connectivity).await
    }

    /// Build the engine from its parts.
    ///
    /// Scoped work runs on the runtime of the calling task.
    pub async fn new(
        db: Database,
        settings: &SchedulingSettings,
        session: Arc<dyn SessionStorage>,
        remote: Arc<dyn RemoteRunSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, EngineError> {
        let local = Arc::new(SqliteRunStore::new(db.clone()).await?);
        let pending = Arc::new(SqlitePendingStore::new(db.clone()));
        let queue = SqliteJobQueue::new(db);
        let scope = AppScope::current();

        let scheduler = Arc::new(JobSyncScheduler::new(
            pending.clone(),
            Arc::new(queue.clone()),
            Arc::clone(&session),
            settings.backoff(),
            settings.fetch_initial_delay(),
        ));
        let repository = OfflineFirstRunRepository::new(
            local.clone(),
            remote,
            pending.clone(),
            scheduler.clone(),
            Arc::clone(&session),
            scope.clone(),
        );
        let factory = SyncWorkerFactory::new(
            repository.clone(),
            Arc::clone(&session),
            settings.max_attempts,
        );
        let executor = JobExecutor::new(
            queue.clone(),
            Arc::new(factory),
            connectivity,
            settings.poll_interval(),
        );

        Ok(Self {
            session,
            local,
            pending,
            queue,
            scheduler,
            repository,
            executor,
            scope,
            fetch_interval: settings.fetch_interval(),
        })
    }

    /// The run repository.
    pub fn repository(&self) -> &OfflineFirstRunRepository {
        &self.repository
    }

    /// The session the engine reads the signed-in user from.
    pub fn session(&self) -> &Arc<dyn SessionStorage> {
        &self.session
    }

    /// Store a new session and start syncing for it.
    ///
    /// Replaces any current session, so the remote source is told to drop
    /// the credentials of the previous one.
    pub async fn login(&self, auth: AuthInfo) -> Result<Option<JoinHandle<()>>, EngineError> {
        let user = auth.user_id.clone();
        self.session.set(Some(auth)).await?;
        self.repository.forget_remote_credentials();
        tracing::info!("Signed in as {}", user);
        self.start().await
    }

    /// Startup routine for a signed-in session.
    ///
    /// Schedules the periodic fetch, then drains the pending queue and
    /// refreshes the local store in the application scope. The returned
    /// handle completes when both are done; dropping it does not cancel
    /// them. Does nothing when signed out.
    pub async fn start(&self) -> Result<Option<JoinHandle<()>>, EngineError> {
        if self.session.user_id().is_none() {
            tracing::debug!("Not signed in, sync not started");
            return Ok(None);
        }

        self.scheduler
            .schedule_sync(SyncType::FetchRuns {
                interval: self.fetch_interval,
            })
            .await?;

        let repository = self.repository.clone();
        Ok(Some(self.scope.launch(async move {
            if let Err(e) = repository.sync_pending_runs().await {
                tracing::warn!("Startup reconciliation failed: {}", e);
            }
            if let Err(e) = repository.fetch_runs().await {
                tracing::info!("Startup fetch failed: {}", e);
            }
        })))
    }

    /// Drain the pending queue, then fetch, waiting for both.
    pub async fn sync_now(&self) -> Result<(), EngineError> {
        self.repository.sync_pending_runs().await?;
        self.repository.fetch_runs().await?;
        Ok(())
    }

    /// Start the background job executor.
    pub fn start_executor(&self) -> ExecutorHandle {
        self.executor.clone().spawn()
    }

    /// Run every job that is due now, without the background loop.
    pub async fn run_pending_jobs(&self) -> Result<usize, EngineError> {
        Ok(self.executor.run_due().await?)
    }

    /// Sign out.
    ///
    /// Cancels all jobs, ends the remote session, wipes the local store and
    /// clears the session. Local teardown always happens; the remote
    /// logout's failure is returned afterwards. Pending rows stay, scoped to
    /// their owner, and resume on that owner's next login.
    pub async fn logout(&self) -> Result<(), EngineError> {
        let cancelled = self.scheduler.cancel_all_syncs().await;
        let remote = self.repository.logout().await;
        let wiped = self.repository.delete_all_runs().await;
        let cleared = self.session.set(None).await;

        cancelled?;
        wiped?;
        cleared?;
        if let Err(e) = remote {
            tracing::info!("Remote logout failed: {}", e);
            return Err(e.into());
        }
        tracing::info!("Signed out");
        Ok(())
    }

    /// Current local state.
    pub async fn status(&self) -> Result<SyncStatus, EngineError> {
        let (pending_creations, pending_deletions) = self.pending.counts().await?;
        Ok(SyncStatus {
            user: self.session.user_id(),
            runs: self.local.count().await?,
            pending_creations,
            pending_deletions,
            jobs: self.queue.jobs().await?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticConnectivity;
    use crate::jobs::JobRunner;
    use crate::remote::MockRemoteSource;
    use crate::session::MemorySessionStorage;
    use crate::store::tests::sample_run;
    use stride_sync_core::{CREATE_WORK_TAG, FETCH_WORK_TAG};
    use stride_sync_types::{NetworkError, RunId};

    async fn engine(remote: &MockRemoteSource) -> SyncEngine {
        SyncEngine::new(
            Database::in_memory().await.unwrap(),
            &SchedulingSettings::default(),
            Arc::new(MemorySessionStorage::new()),
            Arc::new(remote.clone()),
            Arc::new(StaticConnectivity(true)),
        )
        .await
        .unwrap()
    }

    fn auth(user: &str) -> AuthInfo {
        AuthInfo::new("access", "refresh", UserId::from(user))
    }

    #[tokio::test]
    async fn start_without_session_does_nothing() {
        let remote = MockRemoteSource::new();
        let engine = engine(&remote).await;

        assert!(engine.start().await.unwrap().is_none());
        assert_eq!(remote.fetch_calls(), 0);
        assert_eq!(engine.status().await.unwrap().jobs, 0);
    }

    #[tokio::test]
    async fn login_schedules_fetch_and_refreshes() {
        let remote = MockRemoteSource::new();
        remote.insert_run(sample_run("srv-1", "u1"));
        let engine = engine(&remote).await;

        engine.login(auth("u1")).await.unwrap().unwrap().await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.user, Some(UserId::from("u1")));
        assert_eq!(status.runs, 1);
        assert!(engine.queue.is_active_by_tag(FETCH_WORK_TAG).await.unwrap());
    }

    #[tokio::test]
    async fn offline_save_is_pushed_by_executor() {
        let remote = MockRemoteSource::new();
        let engine = engine(&remote).await;
        engine.login(auth("u1")).await.unwrap().unwrap().await.unwrap();

        remote.set_offline(NetworkError::NoInternet);
        let id = engine
            .repository()
            .upsert_run(sample_run("local-1", "u1"), b"pic".to_vec())
            .await
            .unwrap();
        assert_eq!(id, RunId::from("local-1"));
        assert_eq!(engine.status().await.unwrap().pending_creations, 1);

        remote.set_online();
        // The periodic fetch is not due yet, so only the create job runs
        assert_eq!(engine.run_pending_jobs().await.unwrap(), 1);

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_creations, 0);
        assert_eq!(status.jobs, 1);
        assert_eq!(
            engine.repository().observe_runs().current()[0].id,
            RunId::from("remote-1")
        );
    }

    #[tokio::test]
    async fn logout_cancels_jobs_and_keeps_rows_for_their_owner() {
        let remote = MockRemoteSource::new();
        let engine = engine(&remote).await;
        engine.login(auth("u1")).await.unwrap().unwrap().await.unwrap();

        remote.set_offline(NetworkError::NoInternet);
        engine
            .repository()
            .upsert_run(sample_run("local-1", "u1"), vec![])
            .await
            .unwrap();
        assert!(engine.queue.is_active_by_tag(CREATE_WORK_TAG).await.unwrap());

        let result = engine.logout().await;

        assert!(matches!(result, Err(EngineError::Data(e)) if e.is_network()));
        assert!(remote.token_cleared());
        let status = engine.status().await.unwrap();
        assert_eq!(status.user, None);
        assert_eq!(status.runs, 0);
        assert_eq!(status.jobs, 0);
        assert_eq!(status.pending_creations, 1);

        // Another user's login must not push u1's creation
        remote.set_online();
        engine.login(auth("u2")).await.unwrap().unwrap().await.unwrap();
        assert_eq!(engine.run_pending_jobs().await.unwrap(), 0);
        assert!(remote.created().is_empty());
        assert_eq!(engine.status().await.unwrap().pending_creations, 1);
    }

    #[tokio::test]
    async fn login_over_existing_session_switches_user() {
        let remote = MockRemoteSource::new();
        remote.insert_run(sample_run("srv-1", "u1"));
        let engine = engine(&remote).await;
        engine.login(auth("u1")).await.unwrap().unwrap().await.unwrap();

        engine.login(auth("u2")).await.unwrap().unwrap().await.unwrap();

        assert!(remote.token_cleared());
        assert_eq!(engine.status().await.unwrap().user, Some(UserId::from("u2")));
        let id = engine
            .repository()
            .upsert_run(sample_run("local-2", "u2"), vec![])
            .await
            .unwrap();
        let created = remote.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0.owner_id, UserId::from("u2"));
        assert_eq!(id, RunId::from("remote-1"));
    }

    #[tokio::test]
    async fn sync_now_drains_then_fetches() {
        let remote = MockRemoteSource::new();
        let engine = engine(&remote).await;
        engine.session().set(Some(auth("u1"))).await.unwrap();

        remote.set_offline(NetworkError::ServerError);
        engine
            .repository()
            .upsert_run(sample_run("local-1", "u1"), vec![])
            .await
            .unwrap();
        remote.set_online();
        remote.insert_run(sample_run("srv-9", "u1"));

        engine.sync_now().await.unwrap();

        let ids: Vec<_> = engine
            .repository()
            .observe_runs()
            .current()
            .into_iter()
            .map(|run| run.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&RunId::from("remote-1")));
        assert!(ids.contains(&RunId::from("srv-9")));
    }
}
