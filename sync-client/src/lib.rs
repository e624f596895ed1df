//! # sync-client
//!
//! Offline-first run synchronization for stride.
//!
//! Reads are always served from a local SQLite store. Writes commit locally,
//! try the remote run service once and, when that fails, are recorded in a
//! durable pending-operation queue that background jobs drain once the
//! network is back. The service's identifiers replace local ones as soon as
//! a creation is confirmed.
//!
//! ## Features
//!
//! - **Local-first reads**: live run list over a watch channel
//! - **Durable pending queue**: creations and deletions survive restarts
//! - **Background jobs**: network-constrained retries with exponential backoff
//! - **Owner scoping**: queued work only ever runs for the user who made it
//!
//! ## Example
//!
//! ```ignore
//! use stride_sync_client::{ConnectivityMonitor, MemorySessionStorage, SyncEngine, SyncSettings};
//!
//! let settings = SyncSettings::default();
//! let engine = SyncEngine::open(
//!     &settings,
//!     Arc::new(MemorySessionStorage::new()),
//!     Arc::new(ConnectivityMonitor::always_online()),
//! )
//! .await?;
//!
//! engine.login(auth).await?;
//! let executor = engine.start_executor();
//!
//! // Succeeds offline; the run is pushed later
//! let id = engine.repository().upsert_run(run, map_picture).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectivity;
pub mod db;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod locks;
pub mod pending;
pub mod remote;
pub mod repository;
pub mod scheduler;
pub mod scope;
pub mod session;
pub mod store;
pub mod workers;

pub use config::{ConfigError, SyncSettings};
pub use connectivity::{Connectivity, ConnectivityMonitor, StaticConnectivity};
pub use db::Database;
pub use engine::{SyncEngine, SyncStatus};
pub use error::{EngineError, SessionError, StorageError};
pub use jobs::{ExecutorHandle, JobExecutor, JobRunner, SqliteJobQueue};
pub use pending::{PendingCreation, PendingDeletion, PendingSyncStore, SqlitePendingStore};
pub use remote::{HttpRemoteSource, MockRemoteSource, RemoteRunSource};
pub use repository::{OfflineFirstRunRepository, RunRepository};
pub use scheduler::{JobSyncScheduler, SyncRunScheduler, SyncType};
pub use scope::AppScope;
pub use session::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use store::{LocalRunStore, RunSubscription, SqliteRunStore};
pub use workers::SyncWorkerFactory;

pub use stride_sync_types::{AuthInfo, DataError, LocalError, NetworkError, Run, RunId, UserId};
