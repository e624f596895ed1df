//! Pending-operation queue.
//!
//! Durable ledger of writes the remote service has not confirmed yet, split
//! into pending creations and pending deletions. Rows are keyed by run id and
//! carry their owner, so each session only reconciles its own rows. The
//! ledger holds no business logic; retry timing lives in the job queue.

use crate::db::Database;
use crate::error::StorageError;
use async_trait::async_trait;
use stride_sync_types::{Run, RunId, UserId};

/// A run whose remote creation is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreation {
    /// Snapshot of the run as saved locally.
    pub run: Run,
    /// Map snapshot bytes uploaded beside the run.
    pub map_picture: Vec<u8>,
    /// User the creation belongs to.
    pub owner_id: UserId,
}

impl PendingCreation {
    /// Id of the pending run.
    pub fn run_id(&self) -> &RunId {
        &self.run.id
    }
}

/// A run whose remote deletion is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    /// Run to delete remotely.
    pub run_id: RunId,
    /// User the deletion belongs to.
    pub owner_id: UserId,
}

/// Durable storage for pending operations.
#[async_trait]
pub trait PendingSyncStore: Send + Sync {
    /// All pending creations of one user.
    async fn pending_creations(&self, owner: &UserId) -> Result<Vec<PendingCreation>, StorageError>;

    /// The pending creation of one run.
    async fn pending_creation(&self, run_id: &RunId) -> Result<Option<PendingCreation>, StorageError>;

    /// Insert or replace a pending creation.
    async fn upsert_pending_creation(&self, creation: &PendingCreation) -> Result<(), StorageError>;

    /// Remove a pending creation. Removing a missing row is not an error.
    async fn delete_pending_creation(&self, run_id: &RunId) -> Result<(), StorageError>;

    /// All pending deletions of one user.
    async fn pending_deletions(&self, owner: &UserId) -> Result<Vec<PendingDeletion>, StorageError>;

    /// The pending deletion of one run.
    async fn pending_deletion(&self, run_id: &RunId) -> Result<Option<PendingDeletion>, StorageError>;

    /// Insert or replace a pending deletion.
    async fn upsert_pending_deletion(&self, deletion: &PendingDeletion) -> Result<(), StorageError>;

    /// Remove a pending deletion. Removing a missing row is not an error.
    async fn delete_pending_deletion(&self, run_id: &RunId) -> Result<(), StorageError>;
}

/// SQLite-backed pending-operation queue.
#[derive(Clone)]
pub struct SqlitePendingStore {
    db: Database,
}

impl SqlitePendingStore {
    /// Create a queue over an open database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of pending creations and deletions across all users.
    pub async fn counts(&self) -> Result<(u64, u64), StorageError> {
        let creations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_creation")
            .fetch_one(self.db.pool())
            .await?;
        let deletions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_deletion")
            .fetch_one(self.db.pool())
            .await?;
        Ok((creations as u64, deletions as u64))
    }
}

#[async_trait]
impl PendingSyncStore for SqlitePendingStore {
    async fn pending_creations(&self, owner: &UserId) -> Result<Vec<PendingCreation>, StorageError> {
        let rows = sqlx::query_as::<_, CreationRow>(
            "SELECT run_id, owner_id, payload, attachment FROM pending_creation WHERE owner_id = ?1",
        )
        .bind(owner.as_str())
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(PendingCreation::try_from).collect()
    }

    async fn pending_creation(&self, run_id: &RunId) -> Result<Option<PendingCreation>, StorageError> {
        let row = sqlx::query_as::<_, CreationRow>(
            "SELECT run_id, owner_id, payload, attachment FROM pending_creation WHERE run_id = ?1",
        )
        .bind(run_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(PendingCreation::try_from).transpose()
    }

    async fn upsert_pending_creation(&self, creation: &PendingCreation) -> Result<(), StorageError> {
        let payload = rmp_serde::to_vec_named(&creation.run)?;

        sqlx::query(
            r#"
            INSERT INTO pending_creation (run_id, owner_id, payload, attachment)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(run_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                payload = excluded.payload,
                attachment = excluded.attachment
            "#,
        )
        .bind(creation.run.id.as_str())
        .bind(creation.owner_id.as_str())
        .bind(payload)
        .bind(creation.map_picture.as_slice())
        .execute(self.db.pool())
        .await?;

        tracing::debug!("Queued creation of run {} for {}", creation.run.id, creation.owner_id);
        Ok(())
    }

    async fn delete_pending_creation(&self, run_id: &RunId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pending_creation WHERE run_id = ?1")
            .bind(run_id.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn pending_deletions(&self, owner: &UserId) -> Result<Vec<PendingDeletion>, StorageError> {
        let rows = sqlx::query_as::<_, DeletionRow>(
            "SELECT run_id, owner_id FROM pending_deletion WHERE owner_id = ?1",
        )
        .bind(owner.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(PendingDeletion::from).collect())
    }

    async fn pending_deletion(&self, run_id: &RunId) -> Result<Option<PendingDeletion>, StorageError> {
        let row = sqlx::query_as::<_, DeletionRow>(
            "SELECT run_id, owner_id FROM pending_deletion WHERE run_id = ?1",
        )
        .bind(run_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(PendingDeletion::from))
    }

    async fn upsert_pending_deletion(&self, deletion: &PendingDeletion) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pending_deletion (run_id, owner_id)
            VALUES (?1, ?2)
            ON CONFLICT(run_id) DO UPDATE SET owner_id = excluded.owner_id
            "#,
        )
        .bind(deletion.run_id.as_str())
        .bind(deletion.owner_id.as_str())
        .execute(self.db.pool())
        .await?;

        tracing::debug!("Queued deletion of run {} for {}", deletion.run_id, deletion.owner_id);
        Ok(())
    }

    async fn delete_pending_deletion(&self, run_id: &RunId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pending_deletion WHERE run_id = ?1")
            .bind(run_id.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CreationRow {
    run_id: String,
    owner_id: String,
    payload: Vec<u8>,
    attachment: Vec<u8>,
}

impl TryFrom<CreationRow> for PendingCreation {
    type Error = StorageError;

    fn try_from(row: CreationRow) -> Result<Self, Self::Error> {
        let run: Run = rmp_serde::from_slice(&row.payload)?;
        if run.id.as_str() != row.run_id {
            return Err(StorageError::CorruptRow {
                table: "pending_creation",
                reason: format!("payload id {} does not match key {}", run.id, row.run_id),
            });
        }

        Ok(PendingCreation {
            run,
            map_picture: row.attachment,
            owner_id: UserId::new(row.owner_id),
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeletionRow {
    run_id: String,
    owner_id: String,
}

impl From<DeletionRow> for PendingDeletion {
    fn from(row: DeletionRow) -> Self {
        PendingDeletion {
            run_id: RunId::from_string(row.run_id),
            owner_id: UserId::new(row.owner_id),
        }
    }
}
