//! Error types for sync-client.

use std::path::PathBuf;
use stride_sync_types::{DataError, LocalError, NetworkError};

/// SQLite primary result code for "database or disk is full".
const SQLITE_FULL: &str = "13";

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored run payload could not be encoded.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Stored run payload could not be decoded.
    #[error("payload decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Stored job intent is unreadable.
    #[error("job intent codec error: {0}")]
    Intent(#[from] stride_sync_core::IntentError),

    /// A stored row holds a value outside its column's domain.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow {
        /// Table the row was read from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A value does not fit the column it would be stored in.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field being stored.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl StorageError {
    /// Whether SQLite reported the disk as full.
    pub fn is_disk_full(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| code == SQLITE_FULL)
            }
            _ => false,
        }
    }
}

impl From<StorageError> for LocalError {
    fn from(error: StorageError) -> Self {
        if error.is_disk_full() {
            LocalError::DiskFull
        } else {
            LocalError::Storage(error.to_string())
        }
    }
}

impl From<StorageError> for DataError {
    fn from(error: StorageError) -> Self {
        DataError::Local(error.into())
    }
}

/// Session storage errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failed to read or write the session file.
    #[error("session I/O error at {path}: {source}")]
    Io {
        /// Path of the session file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Session file contents are not valid JSON.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SessionError> for LocalError {
    fn from(error: SessionError) -> Self {
        LocalError::Storage(error.to_string())
    }
}

/// Errors of the engine facade.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Repository operation failed.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Remote client could not be built.
    #[error("remote client error: {0}")]
    Remote(String),
}

impl From<NetworkError> for EngineError {
    fn from(error: NetworkError) -> Self {
        EngineError::Data(error.into())
    }
}

impl From<LocalError> for EngineError {
    fn from(error: LocalError) -> Self {
        EngineError::Data(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_becomes_local_error() {
        let error = StorageError::CorruptRow {
            table: "runs",
            reason: "bad".into(),
        };
        let local: LocalError = error.into();
        assert!(matches!(local, LocalError::Storage(msg) if msg.contains("runs")));
    }

    #[test]
    fn storage_error_into_data_error() {
        let error = StorageError::Database(sqlx::Error::RowNotFound);
        let data: DataError = error.into();
        assert!(!data.is_network());
    }

    #[test]
    fn row_not_found_is_not_disk_full() {
        assert!(!StorageError::Database(sqlx::Error::RowNotFound).is_disk_full());
    }
}
