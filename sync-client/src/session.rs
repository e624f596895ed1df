//! Session storage.
//!
//! The session is the explicit context every owner-scoped component reads
//! the signed-in user from. It is set on login and cleared on logout.

use crate::error::SessionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use stride_sync_types::{AuthInfo, UserId};

/// Holder of the current session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// The current session, if signed in.
    fn get(&self) -> Option<AuthInfo>;

    /// Replace the session. `None` signs out.
    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError>;

    /// Owner of the current session.
    fn user_id(&self) -> Option<UserId> {
        self.get().map(|info| info.user_id.clone())
    }
}

/// In-memory session (tests, embedding).
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    current: RwLock<Option<AuthInfo>>,
}

impl MemorySessionStorage {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that is already signed in.
    pub fn signed_in(info: AuthInfo) -> Self {
        Self {
            current: RwLock::new(Some(info)),
        }
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    fn get(&self) -> Option<AuthInfo> {
        self.current.read().ok()?.clone()
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError> {
        if let Ok(mut current) = self.current.write() {
            *current = info;
        }
        Ok(())
    }
}

/// Session persisted as a JSON file, readable only by the owner.
///
/// The file is read once on open and written through on every change.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    current: RwLock<Option<AuthInfo>>,
}

impl FileSessionStorage {
    /// Open the session file, starting signed out if it does not exist.
    pub async fn open(path: &Path) -> Result<Self, SessionError> {
        let current = match tokio::fs::read_to_string(path).await {
            Ok(content) => Some(serde_json::from_str::<AuthInfo>(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(SessionError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            current: RwLock::new(current),
        })
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, info: Option<&AuthInfo>) -> Result<(), SessionError> {
        let io_error = |e| SessionError::Io {
            path: self.path.clone(),
            source: e,
        };

        let Some(info) = info else {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(e)),
            };
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(info)?;
        tokio::fs::write(&self.path, content).await.map_err(io_error)?;

        // Restrict permissions (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(io_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    fn get(&self) -> Option<AuthInfo> {
        self.current.read().ok()?.clone()
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), SessionError> {
        self.persist(info.as_ref()).await?;
        if let Ok(mut current) = self.current.write() {
            *current = info;
        }
        tracing::debug!("Session updated at {}", self.path.display());
        Ok(())
    }
}
