//! Configuration and engine wiring for stride-sync.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stride_sync_client::{
    Database, FileSessionStorage, MockRemoteSource, NetworkError, SessionStorage,
    StaticConnectivity, SyncEngine, SyncSettings,
};

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the session file inside the data directory.
pub const SESSION_FILE: &str = "session.json";

/// Load settings from `config` or `<data_dir>/config.toml`.
///
/// A relative database path is resolved against the data directory.
pub fn load_settings(data_dir: &Path, config: Option<&Path>) -> Result<SyncSettings> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let mut settings = SyncSettings::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if settings.storage.database.is_relative() {
        settings.storage.database = data_dir.join(&settings.storage.database);
    }
    Ok(settings)
}

/// Open the engine for a data directory.
///
/// With `offline` set every remote call fails with "no internet" and
/// network jobs never run, so writes land in the pending queue.
pub async fn open_engine(data_dir: &Path, settings: &SyncSettings, offline: bool) -> Result<SyncEngine> {
    let session: Arc<dyn SessionStorage> = Arc::new(
        FileSessionStorage::open(&session_path(data_dir))
            .await
            .context("Failed to load session")?,
    );
    let connectivity = Arc::new(StaticConnectivity(!offline));

    let engine = if offline {
        let remote = MockRemoteSource::new();
        remote.set_offline(NetworkError::NoInternet);
        let db = Database::open(&settings.storage.database)
            .await
            .context("Failed to open database")?;
        SyncEngine::new(db, &settings.sync, session, Arc::new(remote), connectivity).await?
    } else {
        SyncEngine::open(settings, session, connectivity).await?
    };
    Ok(engine)
}

/// Path of the session file.
pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_put_database_in_data_dir() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        assert_eq!(settings.storage.database, dir.path().join("stride.db"));
    }

    #[test]
    fn explicit_config_file_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[storage]
database = "/var/lib/stride/runs.db"

[remote]
base_url = "https://runs.example.com"
"#,
        )
        .unwrap();

        let settings = load_settings(dir.path(), Some(path.as_path())).unwrap();
        assert_eq!(settings.storage.database, PathBuf::from("/var/lib/stride/runs.db"));
        assert_eq!(settings.remote.base_url, "https://runs.example.com");
    }

    #[test]
    fn broken_config_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[storage\n").unwrap();
        assert!(load_settings(dir.path(), None).is_err());
    }

    #[tokio::test]
    async fn offline_engine_opens_without_session() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();

        let engine = open_engine(dir.path(), &settings, true).await.unwrap();

        assert_eq!(engine.status().await.unwrap().user, None);
        assert!(dir.path().join("stride.db").exists());
    }
}
