//! Sign in and out.

use anyhow::Result;
use stride_sync_client::{AuthInfo, EngineError, SyncEngine, UserId};

/// Run the login command.
pub async fn login(engine: &SyncEngine, user: &str, access_token: &str, refresh_token: &str) -> Result<()> {
    let auth = AuthInfo::new(access_token, refresh_token, UserId::from(user));

    if let Some(startup) = engine.login(auth).await? {
        // Let the initial reconciliation and fetch finish before exiting
        startup.await?;
    }

    let status = engine.status().await?;
    println!("Signed in as {}", user);
    println!("  Runs:    {}", status.runs);
    println!(
        "  Pending: {} creations, {} deletions",
        status.pending_creations, status.pending_deletions
    );
    Ok(())
}

/// Run the logout command.
pub async fn logout(engine: &SyncEngine) -> Result<()> {
    match engine.logout().await {
        Ok(()) => {
            println!("Signed out.");
            Ok(())
        }
        Err(EngineError::Data(e)) if e.is_network() => {
            println!("Signed out locally (remote logout failed: {}).", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_settings, open_engine};
    use tempfile::tempdir;

    #[tokio::test]
    async fn login_then_logout_offline() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        let engine = open_engine(dir.path(), &settings, true).await.unwrap();

        login(&engine, "u1", "access", "refresh").await.unwrap();
        assert!(dir.path().join("session.json").exists());
        assert_eq!(engine.status().await.unwrap().user, Some(UserId::from("u1")));

        logout(&engine).await.unwrap();
        assert!(!dir.path().join("session.json").exists());
        assert_eq!(engine.status().await.unwrap().user, None);
    }

    #[tokio::test]
    async fn session_survives_reopen() {
        let dir = tempdir().unwrap();
        let settings = load_settings(dir.path(), None).unwrap();
        {
            let engine = open_engine(dir.path(), &settings, true).await.unwrap();
            login(&engine, "u1", "access", "refresh").await.unwrap();
        }

        let engine = open_engine(dir.path(), &settings, true).await.unwrap();
        assert_eq!(engine.status().await.unwrap().user, Some(UserId::from("u1")));
    }
}
