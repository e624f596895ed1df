//! Mock remote source for testing.
//!
//! Keeps runs in memory, assigns remote ids, can inject failures and
//! captures every call for verification.

use super::RemoteRunSource;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stride_sync_types::{NetworkError, Run, RunId};

/// Mock remote source for testing.
///
/// Creation is idempotent per client id, like the real service: posting the
/// same local run twice yields the same remote run.
#[derive(Debug, Default)]
pub struct MockRemoteSource {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    runs: BTreeMap<RunId, Run>,
    assigned_ids: HashMap<RunId, RunId>,
    next_id: u64,
    created: Vec<(Run, Vec<u8>)>,
    deleted: Vec<RunId>,
    fetch_calls: usize,
    logout_calls: usize,
    token_cleared: bool,
    offline: Option<NetworkError>,
    latency: Option<Duration>,
    fail_fetch: VecDeque<NetworkError>,
    fail_create: VecDeque<NetworkError>,
    fail_delete: VecDeque<NetworkError>,
    fail_logout: VecDeque<NetworkError>,
}

impl MockRemoteSource {
    /// Create a new mock remote source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a run directly into remote state.
    pub fn insert_run(&self, run: Run) {
        let mut inner = self.inner.lock().unwrap();
        inner.runs.insert(run.id.clone(), run);
    }

    /// Runs currently held remotely.
    pub fn remote_runs(&self) -> Vec<Run> {
        let inner = self.inner.lock().unwrap();
        inner.runs.values().cloned().collect()
    }

    /// Every successful `create_run` call (run as sent, picture bytes).
    pub fn created(&self) -> Vec<(Run, Vec<u8>)> {
        let inner = self.inner.lock().unwrap();
        inner.created.clone()
    }

    /// Every successful `delete_run` call.
    pub fn deleted(&self) -> Vec<RunId> {
        let inner = self.inner.lock().unwrap();
        inner.deleted.clone()
    }

    /// Number of `fetch_runs` calls, failed ones included.
    pub fn fetch_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.fetch_calls
    }

    /// Number of `logout` calls, failed ones included.
    pub fn logout_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.logout_calls
    }

    /// Whether `clear_token` was called.
    pub fn token_cleared(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.token_cleared
    }

    /// Fail every call with `error` until [`set_online`](Self::set_online).
    pub fn set_offline(&self, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.offline = Some(error);
    }

    /// Stop failing every call.
    pub fn set_online(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.offline = None;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.latency = Some(latency);
    }

    /// Cause the next fetch_runs() to fail with the given error.
    pub fn fail_next_fetch(&self, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_fetch.push_back(error);
    }

    /// Cause the next create_run() to fail with the given error.
    pub fn fail_next_create(&self, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_create.push_back(error);
    }

    /// Cause the next delete_run() to fail with the given error.
    pub fn fail_next_delete(&self, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_delete.push_back(error);
    }

    /// Cause the next logout() to fail with the given error.
    pub fn fail_next_logout(&self, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_logout.push_back(error);
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Clone for MockRemoteSource {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MockRemoteInner {
    fn check_failure(&mut self, queue: fn(&mut Self) -> &mut VecDeque<NetworkError>) -> Result<(), NetworkError> {
        if let Some(error) = self.offline {
            return Err(error);
        }
        match queue(self).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteRunSource for MockRemoteSource {
    async fn fetch_runs(&self) -> Result<Vec<Run>, NetworkError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        inner.fetch_calls += 1;
        inner.check_failure(|i| &mut i.fail_fetch)?;
        Ok(inner.runs.values().cloned().collect())
    }

    async fn create_run(&self, run: &Run, map_picture: &[u8]) -> Result<Run, NetworkError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(|i| &mut i.fail_create)?;

        let remote_id = match inner.assigned_ids.get(&run.id) {
            Some(id) => id.clone(),
            None => {
                inner.next_id += 1;
                let id = RunId::from_string(format!("remote-{}", inner.next_id));
                inner.assigned_ids.insert(run.id.clone(), id.clone());
                id
            }
        };

        let mut stored = run.with_id(remote_id);
        stored.map_picture_url = Some(format!("https://cdn.stride.test/{}.jpg", stored.id));
        inner.runs.insert(stored.id.clone(), stored.clone());
        inner.created.push((run.clone(), map_picture.to_vec()));
        Ok(stored)
    }

    async fn delete_run(&self, id: &RunId) -> Result<(), NetworkError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check_failure(|i| &mut i.fail_delete)?;
        inner.runs.remove(id);
        inner.deleted.push(id.clone());
        Ok(())
    }

    async fn logout(&self) -> Result<(), NetworkError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        inner.logout_calls += 1;
        inner.check_failure(|i| &mut i.fail_logout)
    }

    fn clear_token(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.token_cleared = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_run;

    #[tokio::test]
    async fn create_assigns_remote_id() {
        let remote = MockRemoteSource::new();
        let run = sample_run("local-1", "u1");

        let created = remote.create_run(&run, b"png").await.unwrap();

        assert_eq!(created.id, RunId::from("remote-1"));
        assert!(created.map_picture_url.is_some());
        assert_eq!(remote.created()[0].1, b"png");
        assert_eq!(remote.remote_runs(), vec![created]);
    }

    #[tokio::test]
    async fn create_is_idempotent_per_client_id() {
        let remote = MockRemoteSource::new();
        let run = sample_run("local-1", "u1");

        let first = remote.create_run(&run, b"").await.unwrap();
        let second = remote.create_run(&run, b"").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(remote.remote_runs().len(), 1);
    }

    #[tokio::test]
    async fn queued_failures_apply_once_each() {
        let remote = MockRemoteSource::new();
        remote.fail_next_fetch(NetworkError::NoInternet);
        remote.fail_next_fetch(NetworkError::ServerError);

        assert_eq!(remote.fetch_runs().await, Err(NetworkError::NoInternet));
        assert_eq!(remote.fetch_runs().await, Err(NetworkError::ServerError));
        assert!(remote.fetch_runs().await.is_ok());
        assert_eq!(remote.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn offline_fails_everything_until_online() {
        let remote = MockRemoteSource::new();
        remote.set_offline(NetworkError::NoInternet);

        assert_eq!(
            remote.delete_run(&RunId::from("r1")).await,
            Err(NetworkError::NoInternet)
        );
        assert!(remote.deleted().is_empty());

        remote.set_online();
        remote.delete_run(&RunId::from("r1")).await.unwrap();
        assert_eq!(remote.deleted(), vec![RunId::from("r1")]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let remote = MockRemoteSource::new();
        let clone = remote.clone();

        clone.clear_token();
        assert!(remote.token_cleared());
    }
}
