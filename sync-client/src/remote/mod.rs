//! Remote run service abstraction.
//!
//! The remote service is the authority on run identifiers: a created run
//! comes back under the id the service issued. Every call either fully
//! succeeds or fails with a [`NetworkError`].
//!
//! - [`HttpRemoteSource`] talks to the run service over HTTP
//! - [`MockRemoteSource`] keeps runs in memory and can inject failures

mod http;
mod mock;

pub use http::HttpRemoteSource;
pub use mock::MockRemoteSource;

use async_trait::async_trait;
use stride_sync_types::{NetworkError, Run, RunId};

/// Network-backed CRUD for runs.
#[async_trait]
pub trait RemoteRunSource: Send + Sync {
    /// Fetch every run of the signed-in user.
    async fn fetch_runs(&self) -> Result<Vec<Run>, NetworkError>;

    /// Create a run together with its map snapshot.
    ///
    /// Returns the run as the service stored it, under the service's id.
    async fn create_run(&self, run: &Run, map_picture: &[u8]) -> Result<Run, NetworkError>;

    /// Delete a run.
    async fn delete_run(&self, id: &RunId) -> Result<(), NetworkError>;

    /// Tell the service the session ended.
    async fn logout(&self) -> Result<(), NetworkError>;

    /// Forget any credentials held by the client.
    fn clear_token(&self);
}
