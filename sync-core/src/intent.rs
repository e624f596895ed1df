//! Durable job descriptions.
//!
//! A job survives process restarts, so everything needed to run it again is
//! captured here: what to do ([`JobIntent`]), when it may run
//! ([`JobConstraints`]), how to retry ([`BackoffPolicy`]) and whether it
//! repeats.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use stride_sync_types::RunId;
use thiserror::Error;

use crate::backoff::BackoffPolicy;

/// Tag of one-time jobs that push a pending run creation.
pub const CREATE_WORK_TAG: &str = "create_work";

/// Tag of one-time jobs that push a pending run deletion.
pub const DELETE_WORK_TAG: &str = "delete_work";

/// Tag of the periodic fetch-and-merge job.
pub const FETCH_WORK_TAG: &str = "sync_work";

/// Error encoding or decoding a stored intent.
#[derive(Debug, Error)]
pub enum IntentError {
    /// MessagePack serialization failed.
    #[error("intent serialization failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("intent deserialization failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// The unit of deferred work a job performs.
///
/// Create and delete intents only carry the run id: the data lives in the
/// pending-operation queue, so a worker always sees the newest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobIntent {
    /// Push the pending creation of a run.
    CreateRun {
        /// Run whose creation is pending.
        run_id: RunId,
    },
    /// Push the pending deletion of a run.
    DeleteRun {
        /// Run whose deletion is pending.
        run_id: RunId,
    },
    /// Fetch all runs and merge them into the local store.
    FetchRuns,
}

impl JobIntent {
    /// Tag used to query and deduplicate jobs of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateRun { .. } => CREATE_WORK_TAG,
            Self::DeleteRun { .. } => DELETE_WORK_TAG,
            Self::FetchRuns => FETCH_WORK_TAG,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IntentError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IntentError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Conditions that must hold before a job is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobConstraints {
    /// Only run while the device has network connectivity.
    pub requires_network: bool,
}

impl JobConstraints {
    /// Constraint set requiring a connected network.
    pub fn network_connected() -> Self {
        Self {
            requires_network: true,
        }
    }
}

/// A request to the job runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// What the job does.
    pub intent: JobIntent,
    /// Tag for querying and cancellation.
    pub tag: String,
    /// When the job may run.
    pub constraints: JobConstraints,
    /// Retry timing.
    pub backoff: BackoffPolicy,
    /// Delay before the first run.
    pub initial_delay: Duration,
    /// Repeat interval for periodic jobs, `None` for one-time jobs.
    pub period: Option<Duration>,
}

impl JobRequest {
    /// One-time job, eligible immediately.
    pub fn one_time(intent: JobIntent) -> Self {
        Self {
            tag: intent.tag().to_string(),
            intent,
            constraints: JobConstraints::default(),
            backoff: BackoffPolicy::default(),
            initial_delay: Duration::ZERO,
            period: None,
        }
    }

    /// Periodic job repeating every `interval`.
    pub fn periodic(intent: JobIntent, interval: Duration) -> Self {
        Self {
            period: Some(interval),
            ..Self::one_time(intent)
        }
    }

    /// Set the dispatch constraints.
    pub fn with_constraints(mut self, constraints: JobConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Set the retry policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay the first run.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Whether the job repeats.
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_tags() {
        let id = RunId::from("r1");
        assert_eq!(JobIntent::CreateRun { run_id: id.clone() }.tag(), CREATE_WORK_TAG);
        assert_eq!(JobIntent::DeleteRun { run_id: id }.tag(), DELETE_WORK_TAG);
        assert_eq!(JobIntent::FetchRuns.tag(), FETCH_WORK_TAG);
    }

    #[test]
    fn intent_bytes_roundtrip() {
        let intent = JobIntent::DeleteRun {
            run_id: RunId::from("r7"),
        };
        let bytes = intent.to_bytes().unwrap();
        assert_eq!(JobIntent::from_bytes(&bytes).unwrap(), intent);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            JobIntent::from_bytes(&[0xc1, 0x00]),
            Err(IntentError::Decode(_))
        ));
    }

    #[test]
    fn one_time_request_defaults() {
        let request = JobRequest::one_time(JobIntent::FetchRuns);
        assert_eq!(request.tag, FETCH_WORK_TAG);
        assert!(!request.is_periodic());
        assert!(!request.constraints.requires_network);
        assert_eq!(request.initial_delay, Duration::ZERO);
    }

    #[test]
    fn periodic_request_builder() {
        let request = JobRequest::periodic(JobIntent::FetchRuns, Duration::from_secs(1800))
            .with_constraints(JobConstraints::network_connected())
            .with_initial_delay(Duration::from_secs(60));

        assert!(request.is_periodic());
        assert_eq!(request.period, Some(Duration::from_secs(1800)));
        assert!(request.constraints.requires_network);
        assert_eq!(request.initial_delay, Duration::from_secs(60));
        assert_eq!(request.tag, FETCH_WORK_TAG);
    }
}
