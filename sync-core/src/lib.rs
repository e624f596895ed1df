//! # sync-core
//!
//! Pure logic for stride-sync (no I/O, instant tests).
//!
//! This crate implements the scheduling rules for deferred sync work without
//! any network or disk I/O:
//! - [`BackoffPolicy`] - exponential retry timing and the attempt ceiling
//! - [`JobIntent`], [`JobRequest`] - durable descriptions of deferred work
//! - [`JobState`] - per-job lifecycle state machine
//! - [`WorkResult`] - how a worker's outcome maps to a retry decision
//!
//! The actual I/O (database, network, timers) is performed by `sync-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod intent;
pub mod job;
pub mod outcome;

pub use backoff::{is_exhausted, BackoffPolicy, DEFAULT_BACKOFF_BASE, MAX_ATTEMPTS, MAX_BACKOFF_DELAY};
pub use intent::{
    IntentError, JobConstraints, JobIntent, JobRequest, CREATE_WORK_TAG, DELETE_WORK_TAG,
    FETCH_WORK_TAG,
};
pub use job::{JobAction, JobEvent, JobSchedule, JobState};
pub use outcome::WorkResult;
