//! Result of one worker execution.

use stride_sync_types::{DataError, LocalError, NetworkError};

/// What a worker reports back to the job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// Remote operation confirmed (or nothing left to do).
    Success,
    /// Transient failure, run again after backoff.
    Retry,
    /// Give up. Any pending row stays for the periodic pass.
    Failure,
}

impl WorkResult {
    /// Map a remote failure to a retry decision.
    ///
    /// Transient conditions are retried; errors that another attempt cannot
    /// fix (oversized payload, undecodable response, unknown) are permanent.
    pub fn from_network_error(error: NetworkError) -> Self {
        match error {
            NetworkError::RequestTimeout
            | NetworkError::Unauthorized
            | NetworkError::Conflict
            | NetworkError::TooManyRequests
            | NetworkError::NoInternet
            | NetworkError::ServerError => Self::Retry,
            NetworkError::PayloadTooLarge | NetworkError::Serialization | NetworkError::Unknown => {
                Self::Failure
            }
        }
    }

    /// Map any repository error to a retry decision.
    pub fn from_data_error(error: &DataError) -> Self {
        match error {
            DataError::Network(network) => Self::from_network_error(*network),
            DataError::Local(LocalError::DiskFull) => Self::Failure,
            DataError::Local(_) => Self::Retry,
        }
    }
}
