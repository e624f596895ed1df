//! Error taxonomy for stride-sync.
//!
//! Network errors are never fatal to a write: the repository turns them into
//! queued retries. Local errors are always surfaced to the caller.

use thiserror::Error;

/// Failure reported by the remote run service or the path to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NetworkError {
    /// The request timed out.
    #[error("request timed out")]
    RequestTimeout,

    /// The service rejected the credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The service reported a conflicting resource.
    #[error("conflict")]
    Conflict,

    /// Rate limit exceeded.
    #[error("too many requests")]
    TooManyRequests,

    /// No connectivity to the service.
    #[error("no internet connection")]
    NoInternet,

    /// Request body (e.g. the map picture) too large.
    #[error("payload too large")]
    PayloadTooLarge,

    /// 5xx response.
    #[error("server error")]
    ServerError,

    /// Response body could not be decoded.
    #[error("serialization error")]
    Serialization,

    /// Anything else.
    #[error("unknown network error")]
    Unknown,
}

/// Failure of the local store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    /// The device ran out of storage.
    #[error("disk full")]
    DiskFull,

    /// Any other storage failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The application scope shut down before the operation completed.
    #[error("interrupted by application shutdown")]
    Interrupted,
}

/// Error returned by repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Remote failure (only surfaced by operations with no local fallback).
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Local storage failure.
    #[error("local error: {0}")]
    Local(#[from] LocalError),
}

impl DataError {
    /// Whether this error came from the remote side.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DataError::from(NetworkError::NoInternet);
        assert_eq!(err.to_string(), "network error: no internet connection");

        let err = DataError::from(LocalError::DiskFull);
        assert_eq!(err.to_string(), "local error: disk full");
    }

    #[test]
    fn network_classification() {
        assert!(DataError::from(NetworkError::ServerError).is_network());
        assert!(!DataError::from(LocalError::Interrupted).is_network());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DataError>();
    }
}
