//! Fetch error type for retry classification.

use thiserror::Error;

/// Error returned by a single fetch attempt (transport failure, HTTP error,
/// short body, or local write failure). Classified before deciding retries.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection reset, DNS, etc.).
    #[error("{0}")]
    Transport(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Transfer ended before the advertised Content-Length was received
    /// (e.g. server closed early). Enables retry instead of silent corruption.
    #[error("partial body: expected {expected} bytes, got {received}")]
    PartialBody { expected: u64, received: u64 },
    /// Local disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The operation was abandoned because cancellation was requested.
    #[error("aborted by cancellation")]
    Aborted,
}
