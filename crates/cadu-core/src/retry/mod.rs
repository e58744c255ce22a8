//! Retry and backoff policy.
//!
//! Encapsulates error classification (timeouts, throttling, connection
//! failures, HTTP status families) and exponential backoff decisions so the
//! download pipeline and the catalog client share one policy. There is no
//! attempt cap; a retry loop ends on success, a non-retryable error, or
//! cancellation.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
