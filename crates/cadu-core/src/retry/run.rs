//! Retry loop: run a closure until success, a non-retryable error, or
//! cancellation.

use super::classify;
use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Granularity at which backoff sleeps re-check the cancellation flag.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// The cancellation flag is consulted before every attempt and during
/// backoff sleeps; once set, `FetchError::Aborted` is returned.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &AtomicBool,
    mut f: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Result<T, FetchError>,
{
    let mut attempt = 1u32;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchError::Aborted);
        }
        match f() {
            Ok(value) => return Ok(value),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(delay) => {
                        sleep_cancellable(delay, cancel)?;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Sleep `total`, waking every `CANCEL_POLL` to honor cancellation promptly.
fn sleep_cancellable(total: Duration, cancel: &AtomicBool) -> Result<(), FetchError> {
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchError::Aborted);
        }
        let slice = remaining.min(CANCEL_POLL);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn returns_value_on_first_success() {
        let cancel = AtomicBool::new(false);
        let result = run_with_retry(&fast_policy(), &cancel, || Ok::<_, FetchError>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let cancel = AtomicBool::new(false);
        let attempts = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(), &cancel, || {
            if attempts.fetch_add(1, Ordering::Relaxed) < 3 {
                Err(FetchError::Http(503))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn client_errors_fail_immediately() {
        let cancel = AtomicBool::new(false);
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&fast_policy(), &cancel, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            Err(FetchError::Http(404))
        });
        assert!(matches!(result, Err(FetchError::Http(404))));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancellation_preempts_the_first_attempt() {
        let cancel = AtomicBool::new(true);
        let result: Result<(), _> = run_with_retry(&fast_policy(), &cancel, || {
            panic!("attempt must not run once cancelled")
        });
        assert!(matches!(result, Err(FetchError::Aborted)));
    }

    #[test]
    fn cancellation_stops_an_endless_retry_loop() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
        };
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&cancel);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::Relaxed);
        });
        let result: Result<(), _> = run_with_retry(&policy, &cancel, || Err(FetchError::Http(500)));
        stopper.join().unwrap();
        assert!(matches!(result, Err(FetchError::Aborted)));
    }
}
