//! Bounded download pool that fetches content hashes into the staging area.
//!
//! A fixed set of worker threads consumes a FIFO queue of requests; finished
//! transfers flow back through a bounded completion channel, so at most
//! `workers` transfers are in flight and at most `prefetch` completions are
//! buffered, regardless of how long the request list is. Completion order is
//! arrival order, not submission order.

use crate::http;
use crate::report::ReportError;
use crate::retry::{run_with_retry, FetchError, RetryPolicy};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_PREFETCH: usize = 32;

/// One download: content hash (also the staging file name), resolved URL,
/// and the logical relative path the content will materialize at.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub hash: String,
    pub url: String,
    pub path: String,
}

/// What happened to a request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// The body was streamed into the staging area.
    Done,
    /// Cancellation was requested before the request started; nothing was
    /// written.
    Skipped,
}

/// Completion record delivered to the consumer. Carries the original
/// request so callers can correlate results without a side table.
#[derive(Debug)]
pub struct Completion {
    pub request: FetchRequest,
    pub result: Result<Fetched, FetchError>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Parallel worker threads (bounds connection count).
    pub workers: usize,
    /// Completion channel capacity (bounds pending-result memory).
    pub prefetch: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            prefetch: DEFAULT_PREFETCH,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("download of {path} failed: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("download pool stopped by cancellation")]
    Stopped,
    #[error("download worker panicked")]
    WorkerPanic,
}

/// Run every request to completion through a bounded worker pool, invoking
/// `on_complete` once per completion in arrival order.
///
/// A failed request does not stop the pool; the first error is returned
/// after the queue drains. Workers consult `cancel` before each request and
/// emit no-op `Skipped` completions once it is set, so every request is
/// accounted for even when cancelled. If `on_complete` itself fails (the
/// reporter was stopped), the pool is cancelled and drained the same way.
pub fn run(
    requests: Vec<FetchRequest>,
    dest: &Path,
    options: &PipelineOptions,
    cancel: Arc<AtomicBool>,
    mut on_complete: impl FnMut(&Completion) -> Result<(), ReportError>,
) -> Result<(), PipelineError> {
    if requests.is_empty() {
        return Ok(());
    }
    let count = requests.len();
    let work: Arc<Mutex<VecDeque<FetchRequest>>> =
        Arc::new(Mutex::new(requests.into_iter().collect()));
    let (tx, rx) = sync_channel::<Completion>(options.prefetch.max(1));
    let num_workers = options.workers.clamp(1, count);

    let mut handles = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let cancel = Arc::clone(&cancel);
        let dest = dest.to_path_buf();
        let policy = options.retry;
        handles.push(std::thread::spawn(move || {
            loop {
                let request = match work.lock().unwrap().pop_front() {
                    Some(r) => r,
                    None => break,
                };
                let completion = if cancel.load(Ordering::Relaxed) {
                    Completion {
                        request,
                        result: Ok(Fetched::Skipped),
                    }
                } else {
                    let target = dest.join(&request.hash);
                    let result =
                        run_with_retry(&policy, &cancel, || http::download(&request.url, &target))
                            .map(|()| Fetched::Done);
                    Completion { request, result }
                };
                if tx.send(completion).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut first_error: Option<PipelineError> = None;
    let mut observer_lost = false;
    for _ in 0..count {
        let completion = match rx.recv() {
            Ok(c) => c,
            Err(_) => {
                first_error.get_or_insert(PipelineError::WorkerPanic);
                break;
            }
        };
        if !observer_lost && on_complete(&completion).is_err() {
            // Reporter stopped mid-download: stop issuing new requests but
            // keep draining so workers can exit cleanly.
            cancel.store(true, Ordering::Relaxed);
            observer_lost = true;
        }
        match completion.result {
            Ok(_) => {}
            Err(FetchError::Aborted) => {}
            Err(source) => {
                tracing::warn!(path = %completion.request.path, error = %source, "download failed");
                if first_error.is_none() {
                    first_error = Some(PipelineError::Fetch {
                        path: completion.request.path,
                        source,
                    });
                }
            }
        }
    }

    for handle in handles {
        if handle.join().is_err() && first_error.is_none() {
            first_error = Some(PipelineError::WorkerPanic);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if observer_lost {
        return Err(PipelineError::Stopped);
    }
    Ok(())
}
