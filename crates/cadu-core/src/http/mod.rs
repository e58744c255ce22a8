//! Shared curl plumbing: handle configuration, response-header bookkeeping
//! (`parse`), and the three fetch shapes used by the crate: a document into
//! memory, a progress-streamed body, and a download straight to disk.
//!
//! Everything here is a single attempt returning `FetchError` for retry
//! classification; backoff loops live with the callers.

mod parse;

use crate::report::{ReportError, Reporter};
use crate::retry::FetchError;
use parse::{collect_header_line, content_length, http_status};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timeout profile for one transfer.
#[derive(Debug, Clone, Copy)]
struct Timeouts {
    connect: Duration,
    /// Hard wall-clock cap.
    total: Duration,
    /// Also abort when throughput sits below 1 KiB/s for a minute, so a
    /// large transfer on a slow link fails on stall rather than wall clock.
    stall_guard: bool,
}

/// Small catalog documents.
const DOCUMENT: Timeouts = Timeouts {
    connect: Duration::from_secs(15),
    total: Duration::from_secs(120),
    stall_guard: false,
};

/// Manifest bodies and content files.
const BULK: Timeouts = Timeouts {
    connect: Duration::from_secs(30),
    total: Duration::from_secs(3600),
    stall_guard: true,
};

fn handle(url: &str, timeouts: Timeouts) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(timeouts.connect)?;
    easy.timeout(timeouts.total)?;
    if timeouts.stall_guard {
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
    }
    Ok(easy)
}

fn ensure_success(easy: &mut curl::easy::Easy) -> Result<(), FetchError> {
    let code = easy.response_code()? as u32;
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(FetchError::Http(code))
    }
}

/// GET a small document (catalog metadata) into memory.
pub(crate) fn get(url: &str) -> Result<Vec<u8>, FetchError> {
    let mut easy = handle(url, DOCUMENT)?;
    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }
    ensure_success(&mut easy)?;
    Ok(body)
}

/// GET a manifest body, opening a reporter task once a 2xx response starts
/// and emitting one step per `chunk_size` bytes received. Task length is
/// derived from Content-Length when the server sends one.
///
/// A stopped reporter aborts the transfer with `FetchError::Aborted`; error
/// responses are buffered without progress and surface as `Http`.
pub(crate) fn get_streaming(
    url: &str,
    chunk_size: usize,
    title: &str,
    reporter: &Reporter,
) -> Result<Vec<u8>, FetchError> {
    let headers: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let headers_cb = Arc::clone(&headers);
    let mut body: Vec<u8> = Vec::new();
    let mut chunks_reported: u64 = 0;
    // None until the first body byte; Some(false) when the response is an
    // error and progress must stay silent.
    let mut reporting: Option<bool> = None;
    let mut report_err: Option<ReportError> = None;

    let mut easy = handle(url, BULK)?;
    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(move |data| {
            collect_header_line(&mut headers_cb.lock().unwrap(), data);
            true
        })?;
        transfer.write_function(|data| {
            if reporting.is_none() {
                let collected = headers.lock().unwrap();
                let ok =
                    http_status(&collected).map_or(false, |code| (200..300).contains(&code));
                let length =
                    content_length(&collected).map(|total| total.div_ceil(chunk_size as u64));
                drop(collected);
                if ok {
                    if let Err(e) = reporter.task(title, None, length) {
                        report_err = Some(e);
                        return Ok(0);
                    }
                }
                reporting = Some(ok);
            }
            body.extend_from_slice(data);
            if reporting == Some(true) {
                while chunks_reported < (body.len() / chunk_size) as u64 {
                    if let Err(e) = reporter.step(None) {
                        report_err = Some(e);
                        return Ok(0);
                    }
                    chunks_reported += 1;
                }
            }
            Ok(data.len())
        })?;
        transfer.perform()
    };

    if report_err.is_some() {
        return Err(FetchError::Aborted);
    }
    if let Err(e) = perform_result {
        return Err(FetchError::Transport(e));
    }
    ensure_success(&mut easy)?;

    // Zero-length bodies never reach the write callback; the task must
    // still appear to the observer.
    if reporting.is_none() {
        reporter
            .task(title, None, Some(0))
            .map_err(|_| FetchError::Aborted)?;
    }
    // Final partial chunk, so the step count matches ceil(len / chunk).
    let total_chunks = (body.len() as u64).div_ceil(chunk_size as u64);
    while chunks_reported < total_chunks {
        reporter.step(None).map_err(|_| FetchError::Aborted)?;
        chunks_reported += 1;
    }

    Ok(body)
}

/// GET one content file, streamed to `dest` as it arrives (no in-memory
/// buffering). Each attempt truncates `dest`, so a retried transfer starts
/// clean.
pub(crate) fn download(url: &str, dest: &Path) -> Result<(), FetchError> {
    let mut file = File::create(dest).map_err(FetchError::Storage)?;
    let bytes_written = Arc::new(AtomicU64::new(0));
    let bytes_written_in_cb = Arc::clone(&bytes_written);
    let storage_error: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
    let storage_error_cb = Arc::clone(&storage_error);

    let mut easy = handle(url, BULK)?;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(move |data| {
            match file.write_all(data) {
                Ok(()) => {
                    bytes_written_in_cb.fetch_add(data.len() as u64, Ordering::Relaxed);
                    Ok(data.len())
                }
                Err(e) => {
                    let _ = storage_error_cb.lock().unwrap().replace(e);
                    Ok(0)
                }
            }
        })?;
        if let Err(e) = transfer.perform() {
            if e.is_write_error() {
                if let Some(io_err) = storage_error.lock().unwrap().take() {
                    return Err(FetchError::Storage(io_err));
                }
            }
            return Err(FetchError::Transport(e));
        }
    }

    if let Err(e) = ensure_success(&mut easy) {
        // The error body was streamed into dest; do not leave it behind as
        // a staged candidate.
        if matches!(e, FetchError::Http(_)) {
            let _ = fs::remove_file(dest);
        }
        return Err(e);
    }

    // Detect premature close: curl reports the advertised length as a
    // negative value when the server sent no Content-Length.
    let received = bytes_written.load(Ordering::Relaxed);
    if let Ok(len) = easy.content_length_download() {
        if len >= 0.0 {
            let expected = len as u64;
            if received != expected {
                return Err(FetchError::PartialBody { expected, received });
            }
        }
    }

    Ok(())
}
