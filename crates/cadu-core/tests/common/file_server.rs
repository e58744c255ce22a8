//! Minimal HTTP/1.1 file server for integration tests.
//!
//! Serves a fixed set of path -> body entries; GET only, Content-Length
//! always set, request paths percent-decoded. Options allow failing the
//! first N requests with a chosen status (to exercise retry), and every
//! requested path lands in a shared log so tests can assert which
//! downloads were actually issued.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Default)]
pub struct FileServerOptions {
    /// Fail this many matching requests before serving normally.
    pub fail_times: usize,
    /// Status used for injected failures (0 behaves like 503).
    pub fail_status: u16,
    /// Restrict failure injection to one decoded path; `None` fails any.
    pub fail_path: Option<String>,
}

/// Starts a server in a background thread. Returns the base URL (e.g.
/// "http://127.0.0.1:12345/") and the request log. The server runs until
/// the process exits.
pub fn start(files: Vec<(String, Vec<u8>)>) -> (String, Arc<Mutex<Vec<String>>>) {
    start_with_options(files, FileServerOptions::default())
}

/// Like `start` but with failure injection.
pub fn start_with_options(
    files: Vec<(String, Vec<u8>)>,
    opts: FileServerOptions,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let opts = Arc::new(opts);
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(files.into_iter().collect());
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(AtomicUsize::new(0));
    let log_out = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            let log = Arc::clone(&log);
            let failures = Arc::clone(&failures);
            let opts = Arc::clone(&opts);
            thread::spawn(move || handle(stream, &files, &log, &failures, &opts));
        }
    });
    (format!("http://127.0.0.1:{}/", port), log_out)
}

fn handle(
    mut stream: std::net::TcpStream,
    files: &HashMap<String, Vec<u8>>,
    log: &Mutex<Vec<String>>,
    failures: &AtomicUsize,
    opts: &FileServerOptions,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let Some((method, raw_path)) = parse_request_line(request) else {
        return;
    };
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let path = percent_decode(raw_path.trim_start_matches('/'));
    log.lock().unwrap().push(path.clone());

    let matches_failure = opts
        .fail_path
        .as_ref()
        .map_or(true, |target| *target == path);
    if matches_failure && failures.fetch_add(1, Ordering::SeqCst) < opts.fail_times {
        let status = if opts.fail_status == 0 { 503 } else { opts.fail_status };
        let response = format!(
            "HTTP/1.1 {status} Injected Failure\r\nContent-Length: 0\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    match files.get(&path) {
        Some(body) => {
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(body);
        }
        None => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        }
    }
}

/// Returns (method, raw path) from the request line.
fn parse_request_line(request: &str) -> Option<(&str, &str)> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    Some((method, path))
}

/// Simple percent-decode for request paths.
fn percent_decode(input: &str) -> String {
    let mut out = Vec::new();
    let mut bytes = input.as_bytes().iter().cloned();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let h = bytes.next().and_then(hex_digit);
            let l = bytes.next().and_then(hex_digit);
            match (h, l) {
                (Some(high), Some(low)) => out.push(high << 4 | low),
                _ => out.push(b'%'),
            }
        } else {
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
