//! Response-header bookkeeping for the curl transfer callbacks.

use std::str;

/// Collect a header line the way curl delivers them: a new `HTTP/` status
/// line (redirect hop) resets the set, so the collection always describes
/// the final response.
pub(super) fn collect_header_line(headers: &mut Vec<String>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        let line = s.trim_end();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
        }
        headers.push(line.to_string());
    }
}

/// Status code from the collected status line.
pub(super) fn http_status(headers: &[String]) -> Option<u32> {
    headers
        .first()
        .filter(|line| line.starts_with("HTTP/"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
}

/// `Content-Length` value from the collected headers, if present.
pub(super) fn content_length(headers: &[String]) -> Option<u64> {
    headers.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
