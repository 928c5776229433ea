//! Spartan wire grammar.
//!
//! ```text
//! request  = host SP path-and-query SP content-length CRLF data
//! response = status-digit [SP meta] CRLF body
//! ```
//!
//! Everything here is pure: no state, no I/O.

use thiserror::Error;

pub const CRLF: &[u8] = b"\r\n";

/// Longest meta string accepted in a status line.
pub const MAX_META_LEN: usize = 1024;

/// Longest request line the server buffers while waiting for its CRLF.
pub const MAX_REQUEST_LINE: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed status line")]
    MalformedStatusLine,

    #[error("status line exceeds {0} bytes")]
    StatusLineTooLong(usize),

    #[error("request line must have exactly 3 fields")]
    FieldCount,

    #[error("invalid request path `{0}`")]
    InvalidPath(String),

    #[error("invalid content length `{0}`")]
    InvalidContentLength(String),

    #[error("request line exceeds {0} bytes")]
    RequestLineTooLong(usize),

    #[error("line is not valid UTF-8")]
    NotUtf8,
}

/// A parsed response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub status: u8,
    pub meta: String,
}

/// A parsed request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub content_length: u64,
}

/// Position of the first CRLF in `buf`.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// `<host> <path> 0\r\n`. Clients never upload data, so the length is fixed.
pub fn format_request_line(host: &str, target: &str) -> Vec<u8> {
    format!("{} {} 0\r\n", host, target).into_bytes()
}

/// `<status>[ <meta>]\r\n`
pub fn format_status_line(status: u8, meta: &str) -> Vec<u8> {
    if meta.is_empty() {
        format!("{}\r\n", status).into_bytes()
    } else {
        format!("{} {}\r\n", status, meta).into_bytes()
    }
}

/// Gemini-style input prompt line used for the 1x compatibility class.
pub fn input_prompt(path: &str, prompt: &str) -> String {
    format!("=: {} {}", path, prompt)
}

/// Parses the status line at the start of `buf`.
///
/// Returns `Ok(None)` while no CRLF has arrived, otherwise the parsed line
/// and the number of bytes it occupied including the CRLF.
pub fn parse_status_line(buf: &[u8]) -> Result<Option<(StatusLine, usize)>, ProtocolError> {
    let Some(end) = find_crlf(buf) else {
        // digit + space + meta + CR
        let limit = MAX_META_LEN + 3;
        if buf.len() > limit {
            return Err(ProtocolError::StatusLineTooLong(limit));
        }
        return Ok(None);
    };

    let line = &buf[..end];
    if line.is_empty() || (line.len() >= 2 && line[1] != b' ') || !line[0].is_ascii_digit() {
        return Err(ProtocolError::MalformedStatusLine);
    }

    let meta = if line.len() > 2 {
        std::str::from_utf8(&line[2..])
            .map_err(|_| ProtocolError::NotUtf8)?
            .to_string()
    } else {
        String::new()
    };

    let status = StatusLine {
        status: line[0] - b'0',
        meta,
    };
    Ok(Some((status, end + CRLF.len())))
}

/// Parses a request line (without its CRLF).
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;

    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(ProtocolError::FieldCount);
    }

    let (path, query) = split_target(parts[1])?;

    let length = parts[2];
    if !length.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidContentLength(length.to_string()));
    }
    let content_length = length
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidContentLength(length.to_string()))?;

    Ok(RequestLine {
        host: parts[0].to_string(),
        path,
        query,
        content_length,
    })
}

/// Splits `path[?query][#fragment]`, discarding the fragment.
fn split_target(target: &str) -> Result<(String, Option<String>), ProtocolError> {
    let path_end = target.find(['?', '#']).unwrap_or(target.len());
    let path = &target[..path_end];
    if !path.is_empty() && !path.starts_with('/') {
        return Err(ProtocolError::InvalidPath(target.to_string()));
    }

    let rest = &target[path_end..];
    let query = rest.strip_prefix('?').map(|q| {
        let end = q.find('#').unwrap_or(q.len());
        q[..end].to_string()
    });

    let path = if path.is_empty() { "/" } else { path };
    Ok((path.to_string(), query))
}
