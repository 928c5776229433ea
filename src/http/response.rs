use std::collections::HashMap;
use std::path::PathBuf;

use crate::http::mime::ContentType;

/// HTTP status code.
///
/// Kept as a raw number because the Spartan bridge passes through codes that
/// are not HTTP at all: backends may answer with a code below 100 that is
/// already a Spartan status, and the client surfaces unknown Spartan digits
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK
    pub const OK: StatusCode = StatusCode(200);
    /// 301 Moved Permanently
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    /// 307 Temporary Redirect
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    /// 308 Permanent Redirect
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);
    /// 400 Bad Request
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    /// 502 Bad Gateway
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    /// 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    /// 504 Gateway Timeout
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);

    pub const fn from_u16(code: u16) -> Self {
        StatusCode(code)
    }

    /// Returns the numeric status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use spartoi::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::from_u16(5).as_u16(), 5);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

/// A file range to stream as the response body instead of in-memory bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFile {
    pub path: PathBuf,
    pub offset: u64,
    /// Number of bytes to send; 0 sends everything after `offset`.
    pub length: u64,
}

/// HTTP-shaped response produced by a backend, or built by the Spartan
/// client from a status line and body.
#[derive(Debug, Clone)]
pub struct Response {
    /// The status code
    pub status: StatusCode,
    /// Headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Response body as bytes
    pub body: Vec<u8>,
    /// File to send in place of `body`
    pub file: Option<SendFile>,
}

/// Builder for constructing responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "text/gemini")
///     .body(b"# Hello".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    file: Option<SendFile>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            file: None,
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Adds every header from `headers`.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Streams a file range instead of the in-memory body.
    pub fn send_file(mut self, path: impl Into<PathBuf>, offset: u64, length: u64) -> Self {
        self.file = Some(SendFile {
            path: path.into(),
            offset,
            length,
        });
        self
    }

    /// Builds the final Response.
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
            file: self.file,
        }
    }
}

impl Response {
    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .body(b"500 Internal Server Error".to_vec())
            .build()
    }

    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The content-type header, if set and non-empty.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type").filter(|ct| !ct.is_empty())
    }

    /// Decoded content type, if one is set.
    pub fn content_kind(&self) -> Option<ContentType> {
        self.content_type().map(ContentType::from_meta)
    }

    /// The Spartan meta string attached to the response.
    pub fn meta(&self) -> Option<&str> {
        self.header("meta")
    }

    /// The Spartan status digit attached by the client, if any.
    pub fn spartan_status(&self) -> Option<u8> {
        self.header("spartan-status").and_then(|s| s.parse().ok())
    }
}
