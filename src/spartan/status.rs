//! Translation between Spartan status classes and HTTP-shaped status codes.
//!
//! Backend to wire:
//!
//! | HTTP            | Spartan                              |
//! |-----------------|--------------------------------------|
//! | `< 100`         | passed through as the Spartan digit  |
//! | `2xx`           | `2`, meta = content type             |
//! | `400`           | `4`                                  |
//! | `404`           | `5 Path <path> Not Found`            |
//! | `307` / `308`   | `1x` input prompt (see below)        |
//! | anything else   | `5`                                  |
//!
//! Spartan has no "input required" status. Redirects to an input are
//! rendered the way Gemini-over-Spartan clients expect them: a `text/gemini`
//! success whose body is a single `=:` prompt line.
//!
//! Wire to caller: `2` -> 200, `3` -> 301, `4` -> 400, `5` -> 500, any other
//! digit is surfaced verbatim.

use tracing::warn;

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, SendFile, StatusCode};
use crate::spartan::grammar::input_prompt;

pub const DEFAULT_MIME: &str = "application/octet-stream";
const DEFAULT_PROMPT: &str = "Input required";
const INPUT_MIME: &str = "text/gemini";

/// A Spartan response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpartanStatus {
    /// Two-digit `1x` input-required extension.
    Input(u8),
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl SpartanStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(SpartanStatus::Success),
            3 => Some(SpartanStatus::Redirect),
            4 => Some(SpartanStatus::ClientError),
            5 => Some(SpartanStatus::ServerError),
            10..=19 => Some(SpartanStatus::Input(code)),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            SpartanStatus::Input(code) => *code,
            SpartanStatus::Success => 2,
            SpartanStatus::Redirect => 3,
            SpartanStatus::ClientError => 4,
            SpartanStatus::ServerError => 5,
        }
    }

    /// Maps a backend status code onto a Spartan class.
    pub fn from_http(status: StatusCode) -> Self {
        let code = status.as_u16();
        if code < 100 {
            return match u8::try_from(code).ok().and_then(SpartanStatus::from_code) {
                Some(status) => status,
                None => {
                    warn!(status = code, "backend returned an invalid Spartan status");
                    SpartanStatus::ServerError
                }
            };
        }
        if status.is_success() {
            return SpartanStatus::Success;
        }
        match code {
            400 => SpartanStatus::ClientError,
            307 | 308 => SpartanStatus::Input(10),
            _ => SpartanStatus::ServerError,
        }
    }

    /// The HTTP-shaped status a client surfaces for a received digit.
    pub fn to_http(code: u8) -> StatusCode {
        match code {
            2 => StatusCode::OK,
            3 => StatusCode::MOVED_PERMANENTLY,
            4 => StatusCode::BAD_REQUEST,
            5 => StatusCode::INTERNAL_SERVER_ERROR,
            other => {
                warn!(status = other, "unknown Spartan status, passing it through");
                StatusCode::from_u16(other as u16)
            }
        }
    }
}

/// Body of an outbound Spartan response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireBody {
    Empty,
    Bytes(Vec<u8>),
    File(SendFile),
}

/// A response ready to be written: status digit, meta and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u8,
    pub meta: String,
    pub body: WireBody,
}

impl WireResponse {
    pub fn new(status: u8, meta: impl Into<String>) -> Self {
        Self {
            status,
            meta: meta.into(),
            body: WireBody::Empty,
        }
    }
}

/// Translates a backend response for the request it answers.
///
/// `request` is absent when the request line itself could not be parsed.
pub fn to_wire(response: Response, request: Option<&Request>) -> WireResponse {
    let path = request.map(|r| r.path.as_str());

    match SpartanStatus::from_http(response.status) {
        SpartanStatus::Input(_) => {
            let prompt = response
                .meta()
                .or_else(|| request.and_then(|r| r.header("meta")))
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_PROMPT);
            let line = input_prompt(path.unwrap_or("/"), prompt);
            WireResponse {
                status: SpartanStatus::Success.code(),
                meta: INPUT_MIME.to_string(),
                body: WireBody::Bytes(line.into_bytes()),
            }
        }
        SpartanStatus::Success => {
            let meta = response.content_type().unwrap_or(DEFAULT_MIME).to_string();
            let body = match response.file {
                Some(file) => WireBody::File(file),
                None if response.body.is_empty() => WireBody::Empty,
                None => WireBody::Bytes(response.body),
            };
            WireResponse {
                status: SpartanStatus::Success.code(),
                meta,
                body,
            }
        }
        SpartanStatus::Redirect => {
            let target = response.header("Location").unwrap_or_default();
            WireResponse::new(SpartanStatus::Redirect.code(), target)
        }
        status @ (SpartanStatus::ClientError | SpartanStatus::ServerError) => {
            let meta = if response.status == StatusCode::NOT_FOUND {
                match path {
                    Some(path) => format!("Path {} Not Found", path),
                    None => "Not Found".to_string(),
                }
            } else if let Some(meta) = response.meta().filter(|m| !m.is_empty()) {
                meta.to_string()
            } else if status == SpartanStatus::ClientError {
                "Bad request".to_string()
            } else {
                format!(
                    "Server error (HTTP status {})",
                    response.status.as_u16()
                )
            };
            WireResponse::new(status.code(), meta)
        }
    }
}

/// Builds the caller-facing response for a received status line and body.
///
/// The meta string and digit are kept as `meta` and `spartan-status`
/// headers; successful responses also get it as their content type.
pub fn from_wire(status: u8, meta: &str, body: Vec<u8>) -> Response {
    let mut builder = ResponseBuilder::new(SpartanStatus::to_http(status))
        .header("meta", meta)
        .header("spartan-status", status.to_string());
    if status == SpartanStatus::Success.code() {
        builder = builder.header("Content-Type", meta);
    }
    builder.body(body).build()
}
