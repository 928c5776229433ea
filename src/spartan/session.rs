//! Server-side request parsing.
//!
//! A [`ServerSession`] belongs to one connection and parses exactly one
//! request off the connection's read buffer: a request line, then
//! `content-length` bytes of data. Spartan is not pipelined, so once the
//! request is complete every further byte is a protocol violation.

use bytes::BytesMut;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::spartan::grammar::{CRLF, MAX_REQUEST_LINE, find_crlf, parse_request_line};

/// Default cap on the declared content length.
pub const DEFAULT_MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Parsing progress of the connection's request.
#[derive(Debug)]
pub enum ParseState {
    /// No request line yet.
    Absent,
    /// Request line parsed, waiting for `content_length` bytes of data.
    InProgress {
        request: Request,
        content_length: usize,
    },
    /// Request dispatched. Holds the request without its body.
    Complete(Request),
    /// The request line was refused and an error response is on its way.
    Rejected,
}

/// Outcome of feeding buffered bytes to the session.
#[derive(Debug)]
pub enum ParseEvent {
    /// Nothing to do until more bytes arrive.
    NeedMore,
    /// The request is complete; hand it to the backend.
    Dispatch(Request),
    /// The request cannot be served; send this response and close.
    Reject(Response),
    /// Bytes arrived after the request was complete and were dropped.
    Ignored,
}

#[derive(Debug)]
pub struct ServerSession {
    state: ParseState,
    max_body: usize,
}

impl Default for ServerSession {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_BODY)
    }
}

impl ServerSession {
    pub fn new(max_body: usize) -> Self {
        Self {
            state: ParseState::Absent,
            max_body,
        }
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, ParseState::Complete(_))
    }

    /// The dispatched request (without body), once complete.
    pub fn request(&self) -> Option<&Request> {
        match &self.state {
            ParseState::Complete(request) => Some(request),
            _ => None,
        }
    }

    /// Consumes what it can from `buf`.
    pub fn on_data(&mut self, buf: &mut BytesMut) -> ParseEvent {
        match std::mem::replace(&mut self.state, ParseState::Absent) {
            ParseState::Absent => self.parse_header(buf),
            ParseState::InProgress {
                request,
                content_length,
            } => self.take_body(request, content_length, buf),
            state @ (ParseState::Complete(_) | ParseState::Rejected) => {
                if !buf.is_empty() {
                    warn!(bytes = buf.len(), "received more data than expected");
                    buf.clear();
                }
                self.state = state;
                ParseEvent::Ignored
            }
        }
    }

    fn parse_header(&mut self, buf: &mut BytesMut) -> ParseEvent {
        let Some(end) = find_crlf(buf) else {
            if buf.len() > MAX_REQUEST_LINE {
                warn!(bytes = buf.len(), "request line too long");
                buf.clear();
                return self.reject(StatusCode::BAD_REQUEST, "Request line too long");
            }
            return ParseEvent::NeedMore;
        };

        let line = buf.split_to(end + CRLF.len());
        let header = &line[..end];
        trace!(header = %String::from_utf8_lossy(header), "spartan request line");

        let parsed = match parse_request_line(header) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    header = %String::from_utf8_lossy(header),
                    error = %e,
                    "invalid request header"
                );
                return self.reject(StatusCode::INTERNAL_SERVER_ERROR, "Invalid request header");
            }
        };

        let content_length = match usize::try_from(parsed.content_length) {
            Ok(n) if n <= self.max_body => n,
            _ => {
                warn!(
                    declared = parsed.content_length,
                    limit = self.max_body,
                    "request body too large"
                );
                return self.reject(StatusCode::BAD_REQUEST, "Request body too large");
            }
        };

        debug!(
            host = %parsed.host,
            path = %parsed.path,
            content_length,
            "spartan request received"
        );

        let mut headers = HashMap::new();
        headers.insert("host".to_string(), parsed.host);
        headers.insert("protocol".to_string(), "spartan".to_string());
        if content_length > 0 {
            headers.insert("content-length".to_string(), content_length.to_string());
        }

        let mut params = HashMap::new();
        if let Some(query) = &parsed.query {
            params.insert("query".to_string(), query.clone());
        }

        let request = Request {
            method: Method::for_content_length(content_length),
            path: parsed.path,
            query: parsed.query,
            version: "HTTP/1.1".to_string(),
            params,
            headers,
            body: Vec::new(),
        };

        self.take_body(request, content_length, buf)
    }

    fn take_body(&mut self, request: Request, content_length: usize, buf: &mut BytesMut) -> ParseEvent {
        if buf.len() < content_length {
            self.state = ParseState::InProgress {
                request,
                content_length,
            };
            return ParseEvent::NeedMore;
        }

        let body = buf.split_to(content_length).to_vec();
        if !buf.is_empty() {
            warn!(
                bytes = buf.len(),
                "discarding data beyond the declared content length"
            );
            buf.clear();
        }

        let head = request.clone();
        let mut request = request;
        request.body = body;
        self.state = ParseState::Complete(head);
        ParseEvent::Dispatch(request)
    }

    fn reject(&mut self, status: StatusCode, meta: &str) -> ParseEvent {
        self.state = ParseState::Rejected;
        ParseEvent::Reject(ResponseBuilder::new(status).header("meta", meta).build())
    }
}
