//! Spartan client.
//!
//! A request is a [`ClientSession`]: a state machine fed with transport
//! events (connected, bytes, closed, error, timer expiry) that delivers its
//! result to a callback exactly once. The async driver in this module owns
//! the socket and the session and turns tokio I/O into those events.
//!
//! ```text
//! Created -> Resolving -> Connecting -> AwaitingHeader -> AwaitingBody -> Done
//!    └──────(literal IP)──────┘
//! ```
//!
//! `Done` is reached from any state by the first of: connection closed after
//! a header (success), a timer expiring, a transport error, or a malformed
//! response. Everything after that is ignored.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace};

use crate::http::mime;
use crate::http::response::Response;
use crate::spartan::grammar::{ProtocolError, StatusLine, format_request_line, parse_status_line};
use crate::spartan::registry::{Registration, RequestHandle, RequestRegistry};
use crate::spartan::status::{SpartanStatus, from_wire};
use crate::spartan::url::{SpartanUrl, UrlError};

/// Upper bound on host name resolution.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_BUFFER_SIZE: usize = 8192;

/// Per-request limits. `None` disables a limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Inactivity timeout, also bounding the connect.
    pub timeout: Option<Duration>,
    /// Largest body accepted, in bytes.
    pub max_body_size: Option<usize>,
    /// Hard cap on the whole transfer, measured from the connect attempt.
    pub max_transfer_duration: Option<Duration>,
    /// MIME types worth downloading. Empty accepts everything.
    pub accepted_mimes: Vec<String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from raw numbers where anything `<= 0` disables the
    /// corresponding limit.
    pub fn from_limits(timeout_secs: f64, max_body_size: i64, max_transfer_secs: f64) -> Self {
        Self {
            timeout: positive_duration(timeout_secs),
            max_body_size: usize::try_from(max_body_size).ok().filter(|n| *n > 0),
            max_transfer_duration: positive_duration(max_transfer_secs),
            accepted_mimes: Vec::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|d| !d.is_zero());
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = Some(bytes).filter(|n| *n > 0);
        self
    }

    pub fn max_transfer_duration(mut self, duration: Duration) -> Self {
        self.max_transfer_duration = Some(duration).filter(|d| !d.is_zero());
        self
    }

    pub fn accept_mime(mut self, mime: impl Into<String>) -> Self {
        self.accepted_mimes.push(mime.into());
        self
    }
}

fn positive_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Why a response was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseFault {
    #[error("malformed status line")]
    MalformedHeader,
    #[error("status line too long")]
    HeaderTooLong,
    #[error("body larger than {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("connection closed before a status line arrived")]
    ClosedBeforeHeader,
}

/// Which timer ended a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Inactivity,
    Transfer,
}

/// Failure kinds of a client request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("bad response: {0}")]
    BadResponse(ResponseFault),

    #[error("could not resolve {0}")]
    BadServerAddress(String),

    #[error("network failure: {0}")]
    NetworkFailure(#[from] io::Error),

    #[error("request timed out ({0:?})")]
    Timeout(TimeoutKind),

    /// Reserved for an encrypted transport.
    #[error("handshake failed")]
    HandshakeError,

    /// Reserved for an encrypted transport.
    #[error("invalid certificate")]
    InvalidCertificate,
}

/// Flat result kind, for callers that only branch on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Ok,
    BadResponse,
    BadServerAddress,
    NetworkFailure,
    Timeout,
    HandshakeError,
    InvalidCertificate,
}

impl RequestError {
    pub fn kind(&self) -> ResultKind {
        match self {
            RequestError::BadResponse(_) => ResultKind::BadResponse,
            RequestError::BadServerAddress(_) => ResultKind::BadServerAddress,
            RequestError::NetworkFailure(_) => ResultKind::NetworkFailure,
            RequestError::Timeout(_) => ResultKind::Timeout,
            RequestError::HandshakeError => ResultKind::HandshakeError,
            RequestError::InvalidCertificate => ResultKind::InvalidCertificate,
        }
    }
}

impl ResultKind {
    pub fn of(result: &Result<Response, RequestError>) -> Self {
        match result {
            Ok(_) => ResultKind::Ok,
            Err(e) => e.kind(),
        }
    }
}

pub type ClientResult = Result<Response, RequestError>;

type Callback = Box<dyn FnOnce(ClientResult) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Resolving,
    Connecting,
    AwaitingHeader,
    AwaitingBody,
    Done,
}

/// What the driver does after handing bytes to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep reading.
    Continue,
    /// Close the connection now; the close completes the request.
    Abort,
    /// The request is finished.
    Done,
}

#[derive(Debug, Default)]
struct Timers {
    inactivity: Option<Instant>,
    transfer: Option<Instant>,
}

/// One in-flight client request.
pub struct ClientSession {
    url: SpartanUrl,
    config: ClientConfig,
    state: SessionState,
    header: Option<StatusLine>,
    aborted: bool,
    timers: Timers,
    callback: Option<Callback>,
}

impl ClientSession {
    pub fn new<F>(url: SpartanUrl, config: ClientConfig, callback: F) -> Self
    where
        F: FnOnce(ClientResult) + Send + 'static,
    {
        Self {
            url,
            config,
            state: SessionState::Created,
            header: None,
            aborted: false,
            timers: Timers::default(),
            callback: Some(Box::new(callback)),
        }
    }

    pub fn url(&self) -> &SpartanUrl {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Starts the request. Returns the peer address straight away for
    /// literal-IP hosts, otherwise `None` and the host must be resolved.
    pub fn start(&mut self) -> Option<SocketAddr> {
        if self.state != SessionState::Created {
            return None;
        }
        match self.url.socket_addr() {
            Some(addr) => {
                self.state = SessionState::Connecting;
                Some(addr)
            }
            None => {
                self.state = SessionState::Resolving;
                None
            }
        }
    }

    /// Feeds the resolver's answer in. `None` or an unspecified address ends
    /// the request with `BadServerAddress`.
    pub fn on_resolved(&mut self, addr: Option<SocketAddr>) -> Option<SocketAddr> {
        if self.state != SessionState::Resolving {
            return None;
        }
        match addr.filter(|a| !a.ip().is_unspecified()) {
            Some(addr) => {
                let addr = SocketAddr::new(addr.ip(), self.url.port());
                self.state = SessionState::Connecting;
                Some(addr)
            }
            None => {
                self.finish(Err(RequestError::BadServerAddress(self.url.host().to_string())));
                None
            }
        }
    }

    /// Arms both timers. Called once, when the connect attempt begins.
    pub fn arm_timers(&mut self, now: Instant) {
        if self.is_done() {
            return;
        }
        self.timers.inactivity = self.config.timeout.map(|d| now + d);
        self.timers.transfer = self.config.max_transfer_duration.map(|d| now + d);
    }

    fn disarm_timers(&mut self) {
        self.timers = Timers::default();
    }

    /// The earliest armed deadline and which timer it belongs to.
    pub fn next_deadline(&self) -> Option<(Instant, TimeoutKind)> {
        let inactivity = self.timers.inactivity.map(|at| (at, TimeoutKind::Inactivity));
        let transfer = self.timers.transfer.map(|at| (at, TimeoutKind::Transfer));
        match (inactivity, transfer) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// The transport is connected: returns the request line to send.
    pub fn on_connected(&mut self) -> Vec<u8> {
        if self.state != SessionState::Connecting {
            return Vec::new();
        }
        self.state = SessionState::AwaitingHeader;
        debug!(host = self.url.host(), path = self.url.path(), "connected, sending request");
        format_request_line(self.url.host(), &self.url.request_target())
    }

    /// Handles newly buffered bytes. `buf` holds everything received and not
    /// yet consumed; after the header it is the body so far.
    pub fn on_data(&mut self, buf: &mut BytesMut) -> Step {
        if self.is_done() {
            return Step::Done;
        }
        if self.aborted {
            buf.clear();
            return Step::Abort;
        }

        if self.state == SessionState::AwaitingHeader {
            let (line, consumed) = match parse_status_line(buf) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => {
                    self.rearm_inactivity();
                    return Step::Continue;
                }
                Err(e) => {
                    debug!(error = %e, "rejecting response header");
                    let fault = match e {
                        ProtocolError::StatusLineTooLong(_) => ResponseFault::HeaderTooLong,
                        _ => ResponseFault::MalformedHeader,
                    };
                    self.finish(Err(RequestError::BadResponse(fault)));
                    return Step::Done;
                }
            };
            trace!(status = line.status, meta = %line.meta, "received status line");

            let rejected = line.status == SpartanStatus::Success.code()
                && !mime::is_accepted(&line.meta, &self.config.accepted_mimes);
            if rejected {
                debug!(mime = mime::essence(&line.meta), "ignoring response of unwanted MIME type");
                self.header = Some(line);
                self.state = SessionState::AwaitingBody;
                self.aborted = true;
                buf.clear();
                return Step::Abort;
            }

            self.header = Some(line);
            self.state = SessionState::AwaitingBody;
            buf.advance(consumed);
        }

        if let Some(limit) = self.config.max_body_size {
            if buf.len() > limit {
                debug!(limit, received = buf.len(), "response body over the size limit");
                self.finish(Err(RequestError::BadResponse(ResponseFault::BodyTooLarge {
                    limit,
                })));
                return Step::Done;
            }
        }

        self.rearm_inactivity();
        Step::Continue
    }

    fn rearm_inactivity(&mut self) {
        if let Some(timeout) = self.config.timeout {
            self.timers.inactivity = Some(Instant::now() + timeout);
        }
    }

    /// The peer closed the connection (or we closed it after an abort).
    /// Spartan ends a body by closing, so this is the success path once a
    /// header has been seen.
    pub fn on_closed(&mut self, buf: &mut BytesMut) {
        if self.is_done() {
            return;
        }
        match self.header.take() {
            Some(line) => {
                let body = buf.split().to_vec();
                let response = from_wire(line.status, &line.meta, body);
                self.finish(Ok(response));
            }
            None => {
                self.finish(Err(RequestError::BadResponse(ResponseFault::ClosedBeforeHeader)));
            }
        }
    }

    pub fn on_error(&mut self, error: io::Error) {
        self.finish(Err(RequestError::NetworkFailure(error)));
    }

    pub fn on_timeout(&mut self, kind: TimeoutKind) {
        self.finish(Err(RequestError::Timeout(kind)));
    }

    /// Delivers the result. Only the first call has any effect.
    fn finish(&mut self, result: ClientResult) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        self.state = SessionState::Done;
        self.disarm_timers();

        match &result {
            Ok(response) => debug!(
                url = %self.url,
                status = response.status.as_u16(),
                bytes = response.body.len(),
                "spartan request finished"
            ),
            Err(e) => debug!(url = %self.url, error = %e, "spartan request failed"),
        }
        callback(result);
    }
}

/// Waits for `deadline`, or forever when no timer is armed.
async fn expiry(deadline: Option<(Instant, TimeoutKind)>) -> TimeoutKind {
    match deadline {
        Some((at, kind)) => {
            sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}

/// Runs `fut` unless the session's next timer fires first.
async fn within<F: Future>(
    deadline: Option<(Instant, TimeoutKind)>,
    fut: F,
) -> Result<F::Output, TimeoutKind> {
    tokio::select! {
        out = fut => Ok(out),
        kind = expiry(deadline) => Err(kind),
    }
}

async fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    match timeout(RESOLVE_TIMEOUT, lookup_host((host, port))).await {
        Ok(Ok(mut addrs)) => addrs.find(|a| !a.ip().is_unspecified()),
        Ok(Err(e)) => {
            debug!(host, error = %e, "resolution failed");
            None
        }
        Err(_) => {
            debug!(host, "resolution timed out");
            None
        }
    }
}

/// Drives `session` over a real TCP connection until it is done.
pub async fn drive(session: &mut ClientSession) {
    let addr = match session.start() {
        Some(addr) => addr,
        None => {
            let url = session.url().clone();
            let resolved = resolve(url.host(), url.port()).await;
            match session.on_resolved(resolved) {
                Some(addr) => addr,
                None => return,
            }
        }
    };

    session.arm_timers(Instant::now());
    let mut stream = match within(session.next_deadline(), TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return session.on_error(e),
        Err(kind) => return session.on_timeout(kind),
    };

    let request_line = session.on_connected();
    match within(session.next_deadline(), stream.write_all(&request_line)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return session.on_error(e),
        Err(kind) => return session.on_timeout(kind),
    }

    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        if session.is_done() {
            return;
        }
        match within(session.next_deadline(), stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => return session.on_closed(&mut buf),
            Ok(Ok(_)) => match session.on_data(&mut buf) {
                Step::Continue => {}
                Step::Abort => break,
                Step::Done => return,
            },
            Ok(Err(e)) => return session.on_error(e),
            Err(kind) => return session.on_timeout(kind),
        }
    }

    // Unwanted MIME type: drop the socket instead of downloading the rest.
    drop(stream);
    session.on_closed(&mut buf);
}

/// Issues Spartan requests with a shared configuration.
#[derive(Clone, Default)]
pub struct SpartanClient {
    config: ClientConfig,
    registry: Arc<RequestRegistry>,
}

impl SpartanClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            registry: Arc::new(RequestRegistry::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs one request and waits for its result.
    pub async fn fetch(&self, url: &SpartanUrl) -> ClientResult {
        let (tx, rx) = oneshot::channel();
        let mut session = ClientSession::new(url.clone(), self.config.clone(), move |result| {
            let _ = tx.send(result);
        });
        drive(&mut session).await;
        drop(session);

        rx.await.unwrap_or_else(|_| {
            Err(RequestError::NetworkFailure(io::Error::other(
                "request ended without a result",
            )))
        })
    }

    /// Starts a request in the background and calls `callback` exactly once
    /// with its result. Malformed URLs are rejected before any I/O.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send_request<F>(&self, url: &str, callback: F) -> Result<RequestHandle, UrlError>
    where
        F: FnOnce(ClientResult) + Send + 'static,
    {
        let url = SpartanUrl::parse(url)?;
        let handle = self.registry.insert(url.clone());
        let registration = Registration::new(Arc::clone(&self.registry), handle);
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut session = ClientSession::new(url, config, callback);
            drive(&mut session).await;
            drop(session);
            drop(registration);
        });
        Ok(handle)
    }

    /// Number of requests submitted with `send_request` that have not
    /// completed yet.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }
}
