//! Forwarding Spartan requests to HTTP upstreams.
//!
//! [`ProxyHandler`] is the [`Handler`] used by the `spartoi` binary: every
//! parsed Spartan request is replayed as an HTTP/1.1 request against an
//! upstream from the [`BackendPool`], and the HTTP response comes back for
//! status translation.

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::backend::{Backend, BackendPool};
use crate::server::dispatch::{Handler, ResponseFuture};
use crate::spartan::grammar::find_crlf;
use crate::spartan::session::DEFAULT_MAX_REQUEST_BODY;
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Response header block limit
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Request headers that are not forwarded as-is.
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "protocol",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to a pool of HTTP upstreams.
#[derive(Clone)]
pub struct ProxyHandler {
    backend_pool: BackendPool,

    connection_timeout: Duration,

    /// Bound on sending the request and reading the whole response
    request_timeout: Duration,

    /// Largest response body read from an upstream
    max_response_body: usize,
}

impl ProxyHandler {
    pub fn new(
        backend_pool: BackendPool,
        connection_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend_pool,
            connection_timeout,
            request_timeout,
            max_response_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }

    /// Caps upstream response bodies. Larger responses fail with a 502.
    pub fn max_response_body(mut self, bytes: usize) -> Self {
        self.max_response_body = bytes;
        self
    }

    /// Forwards `request` to an upstream, trying each available one at most
    /// once. Failures become 502/503/504 responses.
    pub async fn forward_request(&self, request: &Request) -> Response {
        let max_retries = self.backend_pool.available_count().await;

        if max_retries == 0 {
            return self.handle_proxy_error(&anyhow::anyhow!("No available backends"));
        }

        let mut last_error = None;

        for attempt in 0..max_retries {
            let backend = match self.backend_pool.select_backend().await {
                Some(b) => b,
                None => break,
            };

            tracing::debug!(
                backend = backend.display_name(),
                attempt = attempt + 1,
                path = %request.path,
                "Forwarding request to backend"
            );

            match self.proxy_to_backend(&backend, request).await {
                Ok(response) => {
                    self.backend_pool.mark_backend_success(&backend.url).await;

                    tracing::info!(
                        backend = backend.display_name(),
                        status = response.status.as_u16(),
                        path = %request.path,
                        "Request forwarded successfully"
                    );

                    return response;
                }
                Err(e) => {
                    self.backend_pool.mark_backend_failed(&backend.url).await;

                    tracing::warn!(
                        backend = backend.display_name(),
                        error = %e,
                        path = %request.path,
                        attempt = attempt + 1,
                        "Failed to proxy request to backend"
                    );

                    last_error = Some(e);
                }
            }
        }

        tracing::error!(path = %request.path, "All available backends failed");

        match last_error {
            Some(e) => self.handle_proxy_error(&e),
            None => self.handle_proxy_error(&anyhow::anyhow!("No available backends")),
        }
    }

    async fn proxy_to_backend(&self, backend: &Backend, request: &Request) -> Result<Response> {
        let url = url::Url::parse(&backend.url).context("Invalid backend URL")?;

        let host = url.host_str().context("Backend URL missing host")?;
        let port = url.port_or_known_default().unwrap_or(80);

        let addr = format!("{}:{}", host, port);
        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to backend")?;

        tracing::trace!(backend = backend.display_name(), "Connected to backend");

        timeout(
            self.request_timeout,
            self.send_request_and_receive_response(stream, request, &url),
        )
        .await
        .context("Request timeout")?
    }

    async fn send_request_and_receive_response(
        &self,
        mut stream: TcpStream,
        request: &Request,
        backend_url: &url::Url,
    ) -> Result<Response> {
        let request_bytes = self.build_http_request(request, backend_url)?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        self.read_http_response(&mut stream).await
    }

    /// Serializes `request` for `backend_url`. The upstream URL's path, if
    /// any, prefixes the request path.
    pub fn build_http_request(&self, request: &Request, backend_url: &url::Url) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        let prefix = backend_url.path().trim_end_matches('/');
        let target = format!("{}{}", prefix, request.path_and_query());

        buffer.extend_from_slice(
            format!("{} {} {}\r\n", request.method.as_str(), target, request.version).as_bytes(),
        );

        let host = backend_url.host_str().context("Backend URL missing host")?;
        let host_value = match backend_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        buffer.extend_from_slice(format!("Host: {}\r\n", host_value).as_bytes());

        if let Some(spartan_host) = request.header("host") {
            buffer.extend_from_slice(format!("X-Forwarded-Host: {}\r\n", spartan_host).as_bytes());
        }
        if let Some(protocol) = request.header("protocol") {
            buffer.extend_from_slice(format!("X-Forwarded-Proto: {}\r\n", protocol).as_bytes());
        }

        for (key, value) in &request.headers {
            if SKIPPED_HEADERS.iter().any(|h| key.eq_ignore_ascii_case(h)) {
                continue;
            }
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"Connection: close\r\n");
        if !request.body.is_empty() {
            buffer.extend_from_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());
        }
        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(&request.body);

        Ok(buffer)
    }

    async fn read_http_response(&self, stream: &mut TcpStream) -> Result<Response> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        let headers_end = loop {
            if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break end;
            }

            if buffer.len() > MAX_HEADER_SIZE {
                anyhow::bail!("Response headers too large");
            }

            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }
        };

        let header_bytes = buffer.split_to(headers_end + 4);
        let (status, headers) = parse_response_headers(&header_bytes)?;
        let body = read_response_body(stream, &mut buffer, &headers, self.max_response_body).await?;

        Ok(ResponseBuilder::new(status)
            .headers(headers)
            .body(body)
            .build())
    }

    fn handle_proxy_error(&self, error: &anyhow::Error) -> Response {
        let error_str = format!("{:#}", error);

        let (status, meta) = if error_str.contains("timeout") {
            (
                StatusCode::GATEWAY_TIMEOUT,
                "The backend server did not respond in time",
            )
        } else if error_str.contains("No available backends") {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "No backend servers are available",
            )
        } else {
            (
                StatusCode::BAD_GATEWAY,
                "Failed to connect to backend server",
            )
        };

        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .header("meta", meta)
            .body(meta.as_bytes().to_vec())
            .build()
    }
}

impl Handler for ProxyHandler {
    fn call(&self, request: Request) -> ResponseFuture {
        let proxy = self.clone();
        Box::pin(async move { proxy.forward_request(&request).await })
    }
}

/// Parses the status line and header fields of an HTTP response.
pub fn parse_response_headers(header_bytes: &[u8]) -> Result<(StatusCode, HashMap<String, String>)> {
    let headers_str =
        std::str::from_utf8(header_bytes).context("Invalid UTF-8 in response headers")?;

    let mut lines = headers_str.lines();

    let status_line = lines.next().context("Empty response")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let status_code: u16 = parts[1].parse().context("Invalid status code")?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok((StatusCode::from_u16(status_code), headers))
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

async fn read_response_body(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    headers: &HashMap<String, String>,
    limit: usize,
) -> Result<Vec<u8>> {
    let chunked = header(headers, "Transfer-Encoding")
        .map(|te| te.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    if chunked {
        // The limit applies to the framed bytes, which bounds the decoded body too
        let raw = read_to_close(stream, buffer, limit).await?;
        return decode_chunked(&raw);
    }

    let Some(content_length) = header(headers, "Content-Length") else {
        // No Content-Length, read until connection closes
        return read_to_close(stream, buffer, limit).await;
    };
    let content_length: usize = content_length.parse().context("Invalid Content-Length")?;
    if content_length > limit {
        anyhow::bail!(
            "Upstream response of {} bytes exceeds the {} byte limit",
            content_length,
            limit
        );
    }

    let mut body = Vec::with_capacity(content_length);
    let from_buffer = buffer.len().min(content_length);
    body.extend_from_slice(&buffer[..from_buffer]);

    if body.len() < content_length {
        body.resize(content_length, 0);
        stream
            .read_exact(&mut body[from_buffer..])
            .await
            .context("Connection closed before complete body received")?;
    }

    Ok(body)
}

/// Reads until the upstream closes, failing once more than `limit` bytes
/// have arrived.
async fn read_to_close(stream: &mut TcpStream, buffer: &mut BytesMut, limit: usize) -> Result<Vec<u8>> {
    let mut body = buffer.split().to_vec();
    if body.len() <= limit {
        let remaining = (limit - body.len()) as u64 + 1;
        (&mut *stream).take(remaining).read_to_end(&mut body).await?;
    }

    if body.len() > limit {
        anyhow::bail!("Upstream response exceeds the {} byte limit", limit);
    }
    Ok(body)
}

/// Decodes a complete chunked transfer-encoded body.
pub fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    loop {
        let line_end = find_crlf(data).context("Truncated chunk size line")?;
        let line = std::str::from_utf8(&data[..line_end]).context("Invalid chunk size line")?;
        let size_str = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16)
            .with_context(|| format!("Invalid chunk size `{}`", size_str))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }

        if data.len() < size + 2 || &data[size..size + 2] != b"\r\n" {
            anyhow::bail!("Truncated chunk");
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}
