use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::http::request::Request;
use crate::http::response::Response;
use crate::server::dispatch::Dispatcher;
use crate::spartan::session::{ParseEvent, ServerSession};
use crate::spartan::status::{WireResponse, to_wire};
use crate::spartan::writer::ResponseWriter;

/// One accepted Spartan connection. Serves a single request, then closes.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    buffer: BytesMut,
    session: ServerSession,
    dispatcher: Arc<Dispatcher>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(WireResponse),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        max_request_body: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(4096),
            session: ServerSession::new(max_request_body),
            dispatcher,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = self.read_request().await?;
                }

                ConnectionState::Processing(request) => {
                    let response = self.process(request).await;
                    let wire = to_wire(response, self.session.request());
                    self.state = ConnectionState::Writing(wire);
                }

                ConnectionState::Writing(wire) => {
                    debug!(peer = %self.peer, status = wire.status, meta = %wire.meta, "sending response");
                    let mut writer = ResponseWriter::new(&wire);
                    writer.write_to_stream(&mut self.stream).await?;

                    // End of body is signalled by closing.
                    if let Err(e) = self.stream.shutdown().await {
                        trace!(peer = %self.peer, error = %e, "shutdown failed");
                    }
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<ConnectionState> {
        loop {
            // Try parsing whatever we already have
            if !self.buffer.is_empty() {
                match self.session.on_data(&mut self.buffer) {
                    ParseEvent::Dispatch(request) => return Ok(ConnectionState::Processing(request)),
                    ParseEvent::Reject(response) => {
                        return Ok(ConnectionState::Writing(to_wire(response, None)));
                    }
                    ParseEvent::NeedMore | ParseEvent::Ignored => {}
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                debug!(peer = %self.peer, "peer closed before sending a full request");
                return Ok(ConnectionState::Closed);
            }
        }
    }

    /// Waits for the backend while still draining the socket, so anything
    /// the peer sends after its request is reported and dropped.
    async fn process(&mut self, request: Request) -> Response {
        let dispatcher = Arc::clone(&self.dispatcher);
        let response = dispatcher.dispatch(request);
        tokio::pin!(response);

        let mut open = true;
        loop {
            tokio::select! {
                response = &mut response => return response,
                read = self.stream.read_buf(&mut self.buffer), if open => match read {
                    Ok(0) | Err(_) => open = false,
                    Ok(_) => {
                        self.session.on_data(&mut self.buffer);
                    }
                },
            }
        }
    }
}
