use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::server::connection::Connection;
use crate::server::dispatch::Dispatcher;

/// A set of bound Spartan listeners sharing one dispatcher.
pub struct Server {
    listeners: Vec<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    max_request_body: usize,
}

impl Server {
    pub async fn bind(
        addrs: &[SocketAddr],
        dispatcher: Arc<Dispatcher>,
        max_request_body: usize,
    ) -> anyhow::Result<Self> {
        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            info!("Listening on {}", listener.local_addr()?);
            listeners.push(listener);
        }
        Ok(Self {
            listeners,
            dispatcher,
            max_request_body,
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Accepts connections on every listener until one of them fails.
    pub async fn run(self) -> anyhow::Result<()> {
        if self.listeners.is_empty() {
            warn!("Spartan server started without any listener");
            std::future::pending::<()>().await;
        }

        let mut loops = JoinSet::new();
        for listener in self.listeners {
            loops.spawn(accept_loop(
                listener,
                Arc::clone(&self.dispatcher),
                self.max_request_body,
            ));
        }

        while let Some(res) = loops.join_next().await {
            res??;
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_request_body: usize,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };
        debug!("Accepted connection from {}", peer);

        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, dispatcher, max_request_body);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

/// Binds every configured listener and serves until failure.
pub async fn run(cfg: &Config, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let addrs = cfg
        .listeners
        .iter()
        .map(|l| l.socket_addr())
        .collect::<anyhow::Result<Vec<_>>>()?;

    Server::bind(&addrs, dispatcher, cfg.max_request_body)
        .await?
        .run()
        .await
}
