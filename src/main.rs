use std::sync::Arc;

use anyhow::Context;
use spartoi::config::Config;
use spartoi::proxy::{BackendPool, ProxyHandler};
use spartoi::server::{Dispatcher, WorkerPool, listener};
use spartoi::spartan::{SpartanClient, SpartanUrl};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let mut args = std::env::args().skip(1);

    match args.next().as_deref() {
        None | Some("serve") => serve(cfg).await,
        Some("fetch") => {
            let url = args.next().context("usage: spartoi fetch <spartan-url>")?;
            fetch(&cfg, &url).await
        }
        Some(other) => anyhow::bail!("unknown command `{}` (expected `serve` or `fetch`)", other),
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    if cfg.backends.is_empty() {
        tracing::warn!("No backends configured, every request will be answered with an error");
    }

    let pool = BackendPool::new(cfg.backends.clone());
    let proxy = ProxyHandler::new(
        pool,
        cfg.proxy.connect_timeout(),
        cfg.proxy.request_timeout(),
    )
    .max_response_body(cfg.proxy.max_response_body);

    let workers = WorkerPool::new(cfg.worker_threads).context("failed to start worker pool")?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(proxy), workers.handles()));

    tokio::select! {
        res = listener::run(&cfg, dispatcher) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn fetch(cfg: &Config, url: &str) -> anyhow::Result<()> {
    let url = SpartanUrl::parse(url)?;
    tracing::info!("Sending request to {}", url);

    let client = SpartanClient::new(cfg.client.to_client_config());
    let response = client.fetch(&url).await?;

    println!(
        "{} {}",
        response.spartan_status().unwrap_or_default(),
        response.meta().unwrap_or_default()
    );
    tracing::info!("Body size: {}", response.body.len());
    println!("{}", String::from_utf8_lossy(&response.body));
    Ok(())
}
