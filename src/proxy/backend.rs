//! HTTP upstream pool.
//!
//! Tracks the health of every configured upstream and hands them out
//! round-robin, skipping the ones marked down.

use crate::config::BackendConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Failures in a row before an upstream is taken out of rotation.
const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Up,
    Down,
}

/// An HTTP upstream.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Upstream URL (e.g. "http://localhost:8080")
    pub url: String,

    /// Optional name for logging
    pub name: Option<String>,

    pub state: BackendState,

    /// Last time a request outcome was recorded
    pub last_check: Option<Instant>,

    pub consecutive_failures: u32,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            url: config.url,
            name: config.name,
            state: BackendState::Up,
            last_check: None,
            consecutive_failures: 0,
        }
    }

    /// Name if configured, URL otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn mark_failed(&mut self) {
        self.consecutive_failures += 1;
        self.last_check = Some(Instant::now());

        if self.consecutive_failures >= FAILURE_THRESHOLD && self.state == BackendState::Up {
            self.state = BackendState::Down;
            tracing::warn!(
                backend = self.display_name(),
                failures = self.consecutive_failures,
                "Backend marked as down"
            );
        }
    }

    pub fn mark_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_check = Some(Instant::now());

        if self.state == BackendState::Down {
            self.state = BackendState::Up;
            tracing::info!(backend = self.display_name(), "Backend recovered");
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == BackendState::Up
    }
}

#[derive(Debug, Default)]
struct Rotation {
    backends: Vec<Backend>,
    next: usize,
}

/// Round-robin pool of upstreams, shareable across tasks.
#[derive(Debug, Clone, Default)]
pub struct BackendPool {
    inner: Arc<RwLock<Rotation>>,
}

impl BackendPool {
    pub fn new(configs: Vec<BackendConfig>) -> Self {
        let backends = configs.into_iter().map(Backend::new).collect();
        Self {
            inner: Arc::new(RwLock::new(Rotation { backends, next: 0 })),
        }
    }

    /// Next available upstream, or `None` when all are down.
    pub async fn select_backend(&self) -> Option<Backend> {
        let mut rotation = self.inner.write().await;
        let len = rotation.backends.len();

        for offset in 0..len {
            let index = (rotation.next + offset) % len;
            if rotation.backends[index].is_available() {
                rotation.next = (index + 1) % len;
                return Some(rotation.backends[index].clone());
            }
        }

        if len > 0 {
            tracing::error!("No available backends in pool");
        }
        None
    }

    pub async fn mark_backend_failed(&self, backend_url: &str) {
        let mut rotation = self.inner.write().await;
        if let Some(backend) = rotation.backends.iter_mut().find(|b| b.url == backend_url) {
            backend.mark_failed();
        }
    }

    pub async fn mark_backend_success(&self, backend_url: &str) {
        let mut rotation = self.inner.write().await;
        if let Some(backend) = rotation.backends.iter_mut().find(|b| b.url == backend_url) {
            backend.mark_success();
        }
    }

    pub async fn get_backends(&self) -> Vec<Backend> {
        self.inner.read().await.backends.clone()
    }

    pub async fn available_count(&self) -> usize {
        self.inner
            .read()
            .await
            .backends
            .iter()
            .filter(|b| b.is_available())
            .count()
    }
}
