//! Hands parsed requests to the backend.
//!
//! Backend work runs on a [`WorkerPool`] of single-threaded runtimes,
//! picked round-robin per request. Only the backend future crosses threads:
//! the connection task awaits the result and does all socket I/O itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::http::request::Request;
use crate::http::response::Response;

pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A request-handling backend.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> ResponseFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> ResponseFuture {
        Box::pin(self(request))
    }
}

/// Threads each running a current-thread runtime.
pub struct WorkerPool {
    handles: Vec<Handle>,
    shutdown: Vec<oneshot::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> std::io::Result<Self> {
        let mut pool = Self {
            handles: Vec::with_capacity(size),
            shutdown: Vec::with_capacity(size),
            threads: Vec::with_capacity(size),
        };

        for i in 0..size {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            let (tx, rx) = oneshot::channel::<()>();
            pool.handles.push(runtime.handle().clone());
            pool.shutdown.push(tx);

            let thread = std::thread::Builder::new()
                .name(format!("spartoi-worker-{}", i))
                .spawn(move || {
                    runtime.block_on(async {
                        let _ = rx.await;
                    });
                })?;
            pool.threads.push(thread);
        }

        Ok(pool)
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.handles.clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(());
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

/// Routes requests to a handler across worker runtimes.
pub struct Dispatcher {
    handler: Arc<dyn Handler>,
    workers: Vec<Handle>,
    next: AtomicUsize,
}

impl Dispatcher {
    /// With no `workers`, handler futures run on the caller's runtime.
    pub fn new(handler: Arc<dyn Handler>, workers: Vec<Handle>) -> Self {
        Self {
            handler,
            workers,
            next: AtomicUsize::new(0),
        }
    }

    fn pick_worker(&self) -> Handle {
        if self.workers.is_empty() {
            return Handle::current();
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].clone()
    }

    /// Runs the handler for `request` and waits for its response.
    pub async fn dispatch(&self, request: Request) -> Response {
        debug!(path = %request.path, method = request.method.as_str(), "dispatching request");
        let future = self.handler.call(request);
        match self.pick_worker().spawn(future).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "backend task failed");
                Response::internal_error()
            }
        }
    }
}
