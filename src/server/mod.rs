//! Spartan server: listeners, per-connection tasks and backend dispatch.

pub mod connection;
pub mod dispatch;
pub mod listener;

pub use dispatch::{Dispatcher, Handler, WorkerPool};
pub use listener::Server;
