//! HTTP proxy backend
//!
//! Lets an existing HTTP server answer Spartan requests: upstream pool
//! management and request forwarding.

pub mod backend;
pub mod upstream;

pub use backend::{Backend, BackendPool, BackendState};
pub use upstream::ProxyHandler;
