//! Spartoi - Spartan protocol client and server
//!
//! Core library: the Spartan protocol engine, the HTTP-shaped object model it
//! bridges to, and the server/proxy plumbing that lets an HTTP backend answer
//! Spartan requests.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
pub mod spartan;
