//! Spartan protocol engine.
//!
//! Spartan is a plaintext, single-shot request/response protocol: the client
//! sends one request line (plus optional data), the server answers with one
//! status line and a body, then closes the connection.
//!
//! - **`url`**: `spartan://` URL parsing
//! - **`grammar`**: request and status line parsing/formatting
//! - **`status`**: Spartan <-> HTTP status translation
//! - **`client`**: client session state machine and async driver
//! - **`registry`**: in-flight client request book-keeping
//! - **`session`**: server-side request parsing
//! - **`writer`**: response serialization
//!
//! # Server exchange
//!
//! ```text
//!        ┌─────────────┐
//!        │   Absent    │ ← Wait for the request line
//!        └──────┬──────┘
//!               │ CRLF found, line valid
//!               ▼
//!        ┌──────────────────┐
//!        │   InProgress     │ ← Wait for content-length bytes
//!        └──────┬───────────┘
//!               │ Body complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Complete      │ ← Dispatched; later bytes are dropped
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spartoi::spartan::client::{ClientConfig, SpartanClient};
//! use spartoi::spartan::url::SpartanUrl;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SpartanClient::new(ClientConfig::new().timeout(Duration::from_secs(10)));
//!     let url = SpartanUrl::parse("spartan://mozz.us/")?;
//!     let response = client.fetch(&url).await?;
//!     println!("{:?}", response.meta());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod grammar;
pub mod registry;
pub mod session;
pub mod status;
pub mod url;
pub mod writer;

pub use client::{ClientConfig, RequestError, SpartanClient};
pub use url::SpartanUrl;
