//! HTTP-shaped request/response model.
//!
//! The Spartan engine never talks to application code in Spartan terms.
//! Inbound Spartan requests become a [`request::Request`] for the backend,
//! backend answers come back as a [`response::Response`] and are translated
//! into a status line by [`crate::spartan::status`]. The client does the
//! same in reverse and hands callers a `Response`.
//!
//! - **`request`**: request representation and builder
//! - **`response`**: status codes, response representation with builder pattern
//! - **`mime`**: MIME type extraction and classification

pub mod mime;
pub mod request;
pub mod response;

pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, SendFile, StatusCode};
