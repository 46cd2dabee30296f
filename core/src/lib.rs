//! Typed HTTP request client.
//!
//! # Overview
//! A [`RequestClient`] sends requests relative to a configured base URL
//! through a pluggable [`Transport`] and turns each response into the shape
//! the caller asked for: nothing, raw bytes, untyped JSON, one decoded record,
//! or a list of records, optionally taken from a named field of the response
//! envelope.
//!
//! ```no_run
//! # async fn demo() -> Result<(), rest_core::ApiError> {
//! use rest_core::{ClientConfig, RequestClient, UreqTransport};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     firstname: String,
//! }
//!
//! let client = RequestClient::new(ClientConfig::new("http://localhost:3000"), UreqTransport::new());
//! let users: Vec<User> = client.get("/directory").list_at("users").await?;
//! let first: User = client.get("/users/1").record().await?;
//! client.delete("/users/1").empty().await?;
//! # let _ = (users, first.firstname);
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - The output shape is an explicit tag ([`Empty`], [`RawBytes`],
//!   [`UntypedJson`], [`Record`], [`RecordList`]) from a closed set; the body
//!   is never sniffed to pick a decoding.
//! - Status is classified before decoding: a non-2xx response is
//!   [`ApiError::HttpStatus`] for every shape.
//! - Transport, status and decoding failures all surface as one [`ApiError`].
//! - Every request yields at most one outcome and can be cancelled until it
//!   does ([`PendingRequest`], [`RequestHandle`]).
//! - Building and parsing are usable on their own for callers that move the
//!   bytes themselves ([`RequestBuilder::build`],
//!   [`RequestClient::parse_response`]).

pub mod client;
pub mod config;
pub mod decoder;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod pending;
pub mod shape;
pub mod transport;

pub use client::{RequestBuilder, RequestClient};
pub use config::ClientConfig;
pub use decoder::{Decoder, JsonDecoder};
pub use endpoint::Endpoint;
pub use error::{ApiError, DecodingError, JsonKind, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use pending::{PendingRequest, RequestHandle};
pub use shape::{Empty, RawBytes, Record, RecordList, ResponseShape, ShapeKind, UntypedJson};
pub use transport::Transport;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
