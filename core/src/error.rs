//! Error types for the request client.
//!
//! # Design
//! Every failure a request can end in is one `ApiError`. The three runtime
//! origins stay distinguishable: the transport never produced a response, the
//! server answered with a non-2xx status, or the body did not have the shape
//! the caller asked for. Non-2xx responses keep the raw status and body for
//! inspection; there is no dedicated not-found variant, use
//! [`ApiError::is_not_found`].

use bytes::Bytes;
use serde_json::Value;
use std::fmt;

/// Errors delivered by a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response arrived.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The server returned a status outside 2xx. The body was not decoded.
    #[error("HTTP {status}: {}", String::from_utf8_lossy(.body))]
    HttpStatus { status: u16, body: Bytes },

    /// The 2xx body did not match the requested shape.
    #[error("decoding failed: {0}")]
    Decoding(#[from] DecodingError),

    /// The request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The JSON request body could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl ApiError {
    /// The HTTP status, if the server answered with a non-2xx one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    pub fn is_decoding(&self) -> bool {
        matches!(self, ApiError::Decoding(_))
    }
}

/// Failures below HTTP: nothing usable came back from the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The transfer stopped before a response arrived.
    #[error("request cancelled before a response arrived")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Coarse JSON value kind, used to report shape mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonKind::Null => "null",
            JsonKind::Bool => "boolean",
            JsonKind::Number => "number",
            JsonKind::String => "string",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// The response body did not match the requested output shape.
#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    /// Malformed JSON, or JSON that does not fit the target record type.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON {expected}, found {found}")]
    UnexpectedShape { expected: JsonKind, found: JsonKind },

    #[error("key `{0}` is not present in the response object")]
    MissingKey(String),

    /// A list element failed to decode; the whole list is rejected.
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<DecodingError>,
    },
}
