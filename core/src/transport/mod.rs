//! The transport boundary.
//!
//! The client never opens connections itself. It hands a fully built
//! [`HttpRequest`] to a [`Transport`] and gets back the status and body, or a
//! [`TransportError`] if no response arrived. Any status code, including
//! 4xx/5xx, is a successful transfer at this level; classifying it is the
//! client's job.

#[cfg(feature = "ureq")]
mod ureq_3;

use std::future::Future;
use std::sync::Arc;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "ureq")]
pub use self::ureq_3::UreqTransport;

/// Performs one request/response round trip.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and resolves once the full body has been read.
    ///
    /// Dropping the returned future should abort the transfer where the
    /// underlying client allows it.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        T::send(self, request)
    }
}
