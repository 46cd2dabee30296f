//! Blocking [`ureq`] agent driven from the Tokio blocking pool.
//!
//! # Design
//! The agent is configured with `http_status_as_error(false)` so 4xx/5xx
//! responses come back as data and the client decides what they mean. Each
//! transfer runs on `spawn_blocking`; aborting the calling task stops delivery
//! but cannot interrupt a blocking read already in progress.
//!
//! Response bodies are read whole. ureq caps reads at 10 MiB unless told
//! otherwise; this transport reads without a cap by default, and
//! [`UreqTransport::with_body_limit`] sets one.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;
use ureq::{Agent, RequestBuilder};

use super::Transport;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
    body_limit: u64,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// `timeout` bounds the whole transfer, from resolving the host to reading
    /// the last body byte.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self {
            agent,
            body_limit: u64::MAX,
        }
    }

    /// Largest response body, in bytes, accepted before the transfer fails
    /// with a transport error.
    pub fn with_body_limit(mut self, limit: u64) -> Self {
        self.body_limit = limit;
        self
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let body_limit = self.body_limit;
        tokio::task::spawn_blocking(move || execute(&agent, request, body_limit))
            .await
            .map_err(|_| TransportError::Cancelled)?
    }
}

fn execute(
    agent: &Agent,
    request: HttpRequest,
    body_limit: u64,
) -> Result<HttpResponse, TransportError> {
    let HttpRequest {
        method,
        url,
        headers,
        body,
    } = request;
    trace!(%method, %url, "ureq transfer starting");

    let result = match (method, body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&url), &headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(&url), &headers).call(),
        (HttpMethod::Post, Some(body)) => with_headers(agent.post(&url), &headers).send(&body[..]),
        (HttpMethod::Post, None) => with_headers(agent.post(&url), &headers).send_empty(),
        (HttpMethod::Put, Some(body)) => with_headers(agent.put(&url), &headers).send(&body[..]),
        (HttpMethod::Put, None) => with_headers(agent.put(&url), &headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => with_headers(agent.patch(&url), &headers).send(&body[..]),
        (HttpMethod::Patch, None) => with_headers(agent.patch(&url), &headers).send_empty(),
    };
    let mut response = result.map_err(map_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(body_limit)
        .read_to_vec()
        .map_err(map_error)?;

    Ok(HttpResponse {
        status,
        headers,
        body: Bytes::from(body),
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        e @ (ureq::Error::HostNotFound | ureq::Error::ConnectionFailed) => {
            TransportError::Connect(e.to_string())
        }
        ureq::Error::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => TransportError::Connect(e.to_string()),
            _ => TransportError::Io(e.to_string()),
        },
        other => TransportError::Other(other.to_string()),
    }
}
