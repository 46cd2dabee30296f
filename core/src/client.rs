//! Request client: builds requests against a base URL, sends them through a
//! transport, and resolves the response into the caller's requested shape.
//!
//! # Design
//! Building and parsing stay separate steps, as in a host-does-IO client:
//! [`RequestBuilder::build`] produces an [`HttpRequest`] without touching the
//! network, and [`RequestClient::parse_response`] classifies and resolves an
//! [`HttpResponse`] obtained anywhere. Sending a builder glues the two
//! together around a [`Transport`] call on a spawned Tokio task.
//!
//! Status is checked before decoding. A non-2xx response is an
//! [`ApiError::HttpStatus`] carrying the untouched body, whatever shape was
//! requested.
//!
//! The configuration is the only state shared between requests. It sits
//! behind an `RwLock` and every request copies it when built, so changing it
//! never affects requests already in flight.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::decoder::{Decoder, JsonDecoder};
use crate::endpoint::Endpoint;
use crate::error::ApiError;
use crate::http::{merge_headers, HttpMethod, HttpRequest, HttpResponse};
use crate::pending::{Delivery, PendingRequest};
use crate::shape::{Empty, RawBytes, Record, RecordList, ResponseShape, UntypedJson};
use crate::transport::Transport;

/// Client bound to one base URL and one transport.
///
/// Cloning is cheap and clones share configuration, transport and decoder.
#[derive(Debug)]
pub struct RequestClient<T, D = JsonDecoder> {
    config: Arc<RwLock<ClientConfig>>,
    transport: Arc<T>,
    decoder: Arc<D>,
}

impl<T, D> Clone for RequestClient<T, D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<T: Transport> RequestClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_decoder(config, transport, JsonDecoder)
    }
}

impl<T: Transport, D: Decoder> RequestClient<T, D> {
    pub fn with_decoder(config: ClientConfig, transport: T, decoder: D) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            transport: Arc::new(transport),
            decoder: Arc::new(decoder),
        }
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .base_url = base_url.into();
    }

    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_header(name, value);
    }

    pub fn remove_default_header(&self, name: &str) -> bool {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_header(name)
    }

    pub fn request(&self, method: HttpMethod, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        RequestBuilder {
            client: self,
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        self.request(HttpMethod::Get, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        self.request(HttpMethod::Post, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        self.request(HttpMethod::Put, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        self.request(HttpMethod::Delete, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_, T, D> {
        self.request(HttpMethod::Patch, path)
    }

    /// Classify `response` and resolve its body into `shape`'s output.
    pub fn parse_response<S: ResponseShape>(
        &self,
        shape: &S,
        response: HttpResponse,
    ) -> Result<S::Output, ApiError> {
        resolve_response(shape, response, self.decoder.as_ref())
    }

    fn dispatch<S: ResponseShape>(&self, request: HttpRequest, shape: S) -> PendingRequest<S::Output> {
        debug!(
            method = %request.method,
            url = %request.url,
            shape = %shape.kind(),
            "dispatching request"
        );
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                debug!(method = %request.method, url = %request.url, "no Tokio runtime, request rejected");
                return PendingRequest::ready(Err(ApiError::InvalidRequest(format!(
                    "requests must be sent from within a Tokio runtime: {err}"
                ))));
            }
        };
        let (tx, rx) = oneshot::channel();
        let delivery = Arc::new(Delivery::default());
        let task = runtime.spawn(run_transfer(
            Arc::clone(&self.transport),
            Arc::clone(&self.decoder),
            request,
            shape,
            Arc::clone(&delivery),
            tx,
        ));
        PendingRequest::in_flight(rx, task.abort_handle(), runtime, delivery)
    }
}

async fn run_transfer<T, D, S>(
    transport: Arc<T>,
    decoder: Arc<D>,
    request: HttpRequest,
    shape: S,
    delivery: Arc<Delivery>,
    tx: oneshot::Sender<Result<S::Output, ApiError>>,
) where
    T: Transport,
    D: Decoder,
    S: ResponseShape,
{
    let method = request.method;
    let url = request.url.clone();
    let outcome = match transport.send(request).await {
        Ok(response) => {
            if delivery.is_cancelled() {
                trace!(%method, %url, "cancelled before resolution, dropping response");
                return;
            }
            debug!(%method, %url, status = response.status, "response received");
            resolve_response(&shape, response, decoder.as_ref())
        }
        Err(err) => {
            debug!(%method, %url, error = %err, "transport failed");
            Err(ApiError::Transport(err))
        }
    };
    if tx.send(outcome).is_err() {
        trace!(%method, %url, "receiver gone, outcome discarded");
    }
}

/// Status first, then the shape's resolver on 2xx bodies only.
pub(crate) fn resolve_response<S, D>(
    shape: &S,
    response: HttpResponse,
    decoder: &D,
) -> Result<S::Output, ApiError>
where
    S: ResponseShape,
    D: Decoder,
{
    let body = check_status(response)?;
    shape.resolve(body, decoder).map_err(|err| {
        debug!(shape = %shape.kind(), error = %err, "response did not match requested shape");
        ApiError::Decoding(err)
    })
}

/// Hand back the body of a 2xx response; anything else becomes `HttpStatus`.
fn check_status(response: HttpResponse) -> Result<Bytes, ApiError> {
    if response.is_success() {
        return Ok(response.body);
    }
    Err(ApiError::HttpStatus {
        status: response.status,
        body: response.body,
    })
}

/// A request under construction. Finish it with one of the shape methods
/// (`empty`, `bytes`, `json_value`, `record`, `list`, `list_at`) or `send`.
#[must_use]
#[derive(Debug)]
pub struct RequestBuilder<'a, T, D = JsonDecoder> {
    client: &'a RequestClient<T, D>,
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl<T: Transport, D: Decoder> RequestBuilder<'_, T, D> {
    /// Per-call header; replaces a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and set `content-type: application/json`.
    pub fn json<B: Serialize + ?Sized>(self, value: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value).map_err(ApiError::Serialization)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    /// The request that would be sent, without sending it.
    pub fn build(&self) -> Result<HttpRequest, ApiError> {
        if self.body.is_some() && !self.method.allows_body() {
            return Err(ApiError::InvalidRequest(format!(
                "{} requests cannot carry a body",
                self.method
            )));
        }
        let config = self.client.config();
        Ok(HttpRequest {
            method: self.method,
            url: Endpoint::new(config.base_url, self.path.as_str()).url(),
            headers: merge_headers(&config.default_headers, &self.headers),
            body: self.body.clone(),
        })
    }

    /// Send the request and resolve its response into `shape`.
    ///
    /// The transfer runs on the current Tokio runtime. Outside one, the request
    /// resolves immediately to [`ApiError::InvalidRequest`] and is never sent.
    /// The shape methods below all go through here.
    pub fn send<S: ResponseShape>(self, shape: S) -> PendingRequest<S::Output> {
        match self.build() {
            Ok(request) => self.client.dispatch(request, shape),
            Err(err) => {
                debug!(method = %self.method, path = %self.path, error = %err, "request rejected");
                PendingRequest::ready(Err(err))
            }
        }
    }

    pub fn empty(self) -> PendingRequest<()> {
        self.send(Empty)
    }

    pub fn bytes(self) -> PendingRequest<Bytes> {
        self.send(RawBytes)
    }

    pub fn json_value(self) -> PendingRequest<Value> {
        self.send(UntypedJson)
    }

    pub fn record<R>(self) -> PendingRequest<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        self.send(Record::new())
    }

    pub fn list<R>(self) -> PendingRequest<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        self.send(RecordList::new())
    }

    /// Decode the array found under the top-level field `keypath`.
    pub fn list_at<R>(self, keypath: impl Into<String>) -> PendingRequest<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        self.send(RecordList::at(keypath))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodingError, TransportError};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        firstname: String,
        lastname: String,
    }

    /// Answers every request with a fixed response and records what it saw.
    struct FixedTransport {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for FixedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse::new(self.status, self.body))
        }
    }

    struct FailingTransport(TransportError);

    impl Transport for FailingTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(self.0.clone())
        }
    }

    /// Holds every response until `release` is notified.
    struct GatedTransport {
        gate: Arc<Notify>,
        completed: Arc<AtomicUsize>,
    }

    impl Transport for GatedTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.gate.notified().await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200, r#"{"response":"OK"}"#))
        }
    }

    fn client(status: u16, body: &'static str) -> RequestClient<Arc<FixedTransport>> {
        let transport = Arc::new(FixedTransport::new(status, body));
        RequestClient::new(ClientConfig::new("http://localhost:3000"), transport)
    }

    #[test]
    fn build_joins_base_url_and_path() {
        let c = client(200, "");
        let req = c.get("users").build().unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/users");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_merges_default_and_call_headers() {
        let c = client(200, "");
        c.set_default_header("Accept", "application/json");
        c.set_default_header("x-app", "demo");
        let req = c.get("/users").header("accept", "text/plain").build().unwrap();
        assert_eq!(req.header("Accept"), Some("text/plain"));
        assert_eq!(req.header("x-app"), Some("demo"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn build_rejects_body_on_get_and_delete() {
        let c = client(200, "");
        let err = c.get("/users").body("x").build().unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = c.delete("/users/1").body("x").build().unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn json_body_sets_content_type() {
        #[derive(Serialize)]
        struct NewPerson<'a> {
            firstname: &'a str,
        }

        let c = client(200, "");
        let req = c
            .post("/users")
            .json(&NewPerson { firstname: "Ada" })
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["firstname"], "Ada");
    }

    #[test]
    fn base_url_change_applies_to_later_requests() {
        let c = client(200, "");
        let before = c.get("/a").build().unwrap();
        c.set_base_url("http://other:8080/");
        let after = c.get("/a").build().unwrap();
        assert_eq!(before.url, "http://localhost:3000/a");
        assert_eq!(after.url, "http://other:8080/a");
        assert!(!c.remove_default_header("missing"));
    }

    #[test]
    fn parse_response_checks_status_before_decoding() {
        let c = client(200, "");
        let body = r#"{"firstname":"John","lastname":"Doe"}"#;
        let err = c
            .parse_response(&Record::<Person>::new(), HttpResponse::new(500, body))
            .unwrap_err();
        match err {
            ApiError::HttpStatus { status, body: b } => {
                assert_eq!(status, 500);
                assert_eq!(&b[..], body.as_bytes());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_response_non_2xx_fails_for_every_shape() {
        let c = client(200, "");
        let ok_json = r#"{"users":[]}"#;
        for status in [301, 404, 500] {
            let r = || HttpResponse::new(status, ok_json);
            assert_eq!(c.parse_response(&Empty, r()).unwrap_err().status(), Some(status));
            assert_eq!(c.parse_response(&RawBytes, r()).unwrap_err().status(), Some(status));
            assert_eq!(c.parse_response(&UntypedJson, r()).unwrap_err().status(), Some(status));
            assert_eq!(
                c.parse_response(&RecordList::<Person>::at("users"), r())
                    .unwrap_err()
                    .status(),
                Some(status)
            );
        }
    }

    #[test]
    fn parse_response_wraps_decoding_errors() {
        let c = client(200, "");
        let err = c
            .parse_response(&RecordList::<Person>::new(), HttpResponse::new(200, "{}"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Decoding(DecodingError::UnexpectedShape { .. })));
    }

    #[tokio::test]
    async fn post_resolves_every_shape() {
        let c = client(200, r#"{"firstname":"John","lastname":"Doe"}"#);
        c.post("/user").empty().await.unwrap();
        let raw = c.post("/user").bytes().await.unwrap();
        assert_eq!(&raw[..], br#"{"firstname":"John","lastname":"Doe"}"#);
        let value = c.post("/user").json_value().await.unwrap();
        assert_eq!(value["firstname"], "John");
        let person: Person = c.post("/user").record().await.unwrap();
        assert_eq!(
            person,
            Person {
                firstname: "John".into(),
                lastname: "Doe".into()
            }
        );
        let err = c.post("/user").list::<Person>().await.unwrap_err();
        assert!(err.is_decoding());
    }

    #[tokio::test]
    async fn list_at_keypath_over_transport() {
        let c = client(
            200,
            r#"{"users":[{"firstname":"A","lastname":"1"},{"firstname":"B","lastname":"2"}]}"#,
        );
        let people: Vec<Person> = c.get("/directory").list_at("users").await.unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[1].firstname, "B");
        let err = c.get("/directory").list_at::<Person>("items").await.unwrap_err();
        assert!(matches!(err, ApiError::Decoding(DecodingError::MissingKey(_))));
    }

    #[tokio::test]
    async fn transport_receives_built_request() {
        let transport = Arc::new(FixedTransport::new(204, ""));
        let c = RequestClient::new(
            ClientConfig::new("http://api.test/v1/").with_header("accept", "application/json"),
            Arc::clone(&transport),
        );
        c.put("/users/7").body("payload").empty().await.unwrap();
        let seen = transport.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, HttpMethod::Put);
        assert_eq!(seen[0].url, "http://api.test/v1/users/7");
        assert_eq!(seen[0].header("accept"), Some("application/json"));
        assert_eq!(seen[0].body.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn rejected_request_never_reaches_transport() {
        let transport = Arc::new(FixedTransport::new(200, ""));
        let c = RequestClient::new(ClientConfig::new("http://h"), Arc::clone(&transport));
        let err = c.get("/x").body("nope").empty().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn sending_outside_a_runtime_fails_without_panicking() {
        let transport = Arc::new(FixedTransport::new(200, "{}"));
        let c = RequestClient::new(ClientConfig::new("http://h"), Arc::clone(&transport));
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = c.get("/users").json_value().on_complete(move |outcome| {
            tx.send(outcome).unwrap();
        });

        assert!(handle.is_completed());
        assert!(matches!(rx.try_recv().unwrap(), Err(ApiError::InvalidRequest(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let c = RequestClient::new(
            ClientConfig::new("http://h"),
            FailingTransport(TransportError::Timeout),
        );
        let err = c.get("/x").json_value().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn cancel_before_transport_completes_delivers_nothing() {
        let gate = Arc::new(Notify::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let c = RequestClient::new(
            ClientConfig::new("http://h"),
            GatedTransport {
                gate: Arc::clone(&gate),
                completed: Arc::clone(&completed),
            },
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = c.get("/slow").json_value().on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;
        assert!(handle.cancel());
        assert!(handle.is_cancelled());

        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let c = client(200, r#"{"response":"OK"}"#);
        let (tx, rx) = oneshot::channel();
        let handle = c.get("/response").json_value().on_complete(move |outcome| {
            let _ = tx.send(outcome);
        });
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["response"], "OK");
        assert!(handle.is_completed());
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn callback_runs_exactly_once() {
        let c = client(200, "[]");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let counter = Arc::clone(&calls);
            handles.push(c.get("/users").list::<Person>().on_complete(move |outcome| {
                assert!(outcome.unwrap().is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 16);
        assert!(handles.iter().all(|h| h.is_completed() && !h.cancel()));
    }

    #[tokio::test]
    async fn dropping_pending_request_aborts_transfer() {
        let gate = Arc::new(Notify::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let c = RequestClient::new(
            ClientConfig::new("http://h"),
            GatedTransport {
                gate: Arc::clone(&gate),
                completed: Arc::clone(&completed),
            },
        );
        let pending = c.get("/slow").empty();
        tokio::task::yield_now().await;
        drop(pending);
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
