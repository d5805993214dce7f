//! Per-operation diagnostic context.
//!
//! An [`OperationContext`] is a cheap-to-clone handle created per logical call
//! (or deliberately shared across several calls to aggregate diagnostics). It
//! carries the client request id, caller-supplied headers, the cancellation
//! token, the two observability hooks, and the append-only list of
//! [`RequestResult`]s the executor records for every attempt.
//!
//! The result list is mutex-guarded: a context shared across concurrently
//! running operations sees appends from several executor loops at once.
//! Within one operation, results are appended in strict chronological attempt
//! order.

use crate::attempt::RequestResult;
use crate::transport::{Request, Response};
use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Callback fired immediately before a request is handed to the transport.
pub type SendingRequestHook = Arc<dyn Fn(&Request, &OperationContext) + Send + Sync>;

/// Callback fired as soon as a response (any status) has been received.
pub type ResponseReceivedHook =
    Arc<dyn Fn(&Request, &Response, &OperationContext) + Send + Sync>;

/// Diagnostic accumulator and control channel for one logical operation.
#[derive(Clone)]
pub struct OperationContext {
    inner: Arc<Inner>,
}

struct Inner {
    client_request_id: Mutex<String>,
    user_headers: Mutex<HeaderMap>,
    request_results: Mutex<Vec<RequestResult>>,
    start_time: Mutex<Option<DateTime<Utc>>>,
    end_time: Mutex<Option<DateTime<Utc>>>,
    cancellation: CancellationToken,
    sending_request: Mutex<Option<SendingRequestHook>>,
    response_received: Mutex<Option<ResponseReceivedHook>>,
}

impl OperationContext {
    /// A fresh context with a generated client request id.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                client_request_id: Mutex::new(Uuid::new_v4().to_string()),
                user_headers: Mutex::new(HeaderMap::new()),
                request_results: Mutex::new(Vec::new()),
                start_time: Mutex::new(None),
                end_time: Mutex::new(None),
                cancellation: CancellationToken::new(),
                sending_request: Mutex::new(None),
                response_received: Mutex::new(None),
            }),
        }
    }

    pub fn client_request_id(&self) -> String {
        self.inner.client_request_id.lock().unwrap().clone()
    }

    pub fn set_client_request_id(&self, id: impl Into<String>) {
        *self.inner.client_request_id.lock().unwrap() = id.into();
    }

    /// Additional headers applied to every attempt of the operation.
    pub fn user_headers(&self) -> HeaderMap {
        self.inner.user_headers.lock().unwrap().clone()
    }

    pub fn set_user_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.user_headers.lock().unwrap().insert(name, value);
    }

    /// Snapshot of every attempt recorded so far, in append order.
    pub fn request_results(&self) -> Vec<RequestResult> {
        self.inner.request_results.lock().unwrap().clone()
    }

    pub(crate) fn add_request_result(&self, result: RequestResult) {
        self.inner.request_results.lock().unwrap().push(result);
    }

    /// When the first executor attempt for this context started.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.start_time.lock().unwrap()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.end_time.lock().unwrap()
    }

    pub(crate) fn ensure_start_time(&self, now: DateTime<Utc>) {
        let mut start = self.inner.start_time.lock().unwrap();
        if start.is_none() {
            *start = Some(now);
        }
    }

    pub(crate) fn set_end_time(&self, now: DateTime<Utc>) {
        *self.inner.end_time.lock().unwrap() = Some(now);
    }

    /// Token the caller can trip to abort in-flight dispatches and sleeps.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.clone()
    }

    /// Register a callback fired exactly once per attempt, just before the
    /// request goes to the transport.
    pub fn set_sending_request<F>(&self, hook: F)
    where
        F: Fn(&Request, &OperationContext) + Send + Sync + 'static,
    {
        *self.inner.sending_request.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Register a callback fired exactly once per attempt that received a
    /// response, whatever its status.
    pub fn set_response_received<F>(&self, hook: F)
    where
        F: Fn(&Request, &Response, &OperationContext) + Send + Sync + 'static,
    {
        *self.inner.response_received.lock().unwrap() = Some(Arc::new(hook));
    }

    pub(crate) fn sending_request_hook(&self) -> Option<SendingRequestHook> {
        self.inner.sending_request.lock().unwrap().clone()
    }

    pub(crate) fn response_received_hook(&self) -> Option<ResponseReceivedHook> {
        self.inner.response_received.lock().unwrap().clone()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("client_request_id", &self.client_request_id())
            .field("request_results", &self.request_results().len())
            .field("start_time", &self.start_time())
            .field("end_time", &self.end_time())
            .finish()
    }
}
