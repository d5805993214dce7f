//! Shared helpers for integration tests: a scripted transport and command
//! builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use georetry::{
    Dispatch, Executor, InstantSleeper, OperationContext, Request, Response, RetryContext,
    RetryInfo, RetryPolicy, StorageCommand, StorageUri, TransportError,
};
use http::{HeaderMap, StatusCode, Uri};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const PRIMARY_HOST: &str = "account.example.net";
pub const SECONDARY_HOST: &str = "account-secondary.example.net";

/// What one scripted attempt should produce.
#[derive(Debug, Clone)]
pub enum Script {
    /// Respond with this status and an empty body.
    Respond(StatusCode),
    /// Respond with this status and body.
    RespondWith(StatusCode, &'static str),
    /// Fail at the transport layer.
    Fail(&'static str),
}

/// Record of one request the transport saw.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl SeenRequest {
    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or("")
    }
}

/// Transport that plays back a script, one entry per attempt.
#[derive(Debug, Default)]
pub struct ScriptedDispatch {
    script: Mutex<VecDeque<Script>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedDispatch {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Every request dispatched so far, in order.
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_hosts(&self) -> Vec<String> {
        self.seen().iter().map(|request| request.host().to_owned()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatch for ScriptedDispatch {
    async fn dispatch(&self, request: Request) -> Result<Response, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        });

        let step = self.script.lock().unwrap().pop_front().expect("script exhausted");
        match step {
            Script::Respond(status) => Ok(response(status, "")),
            Script::RespondWith(status, body) => Ok(response(status, body)),
            Script::Fail(message) => Err(TransportError::new(message)),
        }
    }
}

/// Transport whose requests never complete; used for deadline tests.
#[derive(Debug, Default)]
pub struct HangingDispatch;

#[async_trait]
impl Dispatch for HangingDispatch {
    async fn dispatch(&self, _request: Request) -> Result<Response, TransportError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(TransportError::new("unreachable"))
    }
}

pub fn response(status: StatusCode, body: &'static str) -> Response {
    http::Response::builder()
        .status(status)
        .header("x-request-id", "scripted")
        .body(Bytes::from_static(body.as_bytes()))
        .expect("static response")
}

pub fn endpoints_pair() -> StorageUri {
    StorageUri::with_secondary(
        format!("https://{}", PRIMARY_HOST).parse().unwrap(),
        format!("https://{}", SECONDARY_HOST).parse().unwrap(),
    )
}

pub fn endpoints_primary_only() -> StorageUri {
    StorageUri::new(format!("https://{}", PRIMARY_HOST).parse().unwrap())
}

/// A HEAD command against `/container` that yields the response status.
pub fn head_command(endpoints: StorageUri) -> StorageCommand<StatusCode> {
    StorageCommand::new(
        endpoints,
        |_location, base, _ctx| {
            Ok(http::Request::builder()
                .method(http::Method::HEAD)
                .uri(format!("{}container", base))
                .body(Bytes::new())
                .expect("static request"))
        },
        |response, _result, _ctx| Ok(response.status()),
    )
}

/// An executor whose sleeps complete immediately.
pub fn instant_executor(dispatch: Arc<dyn Dispatch>) -> Executor {
    Executor::new(dispatch).with_sleeper(InstantSleeper)
}

/// Policy that plays back a fixed sequence of verdicts, then declines.
///
/// Fresh copies share the same script so a single instance can drive one
/// executor run.
#[derive(Debug)]
pub struct ScriptedPolicy {
    verdicts: Arc<Mutex<VecDeque<RetryInfo>>>,
}

impl ScriptedPolicy {
    pub fn new(verdicts: impl IntoIterator<Item = RetryInfo>) -> Self {
        Self { verdicts: Arc::new(Mutex::new(verdicts.into_iter().collect())) }
    }
}

impl RetryPolicy for ScriptedPolicy {
    fn evaluate(&mut self, _retry_context: &RetryContext, _: &OperationContext) -> RetryInfo {
        self.verdicts.lock().unwrap().pop_front().unwrap_or_else(RetryInfo::no_retry)
    }

    fn fresh_copy(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self { verdicts: self.verdicts.clone() })
    }
}
