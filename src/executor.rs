//! The operation executor.
//!
//! One logical operation — "download these container attributes", "delete
//! this object" — is described by a [`StorageCommand`]: how to build a
//! request for a given location and how to turn a response into a typed
//! result. The executor drives that command to completion: it resolves the
//! target location, stamps the standard headers, dispatches through the
//! injected transport, records a [`RequestResult`] for every attempt, and on
//! failure consults the per-operation retry policy clone for where and when
//! to try again — all under the caller's overall deadline and cancellation
//! token.
//!
//! Invariants:
//! - Exactly one `RequestResult` is appended to the operation context per
//!   attempt, in chronological order, whatever the outcome.
//! - The retry policy is never consulted for the first attempt, after a
//!   terminal success, or once the deadline/cancellation has fired; those
//!   two override any verdict.
//! - The `sending_request` / `response_received` hooks fire exactly once per
//!   attempt.
//!
//! Example
//! ```no_run
//! use georetry::{
//!     CommandLocationMode, Executor, LinearRetry, LocationMode, OperationContext,
//!     RequestOptions, StorageCommand, StorageUri,
//! };
//! use georetry::{Dispatch, Request, Response, TransportError};
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct HttpClient; // wraps whatever transport the application uses
//!
//! #[async_trait]
//! impl Dispatch for HttpClient {
//!     async fn dispatch(&self, _request: Request) -> Result<Response, TransportError> {
//!         Err(TransportError::new("not wired up in this example"))
//!     }
//! }
//!
//! # async fn run() -> Result<(), georetry::StorageError> {
//! let endpoints = StorageUri::with_secondary(
//!     "https://account.example.net".parse().unwrap(),
//!     "https://account-secondary.example.net".parse().unwrap(),
//! );
//!
//! let command = StorageCommand::<u64>::new(
//!     endpoints,
//!     |_location, base, _ctx| {
//!         Ok(http::Request::builder()
//!             .method(http::Method::HEAD)
//!             .uri(format!("{}container", base))
//!             .body(Bytes::new())
//!             .expect("static request"))
//!     },
//!     |_response, result, _ctx| Ok(result.content_length().unwrap_or(0)),
//! )
//! .with_allowed_locations(CommandLocationMode::PrimaryOrSecondary);
//!
//! let executor = Executor::new(Arc::new(HttpClient));
//! let options = RequestOptions::default()
//!     .with_location_mode(LocationMode::PrimaryThenSecondary)
//!     .with_retry_policy(LinearRetry::new(Duration::from_secs(2), 3));
//! let context = OperationContext::new();
//!
//! let length = executor.execute(&command, &options, &context).await?;
//! # let _ = length;
//! # Ok(())
//! # }
//! ```

use crate::attempt::{ExtendedErrorInfo, RequestResult};
use crate::clock::{Clock, SystemClock};
use crate::context::OperationContext;
use crate::error::{ErrorKind, Result, StorageError};
use crate::location::{CommandLocationMode, LocationMode, StorageLocation, StorageUri};
use crate::policy::{ExponentialRetry, RetryContext, RetryPolicy};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::{Dispatch, Request, Response, TransportError};
use http::header::HeaderValue;
use http::{StatusCode, Uri};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Header carrying the service API version on every request.
pub const STORAGE_VERSION_HEADER: &str = "x-storage-version";

/// API version this crate speaks.
pub const STORAGE_VERSION: &str = "2017-04-17";

/// Header carrying the client-chosen request id for end-to-end correlation.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-client-request-id";

/// Header carrying the request timestamp.
pub const DATE_HEADER: &str = "x-storage-date";

const USER_AGENT_VALUE: &str = concat!("georetry/", env!("CARGO_PKG_VERSION"));

type BuildRequestFn =
    Box<dyn Fn(StorageLocation, &Uri, &OperationContext) -> Result<Request> + Send + Sync>;
type ParseResponseFn<T> =
    Box<dyn Fn(&Response, &RequestResult, &OperationContext) -> Result<T> + Send + Sync>;
type SuccessPredicate = Box<dyn Fn(StatusCode) -> bool + Send + Sync>;
type ParseErrorBodyFn = Box<dyn Fn(&Response) -> Option<ExtendedErrorInfo> + Send + Sync>;

/// One logical operation: request construction plus response interpretation.
///
/// The two closures must be pure: `build_request` a function of the target
/// location, `parse_response` a function of the response. Neither may retry
/// or sleep.
pub struct StorageCommand<T> {
    endpoints: StorageUri,
    allowed_locations: CommandLocationMode,
    build_request: BuildRequestFn,
    is_success: SuccessPredicate,
    parse_response: ParseResponseFn<T>,
    parse_error_body: Option<ParseErrorBodyFn>,
}

impl<T> StorageCommand<T> {
    pub fn new<B, P>(endpoints: StorageUri, build_request: B, parse_response: P) -> Self
    where
        B: Fn(StorageLocation, &Uri, &OperationContext) -> Result<Request>
            + Send
            + Sync
            + 'static,
        P: Fn(&Response, &RequestResult, &OperationContext) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            endpoints,
            allowed_locations: CommandLocationMode::default(),
            build_request: Box::new(build_request),
            is_success: Box::new(|status| status.is_success()),
            parse_response: Box::new(parse_response),
            parse_error_body: None,
        }
    }

    /// Which locations this command may run against (writes are
    /// primary-only; most reads accept either).
    pub fn with_allowed_locations(mut self, allowed: CommandLocationMode) -> Self {
        self.allowed_locations = allowed;
        self
    }

    /// Replace the success predicate.
    ///
    /// Statuses the predicate accepts are handed to `parse_response` as
    /// expected outcomes instead of entering the retry path — this is how an
    /// existence probe models its 404 as `Ok(false)` without burning
    /// retries.
    pub fn success_when<F>(mut self, is_success: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        self.is_success = Box::new(is_success);
        self
    }

    /// Extract service error details from a failure response's body for
    /// diagnostics.
    pub fn with_error_body_parser<F>(mut self, parse: F) -> Self
    where
        F: Fn(&Response) -> Option<ExtendedErrorInfo> + Send + Sync + 'static,
    {
        self.parse_error_body = Some(Box::new(parse));
        self
    }

    pub fn endpoints(&self) -> &StorageUri {
        &self.endpoints
    }
}

impl<T> fmt::Debug for StorageCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCommand")
            .field("endpoints", &self.endpoints)
            .field("allowed_locations", &self.allowed_locations)
            .finish()
    }
}

/// Per-call knobs: retry policy prototype, location mode, deadlines.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    retry_policy: Arc<dyn RetryPolicy>,
    location_mode: LocationMode,
    maximum_execution_time: Option<Duration>,
    server_timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_retry_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Wall-clock budget for the whole operation, retries and sleeps
    /// included. When it elapses the executor aborts regardless of what the
    /// retry policy would have said.
    pub fn with_maximum_execution_time(mut self, limit: Duration) -> Self {
        self.maximum_execution_time = Some(limit);
        self
    }

    /// Cap on how long a single attempt may wait for a response. Elapsing is
    /// a retryable transport failure, not a terminal timeout; it composes
    /// with (never replaces) the overall budget.
    pub fn with_server_timeout(mut self, limit: Duration) -> Self {
        self.server_timeout = Some(limit);
        self
    }

    pub fn retry_policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.retry_policy
    }

    pub fn location_mode(&self) -> LocationMode {
        self.location_mode
    }

    pub fn maximum_execution_time(&self) -> Option<Duration> {
        self.maximum_execution_time
    }

    pub fn server_timeout(&self) -> Option<Duration> {
        self.server_timeout
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retry_policy: Arc::new(ExponentialRetry::default()),
            location_mode: LocationMode::PrimaryOnly,
            maximum_execution_time: None,
            server_timeout: None,
        }
    }
}

enum Dispatched {
    Response(Response),
    Transport(TransportError),
    AttemptTimedOut,
    DeadlineExceeded,
    Cancelled,
}

struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Drives storage commands through their attempt/retry loop.
#[derive(Clone)]
pub struct Executor {
    dispatch: Arc<dyn Dispatch>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl Executor {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self { dispatch, sleeper: Arc::new(TokioSleeper), clock: Arc::new(SystemClock) }
    }

    /// Substitute the sleeper used between retries.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Substitute the clock used for timestamps and the overall deadline.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Run `command` to completion under `options`, recording every attempt
    /// into `context`.
    pub async fn execute<T>(
        &self,
        command: &StorageCommand<T>,
        options: &RequestOptions,
        context: &OperationContext,
    ) -> Result<T> {
        let outcome = self.run(command, options, context).await;
        context.set_end_time(self.clock.utc_now());
        outcome
    }

    async fn run<T>(
        &self,
        command: &StorageCommand<T>,
        options: &RequestOptions,
        context: &OperationContext,
    ) -> Result<T> {
        let cancel = context.cancellation_token();
        let mut policy = options.retry_policy.fresh_copy();

        let mut location_mode =
            narrow_location_mode(command.allowed_locations, options.location_mode)?;
        if !command.endpoints.supports(location_mode) {
            return Err(StorageError::new(
                ErrorKind::Config,
                format!("no endpoint configured for location mode {}", location_mode),
            ));
        }
        let mut current_location = location_mode.first_location().ok_or_else(|| {
            StorageError::new(ErrorKind::Config, "location mode is unspecified")
        })?;

        let operation_start = self.clock.utc_now();
        context.ensure_start_time(operation_start);
        let deadline = match options.maximum_execution_time {
            Some(limit) => Some(
                operation_start
                    + chrono::Duration::from_std(limit).map_err(|_| {
                        StorageError::new(
                            ErrorKind::Config,
                            "maximum execution time out of range",
                        )
                    })?,
            ),
            None => None,
        };

        let mut retry_count: usize = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(context));
            }
            let overall_remaining = match deadline {
                Some(deadline) => {
                    let now = self.clock.utc_now();
                    if now >= deadline {
                        return Err(self.timed_out(context));
                    }
                    Some((deadline - now).to_std().unwrap_or_default())
                }
                None => None,
            };

            let base_uri =
                command.endpoints.location_uri(current_location).ok_or_else(|| {
                    StorageError::new(
                        ErrorKind::Config,
                        format!("no {} endpoint configured", current_location),
                    )
                })?;

            let attempt_start = self.clock.utc_now();
            let mut request = (command.build_request)(current_location, base_uri, context)?;
            self.set_standard_headers(&mut request, context);

            debug!(
                method = %request.method(),
                uri = %request.uri(),
                location = %current_location,
                "dispatching request"
            );
            if let Some(hook) = context.sending_request_hook() {
                hook(&request, context);
            }
            let hook_request =
                context.response_received_hook().map(|_| shallow_clone(&request));

            // A single attempt may wait no longer than the tighter of the
            // overall budget and the per-request server timeout.
            let (attempt_limit, bound_is_overall) =
                match (overall_remaining, options.server_timeout) {
                    (Some(overall), Some(server)) if overall <= server => (Some(overall), true),
                    (Some(_), Some(server)) => (Some(server), false),
                    (Some(overall), None) => (Some(overall), true),
                    (None, Some(server)) => (Some(server), false),
                    (None, None) => (None, false),
                };

            let dispatched =
                self.dispatch_bounded(request, attempt_limit, bound_is_overall, &cancel).await;
            let attempt_end = self.clock.utc_now();

            let (result, failure) = match dispatched {
                Dispatched::Response(response) => {
                    if let (Some(hook), Some(hook_request)) =
                        (context.response_received_hook(), hook_request.as_ref())
                    {
                        hook(hook_request, &response, context);
                    }

                    let mut result = RequestResult::from_response(
                        attempt_start,
                        attempt_end,
                        current_location,
                        &response,
                    );

                    if (command.is_success)(response.status()) {
                        context.add_request_result(result.clone());
                        debug!(
                            status = response.status().as_u16(),
                            request_id = result.service_request_id().unwrap_or(""),
                            "request completed"
                        );
                        match (command.parse_response)(&response, &result, context) {
                            Ok(value) => return Ok(value),
                            Err(parse_error) => {
                                warn!(error = %parse_error, "response could not be decoded");
                                let failure = AttemptFailure {
                                    kind: ErrorKind::Parse,
                                    message: parse_error.message().to_owned(),
                                    source: Some(Box::new(parse_error)),
                                };
                                (result, failure)
                            }
                        }
                    } else {
                        if let Some(parse_error_body) = &command.parse_error_body {
                            if let Some(details) = parse_error_body(&response) {
                                result = result.with_extended_error(details);
                            }
                        }
                        context.add_request_result(result.clone());
                        warn!(
                            status = response.status().as_u16(),
                            location = %current_location,
                            "request failed"
                        );
                        let failure = AttemptFailure {
                            kind: ErrorKind::Service,
                            message: format!(
                                "service returned status {}",
                                response.status().as_u16()
                            ),
                            source: None,
                        };
                        (result, failure)
                    }
                }
                Dispatched::Transport(error) => {
                    let result = RequestResult::no_response(
                        attempt_start,
                        attempt_end,
                        current_location,
                    );
                    context.add_request_result(result.clone());
                    warn!(error = %error, location = %current_location, "transport failure");
                    let failure = AttemptFailure {
                        kind: ErrorKind::Transport,
                        message: error.message().to_owned(),
                        source: Some(Box::new(error)),
                    };
                    (result, failure)
                }
                Dispatched::AttemptTimedOut => {
                    let result = RequestResult::no_response(
                        attempt_start,
                        attempt_end,
                        current_location,
                    );
                    context.add_request_result(result.clone());
                    warn!(location = %current_location, "no response within server timeout");
                    let failure = AttemptFailure {
                        kind: ErrorKind::Transport,
                        message: "no response within server timeout".to_owned(),
                        source: None,
                    };
                    (result, failure)
                }
                Dispatched::DeadlineExceeded => {
                    context.add_request_result(RequestResult::no_response(
                        attempt_start,
                        attempt_end,
                        current_location,
                    ));
                    return Err(self.timed_out(context));
                }
                Dispatched::Cancelled => {
                    context.add_request_result(RequestResult::no_response(
                        attempt_start,
                        attempt_end,
                        current_location,
                    ));
                    return Err(self.cancelled(context));
                }
            };

            // Failed attempt: seed the candidate location from plain
            // round-robin and let the policy confirm or override it.
            let candidate = location_mode.next_location(current_location);
            let retry_context =
                RetryContext::new(retry_count, result.clone(), candidate, location_mode);
            retry_count += 1;
            let verdict = policy.evaluate(&retry_context, context);

            if !verdict.should_retry() {
                warn!(
                    kind = %failure.kind,
                    attempts = retry_count,
                    "retry policy declined; surfacing failure"
                );
                let mut error = StorageError::new(failure.kind, failure.message)
                    .with_result(result)
                    .with_history(context.request_results());
                if let Some(source) = failure.source {
                    error = error.with_source(source);
                }
                return Err(error);
            }

            if verdict.updated_location_mode() != LocationMode::Unspecified {
                location_mode = verdict.updated_location_mode();
            }
            current_location = match verdict.target_location() {
                StorageLocation::Unspecified => candidate,
                target => target,
            };

            let interval = verdict.retry_interval();
            if let Some(deadline) = deadline {
                let now = self.clock.utc_now();
                let remaining = (deadline - now).to_std().unwrap_or_default();
                if interval >= remaining {
                    return Err(self.timed_out(context));
                }
            }

            info!(
                retry_count,
                location = %current_location,
                delay_ms = interval.as_millis() as u64,
                "retrying operation"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled(context)),
                _ = self.sleeper.sleep(interval) => {}
            }
        }
    }

    async fn dispatch_bounded(
        &self,
        request: Request,
        limit: Option<Duration>,
        bound_is_overall: bool,
        cancel: &CancellationToken,
    ) -> Dispatched {
        let dispatch = self.dispatch.dispatch(request);
        tokio::select! {
            _ = cancel.cancelled() => Dispatched::Cancelled,
            outcome = async {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, dispatch).await.ok(),
                    None => Some(dispatch.await),
                }
            } => match outcome {
                Some(Ok(response)) => Dispatched::Response(response),
                Some(Err(error)) => Dispatched::Transport(error),
                None if bound_is_overall => Dispatched::DeadlineExceeded,
                None => Dispatched::AttemptTimedOut,
            },
        }
    }

    fn set_standard_headers(&self, request: &mut Request, context: &OperationContext) {
        let date = self
            .clock
            .utc_now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let client_request_id = context.client_request_id();

        let headers = request.headers_mut();
        headers.insert(STORAGE_VERSION_HEADER, HeaderValue::from_static(STORAGE_VERSION));
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Ok(value) = HeaderValue::from_str(&date) {
            headers.insert(DATE_HEADER, value);
        }
        if !client_request_id.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&client_request_id) {
                headers.insert(CLIENT_REQUEST_ID_HEADER, value);
            }
        }
        for (name, value) in context.user_headers().iter() {
            headers.insert(name.clone(), value.clone());
        }
    }

    fn timed_out(&self, context: &OperationContext) -> StorageError {
        let history = context.request_results();
        let mut error = StorageError::new(ErrorKind::Timeout, "maximum execution time exceeded");
        if let Some(last) = history.last() {
            error = error.with_result(last.clone());
        }
        error.with_history(history)
    }

    fn cancelled(&self, context: &OperationContext) -> StorageError {
        let history = context.request_results();
        let mut error = StorageError::new(ErrorKind::Cancelled, "operation was cancelled");
        if let Some(last) = history.last() {
            error = error.with_result(last.clone());
        }
        error.with_history(history)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("dispatch", &"<dispatch>")
            .field("sleeper", &self.sleeper)
            .field("clock", &self.clock)
            .finish()
    }
}

fn narrow_location_mode(
    allowed: CommandLocationMode,
    mode: LocationMode,
) -> Result<LocationMode> {
    match allowed {
        CommandLocationMode::PrimaryOnly => {
            if mode == LocationMode::SecondaryOnly {
                return Err(StorageError::new(
                    ErrorKind::Config,
                    "command can only be run against the primary location",
                ));
            }
            Ok(LocationMode::PrimaryOnly)
        }
        CommandLocationMode::SecondaryOnly => {
            if mode == LocationMode::PrimaryOnly {
                return Err(StorageError::new(
                    ErrorKind::Config,
                    "command can only be run against the secondary location",
                ));
            }
            Ok(LocationMode::SecondaryOnly)
        }
        CommandLocationMode::PrimaryOrSecondary => Ok(mode),
    }
}

// The http request types are deliberately not Clone; the hooks only need a
// structural copy with the same cheap body.
fn shallow_clone(request: &Request) -> Request {
    let mut clone = http::Request::new(request.body().clone());
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    clone
}
