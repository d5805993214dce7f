#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # georetry
//!
//! Retry, geo-failover, and paged-listing execution core for clients of
//! geo-replicated storage services.
//!
//! A storage account with a secondary read replica gives a client two ways to
//! serve every read. This crate owns the decisions that make that useful:
//! which endpoint each attempt targets, whether and when a failed attempt is
//! retried, how long to back off, and how the location strategy adapts to
//! what the service reports — plus the resumable segment iterator that every
//! listing operation is built on.
//!
//! ## Features
//!
//! - **Retry policies** — no-retry, linear, and exponential-with-jitter,
//!   plus a trait for user-defined strategies; every policy is cloned fresh
//!   per operation so concurrent calls never share counters
//! - **Location modes** — pin to primary or secondary, or alternate between
//!   them, with per-location interval alignment so a failover hop does not
//!   sit out a full backoff
//! - **Operation executor** — one state machine driving build → dispatch →
//!   classify → consult policy → sleep, under an overall deadline and a
//!   caller-held cancellation token
//! - **Result iterator** — lazy, capped, resumable paging over
//!   continuation-token listings
//! - **Deterministic tests** — injectable [`Sleeper`] and [`Clock`] instead
//!   of ambient timers
//!
//! ## Quick start
//!
//! ```no_run
//! use georetry::{
//!     CommandLocationMode, Executor, ExponentialRetry, LocationMode, OperationContext,
//!     RequestOptions, StorageCommand, StorageUri,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # use georetry::{Dispatch, Request, Response, TransportError};
//! # use async_trait::async_trait;
//! # #[derive(Debug)]
//! # struct HttpClient;
//! # #[async_trait]
//! # impl Dispatch for HttpClient {
//! #     async fn dispatch(&self, _request: Request) -> Result<Response, TransportError> {
//! #         Err(TransportError::new("unreachable in docs"))
//! #     }
//! # }
//! # async fn run() -> Result<(), georetry::StorageError> {
//! let executor = Executor::new(Arc::new(HttpClient));
//! let options = RequestOptions::default()
//!     .with_location_mode(LocationMode::PrimaryThenSecondary)
//!     .with_retry_policy(ExponentialRetry::new(Duration::from_secs(1), 3))
//!     .with_maximum_execution_time(Duration::from_secs(60));
//!
//! let endpoints = StorageUri::with_secondary(
//!     "https://account.example.net".parse().unwrap(),
//!     "https://account-secondary.example.net".parse().unwrap(),
//! );
//! let exists = StorageCommand::<bool>::new(
//!     endpoints,
//!     |_location, base, _ctx| {
//!         Ok(http::Request::builder()
//!             .method(http::Method::HEAD)
//!             .uri(format!("{}container", base))
//!             .body(bytes::Bytes::new())
//!             .expect("static request"))
//!     },
//!     |response, _result, _ctx| Ok(response.status() != http::StatusCode::NOT_FOUND),
//! )
//! .with_allowed_locations(CommandLocationMode::PrimaryOrSecondary)
//! .success_when(|status| status.is_success() || status == http::StatusCode::NOT_FOUND);
//!
//! let context = OperationContext::new();
//! let found = executor.execute(&exists, &options, &context).await?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```

pub mod attempt;
pub mod backoff;
pub mod clock;
pub mod context;
pub mod error;
pub mod executor;
pub mod location;
pub mod policy;
pub mod prelude;
pub mod segment;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use attempt::{ExtendedErrorInfo, RequestResult};
pub use clock::{Clock, FakeClock, SystemClock};
pub use context::OperationContext;
pub use error::{ErrorKind, Result, StorageError};
pub use executor::{Executor, RequestOptions, StorageCommand};
pub use location::{CommandLocationMode, LocationMode, StorageLocation, StorageUri};
pub use policy::{
    ExponentialRetry, LinearRetry, NoRetry, RetryContext, RetryInfo, RetryPolicy, SwitchBackoff,
};
pub use segment::{ContinuationToken, ResultIterator, ResultSegment, SegmentGenerator};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{Dispatch, Request, Response, TransportError};
