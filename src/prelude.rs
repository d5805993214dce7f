//! Convenience re-exports for the common case.
//!
//! `use georetry::prelude::*;` pulls in the types nearly every caller
//! touches.

pub use crate::{
    CommandLocationMode, ContinuationToken, Dispatch, ErrorKind, Executor, ExponentialRetry,
    LinearRetry, LocationMode, NoRetry, OperationContext, RequestOptions, RequestResult,
    ResultIterator, ResultSegment, RetryPolicy, StorageCommand, StorageError, StorageLocation,
    StorageUri,
};
