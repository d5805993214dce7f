//! The failure taxonomy surfaced to callers.
//!
//! Everything that goes wrong during an operation — transport failures,
//! retryable and terminal service errors, parse failures, a blown overall
//! deadline, cancellation — ends up as one [`StorageError`] carrying the last
//! attempt's [`RequestResult`] and the full per-attempt history. Expected
//! non-success outcomes (a 404 on an existence probe, say) never become
//! errors; they flow through the command's success predicate as typed values.

use crate::attempt::{ExtendedErrorInfo, RequestResult};
use http::StatusCode;
use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// What class of failure a [`StorageError`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request never produced a response.
    Transport,
    /// The service responded with a failure status.
    Service,
    /// The response arrived but could not be decoded into the expected type.
    Parse,
    /// The overall operation deadline elapsed.
    Timeout,
    /// The caller's cancellation signal fired.
    Cancelled,
    /// The operation was misconfigured and never dispatched.
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Service => "service",
            ErrorKind::Parse => "parse",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one logical storage operation.
#[derive(Debug)]
pub struct StorageError {
    kind: ErrorKind,
    message: String,
    result: Option<RequestResult>,
    history: Vec<RequestResult>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), result: None, history: Vec::new(), source: None }
    }

    /// Attach the result of the attempt that made the failure terminal.
    pub fn with_result(mut self, result: RequestResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach the full per-attempt history of the operation.
    pub fn with_history(mut self, history: Vec<RequestResult>) -> Self {
        self.history = history;
        self
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The last attempt's result, if any attempt ran.
    pub fn last_result(&self) -> Option<&RequestResult> {
        self.result.as_ref()
    }

    /// Status code of the final attempt, if a response was received.
    pub fn http_status_code(&self) -> Option<StatusCode> {
        self.result.as_ref().and_then(RequestResult::http_status_code)
    }

    /// Service error details from the final attempt, if parsed.
    pub fn extended_error(&self) -> Option<&ExtendedErrorInfo> {
        self.result.as_ref().and_then(RequestResult::extended_error)
    }

    /// Every attempt the operation made, in chronological order.
    pub fn request_results(&self) -> &[RequestResult] {
        &self.history
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)?;
        if let Some(status) = self.http_status_code() {
            write!(f, "; last status: {}", status.as_u16())?;
        }
        if let Some(error) = self.extended_error() {
            write!(f, "; service error: {}", error.code())?;
        }
        if self.history.len() > 1 {
            write!(f, "; after {} attempts", self.history.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(source) => Some(source.as_ref()),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::ExtendedErrorInfo;
    use crate::location::StorageLocation;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use std::error::Error;

    fn result_with_status(status: StatusCode) -> RequestResult {
        let response = http::Response::builder().status(status).body(Bytes::new()).unwrap();
        let at = Utc.timestamp_opt(0, 0).unwrap();
        RequestResult::from_response(at, at, StorageLocation::Primary, &response)
    }

    #[test]
    fn display_includes_status_and_attempts() {
        let last = result_with_status(StatusCode::INTERNAL_SERVER_ERROR)
            .with_extended_error(ExtendedErrorInfo::new("InternalError", "boom"));
        let error = StorageError::new(ErrorKind::Service, "container fetch failed")
            .with_history(vec![last.clone(), last.clone()])
            .with_result(last);

        let message = error.to_string();
        assert!(message.contains("container fetch failed"));
        assert!(message.contains("service"));
        assert!(message.contains("500"));
        assert!(message.contains("InternalError"));
        assert!(message.contains("2 attempts"));
    }

    #[test]
    fn display_without_response_omits_status() {
        let error = StorageError::new(ErrorKind::Transport, "connection refused");
        let message = error.to_string();
        assert!(message.contains("transport"));
        assert!(!message.contains("last status"));
    }

    #[test]
    fn kind_predicates() {
        assert!(StorageError::new(ErrorKind::Timeout, "gave up").is_timeout());
        assert!(StorageError::new(ErrorKind::Cancelled, "stopped").is_cancelled());
        assert!(StorageError::new(ErrorKind::Transport, "refused").is_transport());
        assert!(!StorageError::new(ErrorKind::Service, "500").is_timeout());
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let error = StorageError::new(ErrorKind::Transport, "dispatch failed").with_source(io);
        assert!(error.source().unwrap().to_string().contains("socket timeout"));
    }

    #[test]
    fn accessors_read_last_result() {
        let last = result_with_status(StatusCode::SERVICE_UNAVAILABLE);
        let error = StorageError::new(ErrorKind::Service, "unavailable")
            .with_result(last)
            .with_history(Vec::new());
        assert_eq!(error.http_status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(error.request_results().len(), 0);
        assert!(error.last_result().is_some());
    }
}
