//! Per-attempt outcome records.
//!
//! Every HTTP attempt an operation makes, successful or not, leaves behind one
//! [`RequestResult`]: when it ran, where it went, what came back. The executor
//! appends them to the operation context in strict attempt order, retry
//! policies read the newest one to classify the failure, and terminal errors
//! carry the whole list as diagnostic history.

use crate::location::StorageLocation;
use crate::transport::Response;
use chrono::{DateTime, Utc};
use http::header;
use http::StatusCode;

/// Header carrying the service-assigned request id on responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Service-reported error details extracted from an error response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedErrorInfo {
    code: String,
    message: String,
}

impl ExtendedErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    /// Service error code, e.g. `ContainerNotFound`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Immutable record of one HTTP attempt's outcome.
#[derive(Debug, Clone)]
pub struct RequestResult {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    target_location: StorageLocation,
    http_status_code: Option<StatusCode>,
    service_request_id: Option<String>,
    etag: Option<String>,
    content_length: Option<u64>,
    extended_error: Option<ExtendedErrorInfo>,
}

impl RequestResult {
    /// Record an attempt that produced no response (transport failure,
    /// cancellation, or an aborted in-flight request).
    pub fn no_response(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        target_location: StorageLocation,
    ) -> Self {
        Self {
            start_time,
            end_time,
            target_location,
            http_status_code: None,
            service_request_id: None,
            etag: None,
            content_length: None,
            extended_error: None,
        }
    }

    /// Record an attempt from the response it produced.
    pub fn from_response(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        target_location: StorageLocation,
        response: &Response,
    ) -> Self {
        let headers = response.headers();
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };

        Self {
            start_time,
            end_time,
            target_location,
            http_status_code: Some(response.status()),
            service_request_id: header_str(REQUEST_ID_HEADER),
            etag: headers
                .get(header::ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            content_length: headers
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok()),
            extended_error: None,
        }
    }

    /// Attach service error details parsed from the response body.
    pub fn with_extended_error(mut self, error: ExtendedErrorInfo) -> Self {
        self.extended_error = Some(error);
        self
    }

    /// Whether the service produced any response for this attempt.
    pub fn is_response_available(&self) -> bool {
        self.http_status_code.is_some()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn target_location(&self) -> StorageLocation {
        self.target_location
    }

    /// Status code of the response, or `None` when no response arrived.
    pub fn http_status_code(&self) -> Option<StatusCode> {
        self.http_status_code
    }

    pub fn service_request_id(&self) -> Option<&str> {
        self.service_request_id.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn extended_error(&self) -> Option<&ExtendedErrorInfo> {
        self.extended_error.as_ref()
    }
}
