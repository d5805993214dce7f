//! Retry policies.
//!
//! A policy is consulted once per failed attempt, never for the first attempt
//! and never after a terminal success. It receives a [`RetryContext`] snapshot
//! ("what just happened, and where would round-robin go next") and answers
//! with a [`RetryInfo`] verdict ("retry or not, where, after how long, and
//! under which location mode from now on").
//!
//! Semantics:
//! - `max_attempts` counts retries: a policy built with `max_attempts = 3`
//!   allows three retries after the initial attempt.
//! - Policies carry per-operation state (the last attempt time per location),
//!   so the executor obtains a private instance via
//!   [`RetryPolicy::fresh_copy`] for every logical operation. Copies start
//!   with that state reset; nothing leaks between operations.
//! - Classification is shared by the linear and exponential policies:
//!   3xx/4xx responses are terminal except 408, and except a 404 served by
//!   the secondary, which usually means replication lag and is retried
//!   against the primary with the operation permanently narrowed to
//!   [`LocationMode::PrimaryOnly`]. 501 and 505 are terminal. Transport and
//!   parse failures are retryable.
//! - The wait before a retry is measured per location (see
//!   [`SwitchBackoff`]): hopping to a replica that has not been tried
//!   recently should not sit out the full interval.
//!
//! Example
//! ```rust
//! use georetry::{ExponentialRetry, LinearRetry, SwitchBackoff};
//! use std::time::Duration;
//!
//! let linear = LinearRetry::new(Duration::from_secs(2), 4);
//! let exponential = ExponentialRetry::new(Duration::from_secs(1), 4)
//!     .with_switch_backoff(SwitchBackoff::FullOnServerError);
//! # let _ = (linear, exponential);
//! ```

use crate::attempt::RequestResult;
use crate::backoff::{
    self, DEFAULT_RETRY_INTERVAL, MAX_EXPONENTIAL_RETRY_INTERVAL,
};
use crate::clock::{Clock, SystemClock};
use crate::context::OperationContext;
use crate::location::{LocationMode, StorageLocation};
use chrono::{DateTime, Utc};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Default number of retries for the built-in policies.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Snapshot handed to a policy after a failed attempt.
///
/// Constructed fresh before each consultation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RetryContext {
    current_retry_count: usize,
    last_request_result: RequestResult,
    next_location: StorageLocation,
    current_location_mode: LocationMode,
}

impl RetryContext {
    pub fn new(
        current_retry_count: usize,
        last_request_result: RequestResult,
        next_location: StorageLocation,
        current_location_mode: LocationMode,
    ) -> Self {
        Self { current_retry_count, last_request_result, next_location, current_location_mode }
    }

    /// 0-based count of retries already performed for this operation.
    pub fn current_retry_count(&self) -> usize {
        self.current_retry_count
    }

    /// Outcome of the attempt that just failed.
    pub fn last_request_result(&self) -> &RequestResult {
        &self.last_request_result
    }

    /// Where plain round-robin alternation would send the next attempt.
    pub fn next_location(&self) -> StorageLocation {
        self.next_location
    }

    /// The operation's location mode, including any narrowing applied by
    /// earlier verdicts.
    pub fn current_location_mode(&self) -> LocationMode {
        self.current_location_mode
    }
}

/// A policy's verdict on a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInfo {
    should_retry: bool,
    target_location: StorageLocation,
    updated_location_mode: LocationMode,
    retry_interval: Duration,
}

impl RetryInfo {
    /// Decline to retry; the executor surfaces the failure.
    pub fn no_retry() -> Self {
        Self {
            should_retry: false,
            target_location: StorageLocation::Unspecified,
            updated_location_mode: LocationMode::Unspecified,
            retry_interval: Duration::ZERO,
        }
    }

    /// Approve a retry seeded from the context: round-robin target, unchanged
    /// location mode, default interval.
    pub fn retry(context: &RetryContext) -> Self {
        Self {
            should_retry: true,
            target_location: context.next_location(),
            updated_location_mode: context.current_location_mode(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Approve a retry with explicit parameters; the escape hatch for
    /// custom policies that override the seeded verdict.
    pub fn retry_to(
        target_location: StorageLocation,
        updated_location_mode: LocationMode,
        retry_interval: Duration,
    ) -> Self {
        Self { should_retry: true, target_location, updated_location_mode, retry_interval }
    }

    pub fn should_retry(&self) -> bool {
        self.should_retry
    }

    pub fn target_location(&self) -> StorageLocation {
        self.target_location
    }

    pub fn set_target_location(&mut self, location: StorageLocation) {
        self.target_location = location;
    }

    /// The location mode the operation continues under if this verdict is
    /// adopted. Lets a policy permanently narrow the mode mid-operation.
    pub fn updated_location_mode(&self) -> LocationMode {
        self.updated_location_mode
    }

    pub fn set_updated_location_mode(&mut self, mode: LocationMode) {
        self.updated_location_mode = mode;
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn set_retry_interval(&mut self, interval: Duration) {
        self.retry_interval = interval;
    }
}

/// Pluggable retry strategy.
///
/// Implementations may keep internal state across `evaluate` calls within one
/// operation; `fresh_copy` must return an instance with that state reset.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    fn evaluate(
        &mut self,
        retry_context: &RetryContext,
        operation_context: &OperationContext,
    ) -> RetryInfo;

    /// A private instance for a new logical operation.
    fn fresh_copy(&self) -> Box<dyn RetryPolicy>;
}

/// How the wait is computed when a retry targets a different location than
/// the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchBackoff {
    /// Measure the interval against the target location's own last attempt:
    /// time already spent against the other replica counts toward the wait,
    /// and a location that has not been tried yet is retried immediately.
    #[default]
    Aligned,
    /// As [`SwitchBackoff::Aligned`], except that a 5xx on the failed attempt
    /// keeps the full interval even when the target location changes.
    FullOnServerError,
    /// Always wait the full computed interval.
    Full,
}

/// Classification and interval bookkeeping shared by the backoff policies.
#[derive(Debug, Clone)]
struct CommonRetry {
    max_attempts: usize,
    switch_backoff: SwitchBackoff,
    clock: Arc<dyn Clock>,
    last_primary_attempt: Option<DateTime<Utc>>,
    last_secondary_attempt: Option<DateTime<Utc>>,
}

impl CommonRetry {
    fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            switch_backoff: SwitchBackoff::default(),
            clock: Arc::new(SystemClock),
            last_primary_attempt: None,
            last_secondary_attempt: None,
        }
    }

    fn fresh(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            switch_backoff: self.switch_backoff,
            clock: self.clock.clone(),
            last_primary_attempt: None,
            last_secondary_attempt: None,
        }
    }

    fn evaluate(&mut self, context: &RetryContext) -> RetryInfo {
        if context.current_retry_count() >= self.max_attempts {
            return RetryInfo::no_retry();
        }

        let last = context.last_request_result();

        // The interval to a location is measured from that location's own
        // last attempt, so time spent against the other replica counts
        // toward the wait. Remember when each location was last tried.
        match last.target_location() {
            StorageLocation::Primary => self.last_primary_attempt = Some(last.end_time()),
            StorageLocation::Secondary => self.last_secondary_attempt = Some(last.end_time()),
            StorageLocation::Unspecified => {}
        }

        let status = last.http_status_code();
        let secondary_not_found = status == Some(StatusCode::NOT_FOUND)
            && last.target_location() == StorageLocation::Secondary;

        if let Some(status) = status {
            let code = status.as_u16();
            // 3xx/4xx are terminal, except 408 and a secondary 404 (the
            // replica may simply not have caught up yet).
            if (300..500).contains(&code)
                && status != StatusCode::REQUEST_TIMEOUT
                && !secondary_not_found
            {
                return RetryInfo::no_retry();
            }
            if status == StatusCode::NOT_IMPLEMENTED
                || status == StatusCode::HTTP_VERSION_NOT_SUPPORTED
            {
                return RetryInfo::no_retry();
            }
        }

        let mut info = RetryInfo::retry(context);
        if secondary_not_found
            && context.current_location_mode() != LocationMode::SecondaryOnly
        {
            info.set_updated_location_mode(LocationMode::PrimaryOnly);
            info.set_target_location(StorageLocation::Primary);
        }
        info
    }

    fn apply_interval(&self, info: &mut RetryInfo, context: &RetryContext, computed: Duration) {
        info.set_retry_interval(computed);

        let last = context.last_request_result();
        let switching = info.target_location() != last.target_location();
        let server_error =
            last.http_status_code().is_some_and(|status| status.is_server_error());

        match self.switch_backoff {
            SwitchBackoff::Full => {}
            SwitchBackoff::FullOnServerError if switching && server_error => {}
            _ => self.align_retry_interval(info),
        }
    }

    /// Shorten the interval by the time already elapsed since the target
    /// location's last attempt; a never-attempted location waits nothing.
    fn align_retry_interval(&self, info: &mut RetryInfo) {
        let last_attempt = match info.target_location() {
            StorageLocation::Primary => self.last_primary_attempt,
            StorageLocation::Secondary => self.last_secondary_attempt,
            StorageLocation::Unspecified => return,
        };

        match last_attempt {
            Some(last) => {
                let since = (self.clock.utc_now() - last).to_std().unwrap_or_default();
                info.set_retry_interval(info.retry_interval().saturating_sub(since));
            }
            None => info.set_retry_interval(Duration::ZERO),
        }
    }
}

/// Policy that never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn evaluate(&mut self, _retry_context: &RetryContext, _: &OperationContext) -> RetryInfo {
        RetryInfo::no_retry()
    }

    fn fresh_copy(&self) -> Box<dyn RetryPolicy> {
        Box::new(NoRetry)
    }
}

/// Fixed-interval retry policy.
#[derive(Debug, Clone)]
pub struct LinearRetry {
    delta_backoff: Duration,
    common: CommonRetry,
}

impl LinearRetry {
    pub fn new(delta_backoff: Duration, max_attempts: usize) -> Self {
        Self { delta_backoff, common: CommonRetry::new(max_attempts) }
    }

    pub fn with_switch_backoff(mut self, switch_backoff: SwitchBackoff) -> Self {
        self.common.switch_backoff = switch_backoff;
        self
    }

    /// Substitute the clock used for interval alignment.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.common.clock = Arc::new(clock);
        self
    }
}

impl Default for LinearRetry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy for LinearRetry {
    fn evaluate(&mut self, retry_context: &RetryContext, _: &OperationContext) -> RetryInfo {
        let mut info = self.common.evaluate(retry_context);
        if info.should_retry() {
            self.common.apply_interval(&mut info, retry_context, self.delta_backoff);
        }
        info
    }

    fn fresh_copy(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self { delta_backoff: self.delta_backoff, common: self.common.fresh() })
    }
}

/// Exponential backoff retry policy with per-call jitter.
///
/// The interval before the `n`-th retry (0-based) is
/// `min(max_backoff, delta_backoff * (2^n - 1))` scaled by a factor drawn
/// uniformly from `[0.8, 1.2)` on every consultation.
#[derive(Debug, Clone)]
pub struct ExponentialRetry {
    delta_backoff: Duration,
    max_backoff: Duration,
    common: CommonRetry,
}

impl ExponentialRetry {
    pub fn new(delta_backoff: Duration, max_attempts: usize) -> Self {
        Self {
            delta_backoff,
            max_backoff: MAX_EXPONENTIAL_RETRY_INTERVAL,
            common: CommonRetry::new(max_attempts),
        }
    }

    /// Cap the computed interval (before jitter) at `max_backoff`.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_switch_backoff(mut self, switch_backoff: SwitchBackoff) -> Self {
        self.common.switch_backoff = switch_backoff;
        self
    }

    /// Substitute the clock used for interval alignment.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.common.clock = Arc::new(clock);
        self
    }
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy for ExponentialRetry {
    fn evaluate(&mut self, retry_context: &RetryContext, _: &OperationContext) -> RetryInfo {
        let mut info = self.common.evaluate(retry_context);
        if info.should_retry() {
            let interval = backoff::exponential_interval(
                self.delta_backoff,
                retry_context.current_retry_count(),
                self.max_backoff,
            );
            let jittered = backoff::apply_jitter(interval, backoff::jitter_factor());
            self.common.apply_interval(&mut info, retry_context, jittered);
        }
        info
    }

    fn fresh_copy(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self {
            delta_backoff: self.delta_backoff,
            max_backoff: self.max_backoff,
            common: self.common.fresh(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use bytes::Bytes;

    fn result(
        clock: &FakeClock,
        location: StorageLocation,
        status: Option<StatusCode>,
    ) -> RequestResult {
        let now = clock.utc_now();
        match status {
            Some(status) => {
                let response =
                    http::Response::builder().status(status).body(Bytes::new()).unwrap();
                RequestResult::from_response(now, now, location, &response)
            }
            None => RequestResult::no_response(now, now, location),
        }
    }

    fn context_for(
        clock: &FakeClock,
        retry_count: usize,
        location: StorageLocation,
        status: Option<StatusCode>,
        mode: LocationMode,
    ) -> RetryContext {
        RetryContext::new(
            retry_count,
            result(clock, location, status),
            mode.next_location(location),
            mode,
        )
    }

    #[test]
    fn no_retry_always_declines() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy = NoRetry;
        for count in [0, 1, 5, 100] {
            let ctx = context_for(
                &clock,
                count,
                StorageLocation::Primary,
                Some(StatusCode::INTERNAL_SERVER_ERROR),
                LocationMode::PrimaryOnly,
            );
            assert!(!policy.evaluate(&ctx, &op).should_retry());
        }
    }

    #[test]
    fn linear_retries_up_to_max_attempts_with_constant_interval() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            LinearRetry::new(Duration::from_secs(2), 4).with_clock(clock.clone());

        for count in 0..4 {
            let ctx = context_for(
                &clock,
                count,
                StorageLocation::Primary,
                Some(StatusCode::INTERNAL_SERVER_ERROR),
                LocationMode::PrimaryOnly,
            );
            let info = policy.evaluate(&ctx, &op);
            assert!(info.should_retry(), "retry {} should be allowed", count);
            assert_eq!(info.target_location(), StorageLocation::Primary);
            assert_eq!(info.updated_location_mode(), LocationMode::PrimaryOnly);
            assert_eq!(info.retry_interval(), Duration::from_secs(2));
        }

        let ctx = context_for(
            &clock,
            4,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::PrimaryOnly,
        );
        assert!(!policy.evaluate(&ctx, &op).should_retry());
    }

    #[test]
    fn alternating_mode_switches_immediately_then_waits_when_returning() {
        // primary_then_secondary with a 2s linear policy reproduces the
        // 0s / 2s / 0s / 2s cadence: hopping to the untouched replica is
        // free, coming back waits out the remainder of the interval.
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            LinearRetry::new(Duration::from_secs(2), 4).with_clock(clock.clone());
        let mode = LocationMode::PrimaryThenSecondary;

        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            mode,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.retry_interval(), Duration::ZERO);

        let ctx = context_for(
            &clock,
            1,
            StorageLocation::Secondary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            mode,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.target_location(), StorageLocation::Primary);
        assert_eq!(info.retry_interval(), Duration::from_secs(2));

        clock.advance(Duration::from_secs(2));
        let ctx = context_for(
            &clock,
            2,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            mode,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.retry_interval(), Duration::ZERO);

        let ctx = context_for(
            &clock,
            3,
            StorageLocation::Secondary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            mode,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.target_location(), StorageLocation::Primary);
        assert_eq!(info.retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn full_on_server_error_keeps_interval_across_switch() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy = LinearRetry::new(Duration::from_secs(2), 4)
            .with_clock(clock.clone())
            .with_switch_backoff(SwitchBackoff::FullOnServerError);

        // 500 on primary: the service itself is struggling, so switching to
        // the secondary still backs off in full.
        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::PrimaryThenSecondary,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.retry_interval(), Duration::from_secs(2));

        // 408 is a lighter failure: the switch stays immediate.
        let mut policy = LinearRetry::new(Duration::from_secs(2), 4)
            .with_clock(clock.clone())
            .with_switch_backoff(SwitchBackoff::FullOnServerError);
        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Primary,
            Some(StatusCode::REQUEST_TIMEOUT),
            LocationMode::PrimaryThenSecondary,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.retry_interval(), Duration::ZERO);
    }

    #[test]
    fn full_switch_backoff_never_aligns() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy = LinearRetry::new(Duration::from_secs(2), 4)
            .with_clock(clock.clone())
            .with_switch_backoff(SwitchBackoff::Full);

        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Primary,
            Some(StatusCode::REQUEST_TIMEOUT),
            LocationMode::PrimaryThenSecondary,
        );
        let info = policy.evaluate(&ctx, &op);
        assert_eq!(info.retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn client_errors_are_terminal() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        for status in [
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::CONFLICT,
            StatusCode::NOT_IMPLEMENTED,
            StatusCode::HTTP_VERSION_NOT_SUPPORTED,
        ] {
            let mut policy =
                LinearRetry::new(Duration::from_secs(1), 4).with_clock(clock.clone());
            let ctx = context_for(
                &clock,
                0,
                StorageLocation::Primary,
                Some(status),
                LocationMode::PrimaryOnly,
            );
            assert!(
                !policy.evaluate(&ctx, &op).should_retry(),
                "{} should not be retried",
                status
            );
        }
    }

    #[test]
    fn request_timeout_and_transport_failures_are_retryable() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            LinearRetry::new(Duration::from_secs(1), 4).with_clock(clock.clone());

        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Primary,
            Some(StatusCode::REQUEST_TIMEOUT),
            LocationMode::PrimaryOnly,
        );
        assert!(policy.evaluate(&ctx, &op).should_retry());

        let ctx = context_for(&clock, 1, StorageLocation::Primary, None, LocationMode::PrimaryOnly);
        assert!(policy.evaluate(&ctx, &op).should_retry());
    }

    #[test]
    fn secondary_not_found_downgrades_to_primary_only() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            LinearRetry::new(Duration::from_secs(2), 4).with_clock(clock.clone());

        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Secondary,
            Some(StatusCode::NOT_FOUND),
            LocationMode::PrimaryThenSecondary,
        );
        let info = policy.evaluate(&ctx, &op);
        assert!(info.should_retry());
        assert_eq!(info.target_location(), StorageLocation::Primary);
        assert_eq!(info.updated_location_mode(), LocationMode::PrimaryOnly);
    }

    #[test]
    fn secondary_not_found_in_secondary_only_mode_keeps_retrying_secondary() {
        // With no primary to fall back to, a lagging replica is simply
        // polled again.
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            LinearRetry::new(Duration::from_secs(2), 4).with_clock(clock.clone());

        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Secondary,
            Some(StatusCode::NOT_FOUND),
            LocationMode::SecondaryOnly,
        );
        let info = policy.evaluate(&ctx, &op);
        assert!(info.should_retry());
        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.updated_location_mode(), LocationMode::SecondaryOnly);
    }

    #[test]
    fn exponential_intervals_stay_in_the_jitter_envelope() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy =
            ExponentialRetry::new(Duration::from_secs(1), 8).with_clock(clock.clone());

        for count in 0..6 {
            let ctx = context_for(
                &clock,
                count,
                StorageLocation::Primary,
                Some(StatusCode::INTERNAL_SERVER_ERROR),
                LocationMode::PrimaryOnly,
            );
            let info = policy.evaluate(&ctx, &op);
            assert!(info.should_retry());
            let base = (2f64.powi(count as i32) - 1.0).max(0.0);
            let interval = info.retry_interval().as_secs_f64();
            assert!(
                interval >= base * 0.8 - 1e-9 && interval < base * 1.2 + 1e-9,
                "retry {}: interval {}s outside envelope around {}s",
                count,
                interval,
                base
            );
        }
    }

    #[test]
    fn exponential_interval_is_capped_before_jitter() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut policy = ExponentialRetry::new(Duration::from_secs(1), 64)
            .with_max_backoff(Duration::from_secs(10))
            .with_clock(clock.clone());

        let ctx = context_for(
            &clock,
            40,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::PrimaryOnly,
        );
        let info = policy.evaluate(&ctx, &op);
        assert!(info.retry_interval() < Duration::from_secs(12));
        assert!(info.retry_interval() >= Duration::from_secs(8));
    }

    #[test]
    fn fresh_copy_resets_per_operation_state() {
        let clock = FakeClock::default();
        let op = OperationContext::new();
        let mut seasoned =
            LinearRetry::new(Duration::from_secs(2), 4).with_clock(clock.clone());

        // Teach the seasoned policy that the secondary was attempted just now.
        let ctx = context_for(
            &clock,
            0,
            StorageLocation::Secondary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::SecondaryThenPrimary,
        );
        seasoned.evaluate(&ctx, &op);

        // A retry targeting the secondary: the seasoned policy aligns against
        // its recorded attempt, a fresh copy has never seen the secondary and
        // retries it immediately.
        let ctx = context_for(
            &clock,
            1,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::SecondaryThenPrimary,
        );
        let mut copy = seasoned.fresh_copy();
        assert_eq!(
            seasoned.evaluate(&ctx, &op).retry_interval(),
            Duration::from_secs(2)
        );
        assert_eq!(copy.evaluate(&ctx, &op).retry_interval(), Duration::ZERO);
    }

    #[test]
    fn retry_info_default_shapes() {
        let declined = RetryInfo::no_retry();
        assert!(!declined.should_retry());
        assert_eq!(declined.target_location(), StorageLocation::Unspecified);
        assert_eq!(declined.updated_location_mode(), LocationMode::Unspecified);
        assert_eq!(declined.retry_interval(), Duration::ZERO);

        let clock = FakeClock::default();
        let ctx = context_for(
            &clock,
            2,
            StorageLocation::Primary,
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            LocationMode::PrimaryThenSecondary,
        );
        let seeded = RetryInfo::retry(&ctx);
        assert!(seeded.should_retry());
        assert_eq!(seeded.target_location(), StorageLocation::Secondary);
        assert_eq!(seeded.updated_location_mode(), LocationMode::PrimaryThenSecondary);
        assert_eq!(seeded.retry_interval(), DEFAULT_RETRY_INTERVAL);
    }
}
