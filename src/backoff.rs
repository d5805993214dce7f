//! Retry interval computation.
//!
//! Intervals are computed deterministically here; the jitter factor that
//! spreads simultaneous retries across a fleet of clients is drawn separately
//! so the two can be tested in isolation. Attempt semantics: `retry_count` is
//! the 0-based count of retries already performed, so the first retry after
//! the initial attempt computes with `retry_count = 0`.
//!
//! Overflow behavior: computations that would overflow saturate at the
//! supplied cap instead of panicking.

use rand::Rng;
use std::time::Duration;

/// Interval used for a retry when the policy has nothing better to say.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Ceiling for exponentially growing retry intervals.
pub const MAX_EXPONENTIAL_RETRY_INTERVAL: Duration = Duration::from_secs(120);

/// Lower bound of the jitter factor applied to exponential intervals.
pub const MIN_JITTER_FACTOR: f64 = 0.8;

/// Upper bound (exclusive) of the jitter factor.
pub const MAX_JITTER_FACTOR: f64 = 1.2;

/// The deterministic part of the exponential schedule:
/// `min(max, delta * (2^retry_count - 1))`.
///
/// `retry_count = 0` yields zero; switching to a backoff wait only starts
/// once the same operation has failed more than once.
pub fn exponential_interval(delta: Duration, retry_count: usize, max: Duration) -> Duration {
    let exponent = retry_count.min(u32::MAX as usize) as u32;
    let multiplier = 2u128.saturating_pow(exponent).saturating_sub(1);
    let nanos = delta.as_nanos().saturating_mul(multiplier);
    let interval = Duration::from_nanos(nanos.min(max.as_nanos()) as u64);
    interval.min(max)
}

/// Draw a fresh jitter factor in `[0.8, 1.2)`.
///
/// Drawn once per policy consultation, never cached, so that many clients
/// retrying the same outage spread out instead of stampeding in lockstep.
pub fn jitter_factor() -> f64 {
    jitter_factor_with_rng(&mut rand::rng())
}

/// Draw a jitter factor from a caller-supplied RNG (for deterministic tests).
pub fn jitter_factor_with_rng<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(MIN_JITTER_FACTOR..MAX_JITTER_FACTOR)
}

/// Apply a jitter factor to an interval without risking overflow.
pub fn apply_jitter(interval: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor)
        .unwrap_or(MAX_EXPONENTIAL_RETRY_INTERVAL)
}
