//! Segmented listing: continuation tokens, result segments, and the lazy
//! iterator every `list_*` operation is built on.
//!
//! A listing service hands back at most one page per request plus an opaque
//! marker for the next page. [`ResultIterator`] turns a page-fetching closure
//! into a lazy sequence of items with three guarantees the storage protocol
//! needs:
//!
//! - an optional ceiling on the total number of items yielded;
//! - per-segment caps are requested, never exceeded;
//! - a failed page fetch surfaces to the consumer but does not lose the
//!   position — calling [`ResultIterator::next`] again retries the same page
//!   from the same token, so a listing survives transient faults without
//!   duplicating or dropping items.
//!
//! Tokens carry the target location of the segment they came from alongside
//! the service marker, so resuming a listing that was served by the
//! secondary does not silently hop to the primary mid-sequence.

use crate::error::Result;
use crate::location::StorageLocation;
use futures::future::BoxFuture;
use std::collections::VecDeque;

/// Opaque cursor returned by a paged listing operation.
///
/// An empty marker means the listing is complete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContinuationToken {
    next_marker: String,
    target_location: StorageLocation,
}

impl ContinuationToken {
    pub fn new(next_marker: impl Into<String>) -> Self {
        Self { next_marker: next_marker.into(), target_location: StorageLocation::Unspecified }
    }

    /// Pin the token to the location that produced it.
    pub fn with_target_location(mut self, location: StorageLocation) -> Self {
        self.target_location = location;
        self
    }

    pub fn next_marker(&self) -> &str {
        &self.next_marker
    }

    pub fn target_location(&self) -> StorageLocation {
        self.target_location
    }

    /// `true` when there is no further data to fetch.
    pub fn is_empty(&self) -> bool {
        self.next_marker.is_empty()
    }
}

/// One page of results plus the cursor to the next.
#[derive(Debug, Clone)]
pub struct ResultSegment<T> {
    results: Vec<T>,
    continuation_token: ContinuationToken,
}

impl<T> ResultSegment<T> {
    pub fn new(results: Vec<T>, continuation_token: ContinuationToken) -> Self {
        Self { results, continuation_token }
    }

    /// A terminal segment: the final results with nothing after them.
    pub fn finished(results: Vec<T>) -> Self {
        Self::new(results, ContinuationToken::default())
    }

    pub fn results(&self) -> &[T] {
        &self.results
    }

    pub fn continuation_token(&self) -> &ContinuationToken {
        &self.continuation_token
    }

    fn into_parts(self) -> (Vec<T>, ContinuationToken) {
        (self.results, self.continuation_token)
    }
}

/// Page-fetching callback: given the token to resume from and an optional
/// cap for this segment, produce the next [`ResultSegment`]. Backed by one
/// executor call per invocation in practice.
pub type SegmentGenerator<T> = Box<
    dyn FnMut(ContinuationToken, Option<usize>) -> BoxFuture<'static, Result<ResultSegment<T>>>
        + Send,
>;

/// Lazy, resumable sequence over a segmented listing.
pub struct ResultIterator<T> {
    generator: Option<SegmentGenerator<T>>,
    current: VecDeque<T>,
    token: ContinuationToken,
    started: bool,
    returned: u64,
    max_results: u64,
    max_results_per_segment: usize,
}

impl<T> ResultIterator<T> {
    /// Wrap `generator` into a lazy sequence.
    ///
    /// `max_results == 0` means unbounded; `max_results_per_segment == 0`
    /// leaves the page size to the service default.
    pub fn new(
        generator: SegmentGenerator<T>,
        max_results: u64,
        max_results_per_segment: usize,
    ) -> Self {
        Self {
            generator: Some(generator),
            current: VecDeque::new(),
            token: ContinuationToken::default(),
            started: false,
            returned: 0,
            max_results,
            max_results_per_segment,
        }
    }

    /// An already-exhausted sequence.
    pub fn empty() -> Self {
        Self {
            generator: None,
            current: VecDeque::new(),
            token: ContinuationToken::default(),
            started: true,
            returned: 0,
            max_results: 0,
            max_results_per_segment: 0,
        }
    }

    /// Number of items yielded so far.
    pub fn returned(&self) -> u64 {
        self.returned
    }

    /// The token a fresh fetch would resume from.
    pub fn continuation_token(&self) -> &ContinuationToken {
        &self.token
    }

    /// Yield the next item, fetching further segments as needed.
    ///
    /// Returns `None` once the sequence is exhausted or the `max_results`
    /// ceiling is reached. A fetch failure is returned as `Some(Err(_))`
    /// without advancing the position; the next call retries the same fetch.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.max_results > 0 && self.returned >= self.max_results {
            return None;
        }

        loop {
            if let Some(item) = self.current.pop_front() {
                self.returned += 1;
                return Some(Ok(item));
            }
            if self.started && self.token.is_empty() {
                return None;
            }
            let limit = self.next_fetch_limit();
            let generator = self.generator.as_mut()?;
            match generator(self.token.clone(), limit).await {
                Ok(segment) => {
                    self.started = true;
                    let (results, token) = segment.into_parts();
                    self.current = results.into();
                    self.token = token;
                    if self.current.is_empty() && self.token.is_empty() {
                        return None;
                    }
                    // An empty segment with a non-empty token is legal;
                    // keep fetching.
                }
                // Position unchanged: the caller can retry the same page.
                Err(error) => return Some(Err(error)),
            }
        }
    }

    /// Drain the remaining items into a `Vec`, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// How many items the next fetch should be asked for.
    fn next_fetch_limit(&self) -> Option<usize> {
        let per_segment =
            (self.max_results_per_segment > 0).then_some(self.max_results_per_segment);
        if self.max_results == 0 {
            return per_segment;
        }
        let left = self.max_results.saturating_sub(self.returned);
        let left = usize::try_from(left).unwrap_or(usize::MAX);
        Some(per_segment.map_or(left, |cap| left.min(cap)))
    }
}

impl<T> Default for ResultIterator<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for ResultIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIterator")
            .field("returned", &self.returned)
            .field("buffered", &self.current.len())
            .field("max_results", &self.max_results)
            .field("max_results_per_segment", &self.max_results_per_segment)
            .field("token", &self.token)
            .finish()
    }
}
