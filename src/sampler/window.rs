//! Windowed sampler
//!
//! Aggregates values per label group within fixed-width, wall-clock-aligned
//! windows. Window boundaries are detected lazily: every `record` checks the
//! clock first, and if a new window has started, everything accumulated in
//! the previous window is handed to the flush subscribers before the value is
//! recorded. There is no timer, so an idle sampler never emits.
//!
//! ```text
//! record(v) ──► ts = floor(now / width) * width
//!                 │
//!                 ├─ ts != current ──► flush: emit buckets, clear, current = ts
//!                 │
//!                 └─► group(labels).add(v)
//! ```
//!
//! Subscribers therefore receive at most one batch per window rollover, plus
//! one per `flush_now` call, however many values are recorded. Call
//! `flush_now` on shutdown to drain the partially filled window.
//!
//! The current window never moves backward: if the clock steps back, values
//! keep landing in the window already current.

use super::bucket::Bucket;
use super::labels::Labels;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, SamplerConfig};
use ahash::AHashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Handle returned by `on_flush`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type FlushHandler<P> = Box<dyn FnMut(&[Bucket<P>]) + Send + 'static>;

/// Aggregates one measurable quantity into per-window, per-label buckets
pub struct WindowedSampler<P, C: Clock = SystemClock> {
    window_ms: u64,
    clock: C,
    /// Start of the window currently being filled
    current_window_ms: u64,
    /// Groups of the current window, in creation order
    buckets: Vec<Bucket<P>>,
    /// Group key -> index into `buckets`
    index: AHashMap<String, usize>,
    subscribers: Vec<(SubscriptionId, FlushHandler<P>)>,
    next_subscription: u64,
}

impl<P> WindowedSampler<P, SystemClock> {
    /// Create a sampler on the system clock
    ///
    /// # Panics
    ///
    /// Panics if `window` is shorter than one millisecond.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, SystemClock)
    }
}

impl<P, C: Clock> WindowedSampler<P, C> {
    /// Create a sampler reading time from `clock`
    ///
    /// # Panics
    ///
    /// Panics if `window` is shorter than one millisecond.
    pub fn with_clock(window: Duration, clock: C) -> Self {
        let window_ms = duration_to_millis(window);
        assert!(window_ms > 0, "window width must be at least 1ms");

        WindowedSampler {
            window_ms,
            clock,
            current_window_ms: 0,
            buckets: Vec::new(),
            index: AHashMap::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn from_config(config: &SamplerConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_clock(config.window, clock))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Register a handler receiving every flushed batch
    ///
    /// Handlers run synchronously inside `record`/`flush_now`, in
    /// registration order, each seeing the full batch.
    pub fn on_flush<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&[Bucket<P>]) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Record a value for the group identified by `labels`
    ///
    /// If the clock has moved into a new window, the previous window is
    /// flushed first. The payload replaces the group's stored payload.
    pub fn record(&mut self, value: f64, labels: Labels, payload: P) {
        self.flush(false);

        if let Some(&idx) = self.index.get(labels.key()) {
            self.buckets[idx].record(value, payload);
        } else {
            trace!(
                window_ms = self.current_window_ms,
                labels = %labels,
                "new sampler group"
            );
            self.index.insert(labels.key().to_string(), self.buckets.len());
            self.buckets
                .push(Bucket::new(self.current_window_ms, labels, payload, value));
        }

        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// Emit everything accumulated so far, regardless of elapsed time
    ///
    /// Calling it twice in a row emits nothing the second time.
    pub fn flush_now(&mut self) {
        self.flush(true);
    }

    fn flush(&mut self, force: bool) {
        // A clock stepping backward stays in the current window
        let ts = window_start(self.clock.now_ms(), self.window_ms).max(self.current_window_ms);
        if !force && ts == self.current_window_ms {
            return;
        }

        let closed_window_ms = self.current_window_ms;
        self.current_window_ms = ts;
        self.index.clear();
        let buckets = std::mem::take(&mut self.buckets);

        if buckets.is_empty() {
            trace!(window_ms = ts, force, "sampler flush skipped, no groups");
            return;
        }

        debug!(
            closed_window_ms,
            window_ms = ts,
            buckets = buckets.len(),
            subscribers = self.subscribers.len(),
            force,
            "flushing sampler window"
        );
        for (_, handler) in self.subscribers.iter_mut() {
            handler(buckets.as_slice());
        }
    }

    /// Verify all invariants hold for this sampler
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        // Invariant 1: index and bucket list describe the same groups
        debug_assert_eq!(
            self.index.len(),
            self.buckets.len(),
            "Invariant violated: {} indexed keys for {} buckets",
            self.index.len(),
            self.buckets.len()
        );

        // Invariant 2: current window is aligned to the window width
        debug_assert_eq!(
            self.current_window_ms % self.window_ms,
            0,
            "Invariant violated: window start {} not aligned to {}ms",
            self.current_window_ms,
            self.window_ms
        );

        for (key, &idx) in &self.index {
            let bucket = &self.buckets[idx];

            // Invariant 3: each group lives in the bucket its key points to
            debug_assert_eq!(
                bucket.labels.key(),
                key.as_str(),
                "Invariant violated: index key '{}' points at group '{}'",
                key,
                bucket.labels.key()
            );

            // Invariant 4: all groups belong to the current window
            debug_assert_eq!(
                bucket.timestamp_ms, self.current_window_ms,
                "Invariant violated: group '{}' has window {} but current is {}",
                key, bucket.timestamp_ms, self.current_window_ms
            );

            // Invariant 5: groups exist only alongside their first value
            debug_assert!(
                bucket.stats.count > 0,
                "Invariant violated: group '{}' has zero observations",
                key
            );

            // Invariant 6: min <= max unless NaN-poisoned
            let stats = &bucket.stats;
            debug_assert!(
                stats.min.is_nan() || stats.max.is_nan() || stats.min <= stats.max,
                "Invariant violated: group '{}' has min {} > max {}",
                key,
                stats.min,
                stats.max
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}
}

impl<P, C: Clock> std::fmt::Debug for WindowedSampler<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedSampler")
            .field("window_ms", &self.window_ms)
            .field("current_window_ms", &self.current_window_ms)
            .field("groups", &self.buckets.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`
pub(crate) fn duration_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Start of the window containing `now_ms`
#[inline]
pub fn window_start(now_ms: u64, window_ms: u64) -> u64 {
    now_ms / window_ms * window_ms
}
