use super::labels::Labels;
use super::stats::Stats;
use serde::Serialize;

/// Accumulated stats of one label group within one window
///
/// Buckets only leave the sampler through a flush, so a subscriber always
/// sees a group whose window has closed (or was drained by `flush_now`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket<P> {
    /// Start of the window, in milliseconds
    pub timestamp_ms: u64,
    pub labels: Labels,
    /// Payload from the most recent `record` call for this group
    pub payload: P,
    pub stats: Stats,
}

impl<P> Bucket<P> {
    pub(crate) fn new(timestamp_ms: u64, labels: Labels, payload: P, value: f64) -> Self {
        Bucket {
            timestamp_ms,
            labels,
            payload,
            stats: Stats::from_value(value),
        }
    }

    pub(crate) fn record(&mut self, value: f64, payload: P) {
        self.stats.add(value);
        self.payload = payload;
    }
}
