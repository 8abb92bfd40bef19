//! Streaming summary statistics
//!
//! `Stats` keeps count, min, max, sum and sum of squares of a value stream in
//! constant space. Summaries merge associatively and commutatively, with
//! `Stats::empty()` as the identity, so buckets flushed by different samplers
//! (or processes) can be combined in any order.
//!
//! ## NaN handling
//!
//! `min` and `max` propagate NaN: once a NaN has been added or merged, both
//! stay NaN for the life of the accumulator. `sum` and `sum_sq` follow plain
//! IEEE754 arithmetic. Infinities are ordinary ordered values.

use serde::{Deserialize, Serialize};

/// Running aggregation of a stream of numeric values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sum_sq: f64,
}

impl Stats {
    /// Accumulator with no observations (the merge identity)
    pub fn empty() -> Self {
        Stats {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Accumulator seeded with a single observation
    pub fn from_value(value: f64) -> Self {
        Stats {
            count: 1,
            min: value,
            max: value,
            sum: value,
            sum_sq: value * value,
        }
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = nan_min(self.min, value);
        self.max = nan_max(self.max, value);
    }

    pub fn merge(&mut self, other: &Stats) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = nan_min(self.min, other.min);
        self.max = nan_max(self.max, other.max);
    }

    /// Fold any number of summaries into one, starting from `empty()`
    pub fn merge_all<'a, I>(stats: I) -> Stats
    where
        I: IntoIterator<Item = &'a Stats>,
    {
        stats.into_iter().fold(Stats::empty(), |mut acc, s| {
            acc.merge(s);
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    /// Population variance, derived from the sum of squares
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        // Cancellation can push a true zero slightly negative
        Some(if variance < 0.0 { 0.0 } else { variance })
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::empty()
    }
}

#[inline]
fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

#[inline]
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}
