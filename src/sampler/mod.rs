//! Windowed Measurement Sampling
//!
//! Aggregates a numeric measurable (e.g. the latency of one operation) by
//! label set and fixed-width time window, handing each closed window to
//! subscribers in one batch:
//!
//! - **Stats** for constant-space count/min/max/sum/sum-of-squares
//! - **Labels** with order-independent group identity
//! - **WindowedSampler** for lazy, clock-driven window rollover
//! - **SharedSampler** for recording from several threads
//!
//! Subscribers receive at most one batch per window rollover, plus one per
//! explicit `flush_now`, so the emission rate is bounded by the window width
//! rather than the measurement rate.

mod stats;
mod labels;
mod bucket;
mod window;
mod shared;
pub mod sampler_dst;

pub use stats::Stats;
pub use labels::Labels;
pub use bucket::Bucket;
pub use window::{window_start, SubscriptionId, WindowedSampler};
pub(crate) use window::duration_to_millis;
pub use shared::SharedSampler;
