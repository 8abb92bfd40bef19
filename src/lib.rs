pub mod clock;
pub mod config;
pub mod sampler;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::{ConfigError, SamplerConfig};
pub use sampler::{Bucket, Labels, SharedSampler, Stats, SubscriptionId, WindowedSampler};
