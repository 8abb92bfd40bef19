//! Demonstrates window rollover on a simulated clock.
//!
//! Run with: `SAMPLER_WINDOW_MS=1000 RUST_LOG=debug cargo run --bin sampler-demo`
//!
//! Each flushed bucket is printed as one JSON line.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use window_sampler::{
    Bucket, Clock, Labels, SamplerConfig, SimulatedClock, SystemClock, WindowedSampler,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SamplerConfig::from_env();
    let clock = SimulatedClock::new(SystemClock.now_ms());
    let mut sampler: WindowedSampler<String, SimulatedClock> =
        WindowedSampler::from_config(&config, clock.clone())?;

    sampler.on_flush(|buckets: &[Bucket<String>]| {
        for bucket in buckets {
            match serde_json::to_string(bucket) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("failed to encode bucket: {}", e),
            }
        }
    });

    info!(window_ms = config.window_ms(), "sampling synthetic request latencies");

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let step = Duration::from_millis((config.window_ms() / 4).max(1));
    for request in 0..12u32 {
        let op = if rng.gen_bool(0.7) { "read" } else { "write" };
        let latency_ms = rng.gen_range(1.0..250.0);
        let labels = Labels::from_pairs(&[("op", op), ("service", "demo")]);

        sampler.record(latency_ms, labels, format!("req-{}", request));
        clock.advance(step);
    }

    sampler.flush_now();
    Ok(())
}
