//! Deterministic Simulation Testing for the windowed sampler
//!
//! Shadow-state harness that drives a `WindowedSampler` on a simulated clock:
//! - Deterministic random values, label sets and clock steps
//! - Random forced flushes interleaved with natural window rollover
//! - Every emitted batch checked against an independent shadow model
//! - Conservation: every recorded value is emitted exactly once
//! - Seed-based reproducibility for debugging
//!
//! ## Design
//!
//! ```text
//! for seed in 0..100 {
//!     let mut harness = SamplerDSTHarness::new(SamplerDSTConfig::calm(seed));
//!     harness.run(500);
//!     harness.finish();            // final flush_now + conservation check
//!     assert!(harness.result().is_success());
//! }
//! ```
//!
//! The shadow keeps raw values per group and recomputes the summary from
//! scratch, so it does not share accumulation code with the sampler.

use super::bucket::Bucket;
use super::labels::Labels;
use super::window::{window_start, WindowedSampler};
use crate::clock::{Clock, SimulatedClock};
use ahash::AHashSet;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;

const OPS: [&str; 4] = ["read", "write", "scan", "delete"];

/// Configuration for sampler DST
#[derive(Debug, Clone)]
pub struct SamplerDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Window width of the sampler under test
    pub window_ms: u64,
    /// Largest clock step between operations
    pub max_step_ms: u64,
    /// Number of distinct label sets in play
    pub label_cardinality: usize,
    /// Probability that an operation is a forced flush instead of a record
    pub flush_prob: f64,
    /// Maximum operations per run
    pub max_operations: usize,
}

impl Default for SamplerDSTConfig {
    fn default() -> Self {
        SamplerDSTConfig {
            seed: 0,
            window_ms: 1_000,
            max_step_ms: 50,
            label_cardinality: 4,
            flush_prob: 0.0,
            max_operations: 500,
        }
    }
}

impl SamplerDSTConfig {
    /// Steady traffic, several records per window, no forced flushes
    pub fn calm(seed: u64) -> Self {
        SamplerDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Many groups, uneven steps, occasional forced flushes
    pub fn bursty(seed: u64) -> Self {
        SamplerDSTConfig {
            seed,
            window_ms: 1_000,
            max_step_ms: 400,
            label_cardinality: 16,
            flush_prob: 0.05,
            max_operations: 500,
        }
    }

    /// Steps often skip whole windows, frequent forced flushes
    pub fn sparse(seed: u64) -> Self {
        SamplerDSTConfig {
            seed,
            window_ms: 250,
            max_step_ms: 2_000,
            label_cardinality: 2,
            flush_prob: 0.2,
            max_operations: 500,
        }
    }
}

/// Result of a sampler DST run
#[derive(Debug, Clone)]
pub struct SamplerDSTResult {
    /// Seed used
    pub seed: u64,
    /// Total operations executed
    pub total_operations: u64,
    /// Values recorded
    pub records: u64,
    /// Explicit `flush_now` calls
    pub forced_flushes: u64,
    /// Batches received by the subscriber
    pub batches_emitted: u64,
    /// Buckets received across all batches
    pub buckets_emitted: u64,
    /// Sum of counts across all emitted buckets
    pub values_emitted: u64,
    /// Invariant violations found
    pub invariant_violations: Vec<String>,
}

impl SamplerDSTResult {
    pub fn new(seed: u64) -> Self {
        SamplerDSTResult {
            seed,
            total_operations: 0,
            records: 0,
            forced_flushes: 0,
            batches_emitted: 0,
            buckets_emitted: 0,
            values_emitted: 0,
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops, {} records, {} forced flushes, {} batches, {} buckets, {} violations",
            self.seed,
            self.total_operations,
            self.records,
            self.forced_flushes,
            self.batches_emitted,
            self.buckets_emitted,
            self.invariant_violations.len()
        )
    }
}

/// Expected state of one group in the shadow model
#[derive(Debug, Clone)]
struct ShadowGroup {
    labels: Labels,
    values: Vec<f64>,
    last_payload: u64,
}

/// DST harness for `WindowedSampler`
pub struct SamplerDSTHarness {
    config: SamplerDSTConfig,
    rng: ChaCha8Rng,
    clock: SimulatedClock,
    sampler: WindowedSampler<u64, SimulatedClock>,
    received: Arc<Mutex<Vec<Vec<Bucket<u64>>>>>,
    shadow_window_ms: u64,
    shadow_groups: Vec<ShadowGroup>,
    result: SamplerDSTResult,
}

impl SamplerDSTHarness {
    pub fn new(config: SamplerDSTConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        // Start somewhere inside the first thousand windows
        let start_ms = rng.gen_range(0..config.window_ms * 1_000);
        let clock = SimulatedClock::new(start_ms);

        let mut sampler =
            WindowedSampler::with_clock(Duration::from_millis(config.window_ms), clock.clone());
        let received: Arc<Mutex<Vec<Vec<Bucket<u64>>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        sampler.on_flush(move |buckets: &[Bucket<u64>]| sink.lock().push(buckets.to_vec()));

        SamplerDSTHarness {
            result: SamplerDSTResult::new(config.seed),
            config,
            rng,
            clock,
            sampler,
            received,
            shadow_window_ms: 0,
            shadow_groups: Vec::new(),
        }
    }

    /// Run random operations
    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations.min(self.config.max_operations) {
            let step = self.rng.gen_range(0..=self.config.max_step_ms);
            self.clock.advance(Duration::from_millis(step));

            if self.rng.gen_bool(self.config.flush_prob) {
                self.forced_flush();
            } else {
                self.record();
            }

            #[cfg(debug_assertions)]
            self.sampler.verify_invariants();

            self.result.total_operations += 1;
        }
    }

    /// Drain the sampler and check that every recorded value was emitted
    pub fn finish(&mut self) {
        self.forced_flush();

        if self.result.values_emitted != self.result.records {
            self.violation(format!(
                "{} values recorded but {} emitted",
                self.result.records, self.result.values_emitted
            ));
        }
    }

    pub fn result(&self) -> &SamplerDSTResult {
        &self.result
    }

    fn record(&mut self) {
        let value = self.rng.gen_range(-1_000.0..1_000.0);
        let labels = self.random_labels();
        let payload = self.result.total_operations;

        let ts = window_start(self.clock.now_ms(), self.config.window_ms);
        let expected = if ts != self.shadow_window_ms {
            self.take_shadow(ts)
        } else {
            Vec::new()
        };

        match self
            .shadow_groups
            .iter_mut()
            .find(|g| g.labels.key() == labels.key())
        {
            Some(group) => {
                group.values.push(value);
                group.last_payload = payload;
            }
            None => self.shadow_groups.push(ShadowGroup {
                labels: labels.clone(),
                values: vec![value],
                last_payload: payload,
            }),
        }

        self.sampler.record(value, labels, payload);
        self.result.records += 1;
        self.check_emitted(expected);
    }

    fn forced_flush(&mut self) {
        let ts = window_start(self.clock.now_ms(), self.config.window_ms);
        let expected = self.take_shadow(ts);

        self.sampler.flush_now();
        self.result.forced_flushes += 1;
        self.check_emitted(expected);
    }

    /// Close the shadow window, returning (window, groups) of what should be emitted
    fn take_shadow(&mut self, next_window_ms: u64) -> Vec<(u64, ShadowGroup)> {
        let closed = self.shadow_window_ms;
        self.shadow_window_ms = next_window_ms;
        std::mem::take(&mut self.shadow_groups)
            .into_iter()
            .map(|g| (closed, g))
            .collect()
    }

    /// Label pairs are shuffled so insertion order differs between calls
    fn random_labels(&mut self) -> Labels {
        let group = self.rng.gen_range(0..self.config.label_cardinality);
        let op = OPS[group % OPS.len()];
        let shard = (group / OPS.len()).to_string();

        if self.rng.gen_bool(0.5) {
            Labels::from_pairs(&[("op", op), ("shard", shard.as_str())])
        } else {
            Labels::from_pairs(&[("shard", shard.as_str()), ("op", op)])
        }
    }

    fn check_emitted(&mut self, expected: Vec<(u64, ShadowGroup)>) {
        let batches = std::mem::take(&mut *self.received.lock());

        if expected.is_empty() {
            if !batches.is_empty() {
                self.violation(format!(
                    "expected no flush but received {} batches",
                    batches.len()
                ));
            }
            return;
        }

        if batches.len() != 1 {
            self.violation(format!(
                "expected exactly one batch but received {}",
                batches.len()
            ));
            return;
        }
        let batch = &batches[0];
        self.result.batches_emitted += 1;
        self.result.buckets_emitted += batch.len() as u64;
        self.result.values_emitted += batch.iter().map(|b| b.stats.count).sum::<u64>();

        if batch.len() != expected.len() {
            self.violation(format!(
                "batch has {} buckets, expected {}",
                batch.len(),
                expected.len()
            ));
            return;
        }

        let mut seen = AHashSet::new();
        for (bucket, (window_ms, group)) in batch.iter().zip(expected.iter()) {
            if let Some(problem) = compare_bucket(bucket, *window_ms, group) {
                self.violation(problem);
            }
            if !seen.insert(bucket.labels.key()) {
                self.violation(format!("group '{}' emitted twice in one batch", bucket.labels));
            }
        }
    }

    fn violation(&mut self, message: String) {
        self.result.invariant_violations.push(format!(
            "seed {} op {} t={}: {}",
            self.config.seed,
            self.result.total_operations,
            self.clock.now_ms(),
            message
        ));
    }
}

fn compare_bucket(bucket: &Bucket<u64>, window_ms: u64, group: &ShadowGroup) -> Option<String> {
    let key = group.labels.key();
    if bucket.labels.key() != key {
        return Some(format!("bucket '{}' where '{}' expected", bucket.labels, key));
    }
    if bucket.timestamp_ms != window_ms {
        return Some(format!(
            "group '{}' stamped {} but belongs to window {}",
            key, bucket.timestamp_ms, window_ms
        ));
    }
    if bucket.payload != group.last_payload {
        return Some(format!(
            "group '{}' payload {} but last recorded was {}",
            key, bucket.payload, group.last_payload
        ));
    }

    let values = &group.values;
    let count = values.len() as u64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = values.iter().fold(0.0, |acc, v| acc + v);
    let sum_sq: f64 = values.iter().fold(0.0, |acc, v| acc + v * v);

    let stats = &bucket.stats;
    if stats.count != count
        || stats.min != min
        || stats.max != max
        || stats.sum != sum
        || stats.sum_sq != sum_sq
    {
        return Some(format!(
            "group '{}' stats {:?} differ from shadow \
             (count={}, min={}, max={}, sum={}, sum_sq={})",
            key, stats, count, min, max, sum, sum_sq
        ));
    }
    None
}

// =============================================================================
// Batch Runners
// =============================================================================

/// Run `count` seeds starting at `start_seed`
pub fn run_sampler_batch(
    start_seed: u64,
    count: u64,
    operations: usize,
    config_fn: fn(u64) -> SamplerDSTConfig,
) -> Vec<SamplerDSTResult> {
    (start_seed..start_seed + count)
        .map(|seed| {
            let mut harness = SamplerDSTHarness::new(config_fn(seed));
            harness.run(operations);
            harness.finish();
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_batch(results: &[SamplerDSTResult]) -> String {
    let passed = results.iter().filter(|r| r.is_success()).count();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_batches: u64 = results.iter().map(|r| r.batches_emitted).sum();

    let mut summary = format!(
        "{}/{} seeds passed, {} ops, {} batches",
        passed,
        results.len(),
        total_ops,
        total_batches
    );
    for failed in results.iter().filter(|r| !r.is_success()).take(5) {
        summary.push_str(&format!("\n  FAILED {}", failed.summary()));
        if let Some(first) = failed.invariant_violations.first() {
            summary.push_str(&format!("\n    {}", first));
        }
    }
    summary
}
