//! Sampler Integration Tests
//!
//! Tests the windowed sampler end to end, verifying:
//! - Per-group accumulation within one window
//! - Label order independence
//! - Window rollover emitting exactly one batch
//! - Forced flush draining without duplicates
//! - A clock stepping backward never re-emitting a window
//! - Merging flushed summaries across samplers

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use window_sampler::{
    Bucket, Labels, SamplerConfig, SharedSampler, SimulatedClock, Stats, WindowedSampler,
};

type Batches<P> = Arc<Mutex<Vec<Vec<Bucket<P>>>>>;

fn collecting_sampler<P: Clone + Send + 'static>(
    window_ms: u64,
    start_ms: u64,
) -> (WindowedSampler<P, SimulatedClock>, SimulatedClock, Batches<P>) {
    let clock = SimulatedClock::new(start_ms);
    let mut sampler =
        WindowedSampler::with_clock(Duration::from_millis(window_ms), clock.clone());
    let batches: Batches<P> = Arc::new(Mutex::new(Vec::new()));
    let sink = batches.clone();
    sampler.on_flush(move |buckets: &[Bucket<P>]| sink.lock().push(buckets.to_vec()));
    (sampler, clock, batches)
}

fn read_labels() -> Labels {
    Labels::from_pairs(&[("op", "read")])
}

// ============================================================================
// End-to-end Scenarios
// ============================================================================

#[test]
fn test_two_reads_then_flush_now() {
    let (mut sampler, clock, batches) = collecting_sampler::<Option<&str>>(1000, 100);

    sampler.record(10.0, read_labels(), Some("a"));
    clock.set(200);
    sampler.record(20.0, read_labels(), Some("b"));
    clock.set(300);
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![Bucket {
            timestamp_ms: 0,
            labels: read_labels(),
            payload: Some("b"),
            stats: Stats {
                count: 2,
                min: 10.0,
                max: 20.0,
                sum: 30.0,
                sum_sq: 500.0,
            },
        }]
    );
}

#[test]
fn test_record_after_flush_lands_in_new_window() {
    let (mut sampler, clock, batches) = collecting_sampler::<Option<&str>>(1000, 100);

    sampler.record(10.0, read_labels(), Some("a"));
    sampler.record(20.0, read_labels(), Some("b"));
    clock.set(300);
    sampler.flush_now();

    clock.set(1500);
    let write = Labels::from_pairs(&[("op", "write")]);
    sampler.record(5.0, write.clone(), None);
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].timestamp_ms, 1000);
    assert_eq!(batches[1][0].labels, write);
    assert_eq!(batches[1][0].payload, None);
    assert_eq!(batches[1][0].stats, Stats::from_value(5.0));
}

// ============================================================================
// Accumulation
// ============================================================================

#[test]
fn test_same_labels_accumulate_all_fields() {
    let (mut sampler, _clock, batches) = collecting_sampler::<usize>(60_000, 0);
    let values = [3.5, -2.0, 11.25, 0.0, 7.0];

    for (i, &v) in values.iter().enumerate() {
        sampler.record(v, read_labels(), i);
    }
    sampler.flush_now();

    let batches = batches.lock();
    let stats = &batches[0][0].stats;
    assert_eq!(stats.count, values.len() as u64);
    assert_eq!(stats.sum, values.iter().sum::<f64>());
    assert_eq!(stats.sum_sq, values.iter().map(|v| v * v).sum::<f64>());
    assert_eq!(stats.min, -2.0);
    assert_eq!(stats.max, 11.25);
    assert_eq!(batches[0][0].payload, values.len() - 1);
}

#[test]
fn test_label_order_does_not_split_groups() {
    let (mut sampler, _clock, batches) = collecting_sampler::<&str>(1000, 0);

    sampler.record(1.0, Labels::from_pairs(&[("a", "1"), ("b", "2")]), "d");
    sampler.record(1.0, Labels::from_pairs(&[("b", "2"), ("a", "1")]), "d");
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].stats.count, 2);
}

#[test]
fn test_different_label_values_are_different_groups() {
    let (mut sampler, _clock, batches) = collecting_sampler::<()>(1000, 0);

    sampler.record(1.0, Labels::from_pairs(&[("host", "web01")]), ());
    sampler.record(2.0, Labels::from_pairs(&[("host", "web02")]), ());
    sampler.record(3.0, Labels::from_pairs(&[("host", "web01"), ("op", "read")]), ());
    sampler.flush_now();

    assert_eq!(batches.lock()[0].len(), 3);
}

#[test]
fn test_separator_characters_do_not_merge_groups() {
    let (mut sampler, _clock, batches) = collecting_sampler::<u32>(1000, 0);
    let first = Labels::from_pairs(&[("a", "p,b=q"), ("b", "r")]);
    let second = Labels::from_pairs(&[("a", "p"), ("b", "q,b=r")]);

    sampler.record(1.0, first.clone(), 1);
    sampler.record(5.0, second.clone(), 2);
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].labels, first);
    assert_eq!(batch[0].stats.count, 1);
    assert_eq!(batch[0].stats.sum, 1.0);
    assert_eq!(batch[1].labels, second);
    assert_eq!(batch[1].stats.count, 1);
    assert_eq!(batch[1].stats.sum, 5.0);
}

#[test]
fn test_nan_poisons_only_its_group() {
    let (mut sampler, _clock, batches) = collecting_sampler::<()>(1000, 0);
    let bad = Labels::from_pairs(&[("op", "bad")]);

    sampler.record(1.0, bad.clone(), ());
    sampler.record(f64::NAN, bad.clone(), ());
    sampler.record(2.0, bad, ());
    sampler.record(4.0, read_labels(), ());
    sampler.flush_now();

    let batches = batches.lock();
    let poisoned = &batches[0][0].stats;
    assert_eq!(poisoned.count, 3);
    assert!(poisoned.min.is_nan() && poisoned.max.is_nan() && poisoned.sum.is_nan());

    let clean = &batches[0][1].stats;
    assert_eq!(clean.min, 4.0);
}

// ============================================================================
// Window Rollover
// ============================================================================

#[test]
fn test_rollover_emits_exactly_once_between_windows() {
    let (mut sampler, clock, batches) = collecting_sampler::<u32>(1000, 400);
    let early = Labels::from_pairs(&[("phase", "early")]);
    let late = Labels::from_pairs(&[("phase", "late")]);

    sampler.record(1.0, early.clone(), 1);
    sampler.record(2.0, early.clone(), 2);
    clock.set(1200);
    sampler.record(3.0, late.clone(), 3);

    {
        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].labels, early);
        assert_eq!(batches[0][0].timestamp_ms, 0);
    }

    sampler.flush_now();
    let batches = batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].labels, late);
    assert_eq!(batches[1][0].timestamp_ms, 1000);
}

#[test]
fn test_idle_windows_emit_nothing() {
    let (mut sampler, clock, batches) = collecting_sampler::<()>(1000, 0);

    sampler.record(1.0, read_labels(), ());
    clock.set(10_500);
    assert!(batches.lock().is_empty());

    // The skipped windows never had groups, so only one batch comes out
    sampler.record(1.0, read_labels(), ());
    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].timestamp_ms, 0);
}

#[test]
fn test_emission_rate_bounded_by_window() {
    let (mut sampler, clock, batches) = collecting_sampler::<()>(1000, 0);

    // 10 windows, 100 records each
    for ms in 0..10_000u64 {
        clock.set(ms);
        if ms % 10 == 0 {
            sampler.record(ms as f64, read_labels(), ());
        }
    }
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 10);
    for (i, batch) in batches.iter().enumerate() {
        assert_eq!(batch[0].timestamp_ms, i as u64 * 1000);
        assert_eq!(batch[0].stats.count, 100);
    }
}

#[test]
fn test_clock_stepping_back_does_not_emit_window_twice() {
    let (mut sampler, clock, batches) = collecting_sampler::<()>(1000, 1_500);

    sampler.record(1.0, read_labels(), ());
    clock.set(200);
    sampler.record(2.0, read_labels(), ());
    assert!(batches.lock().is_empty());

    clock.set(1_900);
    sampler.record(3.0, read_labels(), ());
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].timestamp_ms, 1_000);
    assert_eq!(batches[0][0].stats.count, 3);
}

// ============================================================================
// Forced Flush
// ============================================================================

#[test]
fn test_double_flush_now_does_not_duplicate() {
    let (mut sampler, _clock, batches) = collecting_sampler::<()>(1000, 0);

    sampler.record(1.0, read_labels(), ());
    sampler.flush_now();
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 1);
}

#[test]
fn test_flush_now_on_fresh_sampler_emits_nothing() {
    let (mut sampler, _clock, batches) = collecting_sampler::<()>(1000, 12_345);
    sampler.flush_now();
    assert!(batches.lock().is_empty());
}

#[test]
fn test_records_after_forced_flush_keep_window_timestamp() {
    let (mut sampler, clock, batches) = collecting_sampler::<()>(1000, 2_100);

    sampler.record(1.0, read_labels(), ());
    sampler.flush_now();
    clock.set(2_900);
    sampler.record(2.0, read_labels(), ());
    sampler.flush_now();

    let batches = batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].timestamp_ms, 2_000);
    assert_eq!(batches[1][0].timestamp_ms, 2_000);
    assert_eq!(batches[1][0].stats.sum, 2.0);
}

// ============================================================================
// Subscribers
// ============================================================================

#[test]
fn test_subscribers_called_in_registration_order() {
    let clock = SimulatedClock::new(0);
    let mut sampler: WindowedSampler<(), SimulatedClock> =
        WindowedSampler::with_clock(Duration::from_secs(1), clock);
    let calls = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let calls = calls.clone();
        sampler.on_flush(move |buckets: &[Bucket<()>]| calls.lock().push((name, buckets.len())));
    }

    sampler.record(1.0, read_labels(), ());
    sampler.record(1.0, Labels::empty(), ());
    sampler.flush_now();

    assert_eq!(
        *calls.lock(),
        vec![("first", 2), ("second", 2), ("third", 2)]
    );
}

// ============================================================================
// Merging Across Samplers
// ============================================================================

#[test]
fn test_merge_flushed_buckets_across_samplers() {
    let (mut a, _clock_a, batches_a) = collecting_sampler::<()>(1000, 0);
    let (mut b, _clock_b, batches_b) = collecting_sampler::<()>(1000, 0);

    for v in [1.0, 2.0, 3.0] {
        a.record(v, read_labels(), ());
    }
    for v in [10.0, -4.0] {
        b.record(v, read_labels(), ());
    }
    a.flush_now();
    b.flush_now();

    let batches_a = batches_a.lock();
    let batches_b = batches_b.lock();
    let merged = Stats::merge_all([&batches_a[0][0].stats, &batches_b[0][0].stats]);

    let mut direct = Stats::empty();
    for v in [1.0, 2.0, 3.0, 10.0, -4.0] {
        direct.add(v);
    }
    assert_eq!(merged, direct);
}

// ============================================================================
// Configuration and Sharing
// ============================================================================

#[test]
fn test_sampler_from_config() {
    let config = SamplerConfig::from_toml_str("window_ms = 250").unwrap();
    let clock = SimulatedClock::new(0);
    let sampler: WindowedSampler<(), SimulatedClock> =
        WindowedSampler::from_config(&config, clock).unwrap();
    assert_eq!(sampler.window(), Duration::from_millis(250));
}

#[test]
fn test_default_window_is_one_minute() {
    let sampler: WindowedSampler<()> = WindowedSampler::new(SamplerConfig::default().window);
    assert_eq!(sampler.window(), Duration::from_secs(60));
}

#[test]
fn test_shared_sampler_bucket_serializes_to_json() {
    let clock = SimulatedClock::new(0);
    let sampler: SharedSampler<String, SimulatedClock> =
        SharedSampler::from_sampler(WindowedSampler::with_clock(Duration::from_secs(1), clock));
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    sampler.on_flush(move |buckets: &[Bucket<String>]| {
        for bucket in buckets {
            sink.lock().push(serde_json::to_value(bucket).unwrap());
        }
    });

    sampler.record(2.0, read_labels(), "req-1".to_string());
    sampler.flush_now();

    let lines = lines.lock();
    assert_eq!(
        lines[0],
        serde_json::json!({
            "timestamp_ms": 0,
            "labels": {"op": "read"},
            "payload": "req-1",
            "stats": {"count": 1, "min": 2.0, "max": 2.0, "sum": 2.0, "sum_sq": 4.0}
        })
    );
}
