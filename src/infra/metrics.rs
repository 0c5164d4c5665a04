//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters only; never use them for coordination or logic
//! decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries for cycle duration (ms)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
const BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a cycle duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total poll cycles ever completed (monotonic)
    cycles_total: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Sum of cycle durations in milliseconds (reset on report)
    cycle_ms_sum: AtomicU64,
    /// Max cycle duration in milliseconds (reset on report)
    cycle_ms_max: AtomicU64,
    /// Cycle duration histogram buckets (reset on report)
    cycle_buckets: [AtomicU64; NUM_BUCKETS],
    /// Upstream fetches that failed (monotonic)
    fetch_errors_total: AtomicU64,
    /// Records normalized into canonical form (monotonic)
    records_normalized_total: AtomicU64,
    /// Payload elements dropped during normalization (monotonic)
    records_dropped_total: AtomicU64,
    /// Alert rows created (monotonic)
    alerts_created_total: AtomicU64,
    /// Alert inserts suppressed by the dedup window (monotonic)
    alerts_deduped_total: AtomicU64,
    /// Alert rows removed by the retention sweep (monotonic)
    alerts_pruned_total: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            cycle_ms_sum: AtomicU64::new(0),
            cycle_ms_max: AtomicU64::new(0),
            cycle_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            fetch_errors_total: AtomicU64::new(0),
            records_normalized_total: AtomicU64::new(0),
            records_dropped_total: AtomicU64::new(0),
            alerts_created_total: AtomicU64::new(0),
            alerts_deduped_total: AtomicU64::new(0),
            alerts_pruned_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed poll cycle with its duration (lock-free)
    #[inline]
    pub fn record_cycle(&self, duration_ms: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.cycle_ms_sum.fetch_add(duration_ms, Ordering::Relaxed);

        let bucket = bucket_index(duration_ms);
        self.cycle_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.cycle_ms_max, duration_ms);
    }

    /// Record a failed upstream fetch (lock-free)
    #[inline]
    pub fn record_fetch_error(&self) {
        self.fetch_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record normalized records from one section (lock-free)
    #[inline]
    pub fn record_normalized(&self, count: u64) {
        self.records_normalized_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Record dropped payload elements from one section (lock-free)
    #[inline]
    pub fn record_dropped(&self, count: u64) {
        self.records_dropped_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an alert row created (lock-free)
    #[inline]
    pub fn record_alert_created(&self) {
        self.alerts_created_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an alert insert suppressed by dedup (lock-free)
    #[inline]
    pub fn record_alert_deduped(&self) {
        self.alerts_deduped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record alert rows removed by retention (lock-free)
    #[inline]
    pub fn record_alerts_pruned(&self, count: u64) {
        self.alerts_pruned_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Get total cycles completed
    #[inline]
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    /// Get total fetch errors
    #[inline]
    pub fn fetch_errors_total(&self) -> u64 {
        self.fetch_errors_total.load(Ordering::Relaxed)
    }

    /// Read the monotonic counters without resetting anything. Used by
    /// the Prometheus endpoint so scrapes cannot interfere with the
    /// periodic logged report.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            fetch_errors_total: self.fetch_errors_total.load(Ordering::Relaxed),
            records_normalized_total: self.records_normalized_total.load(Ordering::Relaxed),
            records_dropped_total: self.records_dropped_total.load(Ordering::Relaxed),
            alerts_created_total: self.alerts_created_total.load(Ordering::Relaxed),
            alerts_deduped_total: self.alerts_deduped_total.load(Ordering::Relaxed),
            alerts_pruned_total: self.alerts_pruned_total.load(Ordering::Relaxed),
        }
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    /// Entity gauges are passed in by the caller from the store.
    pub fn report(&self, firefighters: usize, beacons_online: usize) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let cycle_count = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let cycle_sum = self.cycle_ms_sum.swap(0, Ordering::Relaxed);
        let cycle_max = self.cycle_ms_max.swap(0, Ordering::Relaxed);
        let cycle_buckets = swap_buckets(&self.cycle_buckets);

        // Monotonic counters (don't reset)
        let cycles_total = self.cycles_total.load(Ordering::Relaxed);
        let fetch_errors_total = self.fetch_errors_total.load(Ordering::Relaxed);
        let records_normalized_total = self.records_normalized_total.load(Ordering::Relaxed);
        let records_dropped_total = self.records_dropped_total.load(Ordering::Relaxed);
        let alerts_created_total = self.alerts_created_total.load(Ordering::Relaxed);
        let alerts_deduped_total = self.alerts_deduped_total.load(Ordering::Relaxed);
        let alerts_pruned_total = self.alerts_pruned_total.load(Ordering::Relaxed);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let cycles_per_sec = if elapsed.as_secs_f64() > 0.0 {
            cycle_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_cycle_ms = if cycle_count > 0 { cycle_sum / cycle_count } else { 0 };

        let cycle_p50_ms = percentile_from_buckets(&cycle_buckets, 0.50);
        let cycle_p95_ms = percentile_from_buckets(&cycle_buckets, 0.95);
        let cycle_p99_ms = percentile_from_buckets(&cycle_buckets, 0.99);

        MetricsSummary {
            cycles_total,
            cycles_per_sec,
            avg_cycle_ms,
            max_cycle_ms: cycle_max,
            cycle_buckets,
            cycle_p50_ms,
            cycle_p95_ms,
            cycle_p99_ms,
            fetch_errors_total,
            records_normalized_total,
            records_dropped_total,
            alerts_created_total,
            alerts_deduped_total,
            alerts_pruned_total,
            firefighters,
            beacons_online,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for the metrics endpoint)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Monotonic counter values at one instant. Reading one never resets
/// anything.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub fetch_errors_total: u64,
    pub records_normalized_total: u64,
    pub records_dropped_total: u64,
    pub alerts_created_total: u64,
    pub alerts_deduped_total: u64,
    pub alerts_pruned_total: u64,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub cycles_per_sec: f64,
    /// Average cycle duration since last report (ms)
    pub avg_cycle_ms: u64,
    /// Max cycle duration since last report (ms)
    pub max_cycle_ms: u64,
    /// Cycle duration histogram buckets
    /// Bounds: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800 ms
    pub cycle_buckets: [u64; NUM_BUCKETS],
    /// 50th percentile cycle duration (ms)
    pub cycle_p50_ms: u64,
    /// 95th percentile cycle duration (ms)
    pub cycle_p95_ms: u64,
    /// 99th percentile cycle duration (ms)
    pub cycle_p99_ms: u64,
    pub fetch_errors_total: u64,
    pub records_normalized_total: u64,
    pub records_dropped_total: u64,
    pub alerts_created_total: u64,
    pub alerts_deduped_total: u64,
    pub alerts_pruned_total: u64,
    /// Known firefighters (snapshot)
    pub firefighters: usize,
    /// Beacons currently online (snapshot)
    pub beacons_online: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_total,
            cycles_per_sec = format!("{:.2}", self.cycles_per_sec),
            avg_cycle_ms = %self.avg_cycle_ms,
            max_cycle_ms = %self.max_cycle_ms,
            p95_ms = %self.cycle_p95_ms,
            fetch_errors = %self.fetch_errors_total,
            normalized = %self.records_normalized_total,
            dropped = %self.records_dropped_total,
            alerts_created = %self.alerts_created_total,
            alerts_deduped = %self.alerts_deduped_total,
            firefighters = %self.firefighters,
            beacons_online = %self.beacons_online,
            "metrics"
        );
    }
}
