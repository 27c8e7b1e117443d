//! Metrics for signature-set registry operations.
//!
//! Counts, cumulative latencies and rolling percentiles for create, get,
//! list and delete, plus counters for the two outcomes operators alert on:
//! timestamp conflicts and not-found lookups (revoked or unknown keys).
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use tessera_storage::auth::{RegistryErrorKind, RegistryMetrics};
//!
//! let metrics = RegistryMetrics::new();
//! metrics.record_get(Duration::from_micros(150));
//! metrics.record_error(RegistryErrorKind::NotFound);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.get_count, 1);
//! assert_eq!(snapshot.get_percentiles.p50, 150);
//! assert_eq!(snapshot.error_not_found, 1);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::error::StorageError;

/// Number of latency samples retained per operation type.
const HISTOGRAM_WINDOW_SIZE: usize = 1024;

/// Latency percentiles for one operation type, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// Median latency.
    pub p50: u64,
    /// 95th percentile latency.
    pub p95: u64,
    /// 99th percentile latency.
    pub p99: u64,
}

/// Bounded ring of the most recent latency samples.
struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

struct HistogramInner {
    buf: Vec<u64>,
    pos: usize,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buf: Vec::with_capacity(HISTOGRAM_WINDOW_SIZE),
                pos: 0,
            }),
        }
    }

    fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < HISTOGRAM_WINDOW_SIZE {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % HISTOGRAM_WINDOW_SIZE;
    }

    fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted = self.inner.lock().buf.clone();
        if sorted.is_empty() {
            return LatencyPercentiles::default();
        }
        sorted.sort_unstable();
        let at = |p: usize| sorted[(sorted.len() * p).div_ceil(100).saturating_sub(1)];
        LatencyPercentiles { p50: at(50), p95: at(95), p99: at(99) }
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.buf.clear();
        inner.pos = 0;
    }
}

/// Error categories tracked by [`RegistryMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// Signature set, application, permission or user did not exist.
    NotFound,
    /// A create did not advance past the application's high-water mark.
    Conflict,
    /// Anything else.
    Other,
}

impl From<&StorageError> for RegistryErrorKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound,
            StorageError::Conflict { .. } => Self::Conflict,
            _ => Self::Other,
        }
    }
}

/// Point-in-time copy of [`RegistryMetrics`].
#[derive(Debug, Clone, Default)]
pub struct RegistryMetricsSnapshot {
    /// Signature sets created.
    pub create_count: u64,
    /// Single-set lookups.
    pub get_count: u64,
    /// Timestamp listings.
    pub list_count: u64,
    /// Delete requests, including no-op deletes.
    pub delete_count: u64,
    /// Cumulative create latency in microseconds.
    pub create_latency_us: u64,
    /// Cumulative get latency in microseconds.
    pub get_latency_us: u64,
    /// Cumulative list latency in microseconds.
    pub list_latency_us: u64,
    /// Cumulative delete latency in microseconds.
    pub delete_latency_us: u64,
    /// Create latency percentiles.
    pub create_percentiles: LatencyPercentiles,
    /// Get latency percentiles.
    pub get_percentiles: LatencyPercentiles,
    /// List latency percentiles.
    pub list_percentiles: LatencyPercentiles,
    /// Delete latency percentiles.
    pub delete_percentiles: LatencyPercentiles,
    /// Not-found results.
    pub error_not_found: u64,
    /// Timestamp conflicts, counted per attempt.
    pub error_conflict: u64,
    /// Other failures.
    pub error_other: u64,
}

impl RegistryMetricsSnapshot {
    /// Total number of recorded operations.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.create_count + self.get_count + self.list_count + self.delete_count
    }

    /// Total number of recorded errors.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.error_not_found + self.error_conflict + self.error_other
    }

    /// Errors as a fraction of operations (0.0 when idle).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 { 0.0 } else { self.total_errors() as f64 / total as f64 }
    }

    /// Average create latency in microseconds.
    #[must_use]
    pub fn avg_create_latency_us(&self) -> f64 {
        average(self.create_latency_us, self.create_count)
    }

    /// Average get latency in microseconds.
    #[must_use]
    pub fn avg_get_latency_us(&self) -> f64 {
        average(self.get_latency_us, self.get_count)
    }
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total as f64 / count as f64 }
}

struct Counter {
    count: AtomicU64,
    latency_us: AtomicU64,
    histogram: LatencyHistogram,
}

impl Counter {
    fn new() -> Self {
        Self { count: AtomicU64::new(0), latency_us: AtomicU64::new(0), histogram: LatencyHistogram::new() }
    }

    fn record(&self, duration: Duration) {
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(us, Ordering::Relaxed);
        self.histogram.record(us);
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.latency_us.store(0, Ordering::Relaxed);
        self.histogram.reset();
    }
}

struct RegistryMetricsInner {
    create: Counter,
    get: Counter,
    list: Counter,
    delete: Counter,
    error_not_found: AtomicU64,
    error_conflict: AtomicU64,
    error_other: AtomicU64,
}

/// Thread-safe metrics collector for the signature-set registry.
///
/// Cloning is cheap and clones share counters.
#[derive(Clone)]
pub struct RegistryMetrics {
    inner: Arc<RegistryMetricsInner>,
}

impl RegistryMetrics {
    /// Creates a collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryMetricsInner {
                create: Counter::new(),
                get: Counter::new(),
                list: Counter::new(),
                delete: Counter::new(),
                error_not_found: AtomicU64::new(0),
                error_conflict: AtomicU64::new(0),
                error_other: AtomicU64::new(0),
            }),
        }
    }

    /// Records a completed create.
    pub fn record_create(&self, duration: Duration) {
        self.inner.create.record(duration);
    }

    /// Records a completed get.
    pub fn record_get(&self, duration: Duration) {
        self.inner.get.record(duration);
    }

    /// Records a completed list.
    pub fn record_list(&self, duration: Duration) {
        self.inner.list.record(duration);
    }

    /// Records a completed delete.
    pub fn record_delete(&self, duration: Duration) {
        self.inner.delete.record(duration);
    }

    /// Records an error by category.
    pub fn record_error(&self, kind: RegistryErrorKind) {
        let counter = match kind {
            RegistryErrorKind::NotFound => &self.inner.error_not_found,
            RegistryErrorKind::Conflict => &self.inner.error_conflict,
            RegistryErrorKind::Other => &self.inner.error_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot including percentiles.
    #[must_use]
    pub fn snapshot(&self) -> RegistryMetricsSnapshot {
        let i = &self.inner;
        RegistryMetricsSnapshot {
            create_count: i.create.count.load(Ordering::Relaxed),
            get_count: i.get.count.load(Ordering::Relaxed),
            list_count: i.list.count.load(Ordering::Relaxed),
            delete_count: i.delete.count.load(Ordering::Relaxed),
            create_latency_us: i.create.latency_us.load(Ordering::Relaxed),
            get_latency_us: i.get.latency_us.load(Ordering::Relaxed),
            list_latency_us: i.list.latency_us.load(Ordering::Relaxed),
            delete_latency_us: i.delete.latency_us.load(Ordering::Relaxed),
            create_percentiles: i.create.histogram.percentiles(),
            get_percentiles: i.get.histogram.percentiles(),
            list_percentiles: i.list.histogram.percentiles(),
            delete_percentiles: i.delete.histogram.percentiles(),
            error_not_found: i.error_not_found.load(Ordering::Relaxed),
            error_conflict: i.error_conflict.load(Ordering::Relaxed),
            error_other: i.error_other.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter and histogram to zero.
    pub fn reset(&self) {
        self.inner.create.reset();
        self.inner.get.reset();
        self.inner.list.reset();
        self.inner.delete.reset();
        self.inner.error_not_found.store(0, Ordering::Relaxed);
        self.inner.error_conflict.store(0, Ordering::Relaxed);
        self.inner.error_other.store(0, Ordering::Relaxed);
    }

    /// Logs the current snapshot at INFO level. Does nothing when idle.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        if snapshot.total_operations() == 0 {
            return;
        }
        tracing::info!(
            create_count = snapshot.create_count,
            get_count = snapshot.get_count,
            list_count = snapshot.list_count,
            delete_count = snapshot.delete_count,
            total_errors = snapshot.total_errors(),
            error_not_found = snapshot.error_not_found,
            error_conflict = snapshot.error_conflict,
            error_rate = format!("{:.2}%", snapshot.error_rate() * 100.0),
            avg_create_latency_us = format!("{:.1}", snapshot.avg_create_latency_us()),
            avg_get_latency_us = format!("{:.1}", snapshot.avg_get_latency_us()),
            get_p99 = snapshot.get_percentiles.p99,
            create_p99 = snapshot.create_percentiles.p99,
            "signature_set_registry_metrics"
        );
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryMetrics").field("snapshot", &self.snapshot()).finish()
    }
}
