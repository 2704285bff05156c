//! Per-device counters and launch latency.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One hour in nanoseconds.
const MAX_TRACKED_LATENCY_NS: u64 = 3_600_000_000_000;

#[derive(Debug)]
pub struct DeviceMetrics {
    kernel_launches: AtomicU64,
    batches_executed: AtomicU64,
    work_items_executed: AtomicU64,
    bytes_copied: AtomicU64,
    bytes_filled: AtomicU64,
    buffers_allocated: AtomicU64,

    // None only if hdrhistogram rejects the bounds
    launch_latency: Option<RwLock<Histogram<u64>>>,

    start_time: Instant,
}

impl DeviceMetrics {
    pub fn new() -> Self {
        let launch_latency = Histogram::new_with_max(MAX_TRACKED_LATENCY_NS, 3)
            .ok()
            .map(RwLock::new);

        Self {
            kernel_launches: AtomicU64::new(0),
            batches_executed: AtomicU64::new(0),
            work_items_executed: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            bytes_filled: AtomicU64::new(0),
            buffers_allocated: AtomicU64::new(0),
            launch_latency,
            start_time: Instant::now(),
        }
    }

    pub fn record_kernel_launch(&self) {
        self.kernel_launches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the time from submission to completion of one launch.
    pub fn record_launch_latency(&self, latency: Duration) {
        let ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        if let Some(hist) = &self.launch_latency {
            if let Some(mut hist) = hist.try_write() {
                let _ = hist.record(ns.min(MAX_TRACKED_LATENCY_NS));
            }
        }
    }

    pub fn record_batch(&self, work_items: u64) {
        self.batches_executed.fetch_add(1, Ordering::Relaxed);
        self.work_items_executed
            .fetch_add(work_items, Ordering::Relaxed);
    }

    pub fn record_copy(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_fill(&self, bytes: u64) {
        self.bytes_filled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_buffer_allocation(&self) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (avg, p50, p99, max) = match &self.launch_latency {
            Some(hist) => {
                let hist = hist.read();
                if hist.len() > 0 {
                    (
                        hist.mean() as u64,
                        hist.value_at_quantile(0.50),
                        hist.value_at_quantile(0.99),
                        hist.max(),
                    )
                } else {
                    (0, 0, 0, 0)
                }
            }
            None => (0, 0, 0, 0),
        };

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            kernel_launches: self.kernel_launches.load(Ordering::Relaxed),
            batches_executed: self.batches_executed.load(Ordering::Relaxed),
            work_items_executed: self.work_items_executed.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            bytes_filled: self.bytes_filled.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            avg_launch_latency_ns: avg,
            p50_launch_latency_ns: p50,
            p99_launch_latency_ns: p99,
            max_launch_latency_ns: max,
        }
    }

    pub fn reset(&self) {
        self.kernel_launches.store(0, Ordering::Relaxed);
        self.batches_executed.store(0, Ordering::Relaxed);
        self.work_items_executed.store(0, Ordering::Relaxed);
        self.bytes_copied.store(0, Ordering::Relaxed);
        self.bytes_filled.store(0, Ordering::Relaxed);
        self.buffers_allocated.store(0, Ordering::Relaxed);

        if let Some(hist) = &self.launch_latency {
            hist.write().reset();
        }
    }
}

impl Default for DeviceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub kernel_launches: u64,
    pub batches_executed: u64,
    pub work_items_executed: u64,
    pub bytes_copied: u64,
    pub bytes_filled: u64,
    pub buffers_allocated: u64,
    pub avg_launch_latency_ns: u64,
    pub p50_launch_latency_ns: u64,
    pub p99_launch_latency_ns: u64,
    pub max_launch_latency_ns: u64,
}

impl MetricsSnapshot {
    pub fn launches_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.kernel_launches as f64 / seconds
    }

    /// Average work items per executed batch.
    pub fn items_per_batch(&self) -> f64 {
        if self.batches_executed == 0 {
            return 0.0;
        }
        self.work_items_executed as f64 / self.batches_executed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = DeviceMetrics::new();
        metrics.record_kernel_launch();
        metrics.record_batch(32);
        metrics.record_batch(16);
        metrics.record_copy(1024);
        metrics.record_fill(64);
        metrics.record_launch_latency(Duration::from_micros(20));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.kernel_launches, 1);
        assert_eq!(snapshot.batches_executed, 2);
        assert_eq!(snapshot.work_items_executed, 48);
        assert_eq!(snapshot.bytes_copied, 1024);
        assert_eq!(snapshot.bytes_filled, 64);
        assert!(snapshot.avg_launch_latency_ns > 0);
        assert_eq!(snapshot.items_per_batch(), 24.0);
    }

    #[test]
    fn test_reset() {
        let metrics = DeviceMetrics::new();
        metrics.record_kernel_launch();
        metrics.record_launch_latency(Duration::from_millis(1));

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.kernel_launches, 0);
        assert_eq!(snapshot.max_launch_latency_ns, 0);
    }
}
