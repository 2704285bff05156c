//! Per-heap capacity and usage bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CounterCell {
    current: AtomicU64,
    peak: AtomicU64,
}

/// Current / peak byte counter for one heap.
///
/// Cloning yields another handle to the same counter. `peak() >= current()`
/// holds at every observation point and `peak()` never decreases.
#[derive(Clone, Default)]
pub struct UsageCounter {
    cell: Arc<CounterCell>,
}

impl UsageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.cell.current.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> u64 {
        self.cell.peak.load(Ordering::Acquire)
    }

    /// Record `bytes` more in use.
    pub fn add(&self, bytes: u64) {
        let now = self.cell.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.cell.peak.fetch_max(now, Ordering::AcqRel);
    }

    /// Record `bytes` released. Saturates at zero.
    pub fn release(&self, bytes: u64) {
        let _ = self
            .cell
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(bytes))
            });
    }

    /// Whether both handles refer to the same counter.
    pub fn same_counter(&self, other: &UsageCounter) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for UsageCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageCounter")
            .field("current", &self.current())
            .field("peak", &self.peak())
            .finish()
    }
}

/// One memory heap reported by a device.
///
/// Setters take `&self`: the record is refreshed in place by the owning
/// backend while devices and buffers keep reading it.
pub struct MemoryHeapInfo {
    total_size: AtomicU64,
    available_size: AtomicU64,
    is_device_local: AtomicBool,
    used_for_buffer: UsageCounter,
}

impl MemoryHeapInfo {
    pub fn new(total_size: u64, available_size: u64, is_device_local: bool) -> Self {
        Self {
            total_size: AtomicU64::new(total_size),
            available_size: AtomicU64::new(available_size),
            is_device_local: AtomicBool::new(is_device_local),
            used_for_buffer: UsageCounter::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Acquire)
    }

    pub fn set_total_size(&self, size: u64) {
        self.total_size.store(size, Ordering::Release);
    }

    pub fn available_size(&self) -> u64 {
        self.available_size.load(Ordering::Acquire)
    }

    pub fn set_available_size(&self, size: u64) {
        self.available_size.store(size, Ordering::Release);
    }

    pub fn is_device_local(&self) -> bool {
        self.is_device_local.load(Ordering::Acquire)
    }

    pub fn set_device_local(&self, flag: bool) {
        self.is_device_local.store(flag, Ordering::Release);
    }

    pub fn used_size_for_buffer(&self) -> &UsageCounter {
        &self.used_for_buffer
    }
}

impl fmt::Debug for MemoryHeapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHeapInfo")
            .field("total_size", &self.total_size())
            .field("available_size", &self.available_size())
            .field("is_device_local", &self.is_device_local())
            .field("used_for_buffer", &self.used_for_buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_peak_tracks_maximum() {
        let counter = UsageCounter::new();
        counter.add(100);
        counter.add(50);
        counter.release(120);
        assert_eq!(counter.current(), 30);
        assert_eq!(counter.peak(), 150);

        counter.add(10);
        assert_eq!(counter.peak(), 150);
    }

    #[test]
    fn test_release_saturates() {
        let counter = UsageCounter::new();
        counter.add(10);
        counter.release(100);
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.peak(), 10);
    }

    #[test]
    fn test_clones_share_state() {
        let a = UsageCounter::new();
        let b = a.clone();
        b.add(64);
        assert_eq!(a.current(), 64);
        assert!(a.same_counter(&b));
        assert!(!a.same_counter(&UsageCounter::new()));
    }

    #[test]
    fn test_concurrent_updates() {
        let counter = UsageCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(4);
                        assert!(counter.peak() >= counter.current());
                        counter.release(4);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.current(), 0);
        assert!(counter.peak() >= 4);
    }

    #[test]
    fn test_heap_setters() {
        let heap = MemoryHeapInfo::new(1024, 512, false);
        heap.set_total_size(2048);
        heap.set_available_size(1000);
        heap.set_device_local(true);

        assert_eq!(heap.total_size(), 2048);
        assert_eq!(heap.available_size(), 1000);
        assert!(heap.is_device_local());
        assert_eq!(heap.used_size_for_buffer().current(), 0);
    }
}
