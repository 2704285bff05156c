//! Memory resources that back every host-side allocation of a context.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Allocator injected through `ContextOptions`.
///
/// Implementations must be thread-safe: buffers on different devices may
/// allocate and release concurrently.
pub trait MemoryResource: Send + Sync + std::fmt::Debug {
    /// Allocate a block for `layout`. `layout.size()` is never zero.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release a block previously returned by `allocate` with the same layout.
    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocate zeroed memory
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.allocate(layout)?;
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, layout.size());
        }
        Some(ptr)
    }
}

/// System allocator wrapper, the default resource of a context.
#[derive(Debug, Default)]
pub struct SystemMemoryResource;

impl MemoryResource for SystemMemoryResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { System.alloc(layout) })
    }

    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { System.dealloc(ptr.as_ptr(), layout) }
    }

    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { System.alloc_zeroed(layout) })
    }
}

/// Wraps another resource and keeps live byte / block counts.
#[derive(Debug)]
pub struct CountingMemoryResource {
    upstream: Arc<dyn MemoryResource>,
    live_bytes: AtomicU64,
    live_blocks: AtomicUsize,
    total_allocations: AtomicUsize,
}

impl CountingMemoryResource {
    pub fn new(upstream: Arc<dyn MemoryResource>) -> Self {
        Self {
            upstream,
            live_bytes: AtomicU64::new(0),
            live_blocks: AtomicUsize::new(0),
            total_allocations: AtomicUsize::new(0),
        }
    }

    /// Counting wrapper over the system allocator.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemMemoryResource))
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Acquire)
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::Acquire)
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations.load(Ordering::Relaxed)
    }

    fn on_allocate(&self, layout: Layout) {
        self.live_bytes
            .fetch_add(layout.size() as u64, Ordering::AcqRel);
        self.live_blocks.fetch_add(1, Ordering::AcqRel);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
    }
}

impl MemoryResource for CountingMemoryResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.upstream.allocate(layout)?;
        self.on_allocate(layout);
        Some(ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.upstream.deallocate(ptr, layout);
        self.live_bytes
            .fetch_sub(layout.size() as u64, Ordering::AcqRel);
        self.live_blocks.fetch_sub(1, Ordering::AcqRel);
    }

    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.upstream.allocate_zeroed(layout)?;
        self.on_allocate(layout);
        Some(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_resource() {
        let resource = SystemMemoryResource;
        let layout = Layout::from_size_align(1024, 64).unwrap();

        let ptr = resource.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        resource.deallocate(ptr, layout);
    }

    #[test]
    fn test_allocate_zeroed() {
        let resource = SystemMemoryResource;
        let layout = Layout::from_size_align(16, 8).unwrap();

        let ptr = resource.allocate_zeroed(layout).unwrap();
        unsafe {
            for i in 0..16 {
                assert_eq!(*ptr.as_ptr().add(i), 0);
            }
        }
        resource.deallocate(ptr, layout);
    }

    #[test]
    fn test_counting_resource_tracks_live_bytes() {
        let resource = CountingMemoryResource::system();
        let a = Layout::from_size_align(100, 8).unwrap();
        let b = Layout::from_size_align(28, 4).unwrap();

        let pa = resource.allocate(a).unwrap();
        let pb = resource.allocate_zeroed(b).unwrap();
        assert_eq!(resource.live_bytes(), 128);
        assert_eq!(resource.live_blocks(), 2);

        resource.deallocate(pa, a);
        assert_eq!(resource.live_bytes(), 28);
        resource.deallocate(pb, b);
        assert_eq!(resource.live_bytes(), 0);
        assert_eq!(resource.live_blocks(), 0);
        assert_eq!(resource.total_allocations(), 2);
    }
}
