//! Owned host memory blocks drawn from a `MemoryResource`.

use super::allocator::MemoryResource;
use crate::error::{Error, Result};
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment of every host block; covers every POD element type we accept.
pub const HOST_ALIGNMENT: usize = 64;

/// A zero-initialised block of host memory.
///
/// The block remembers the resource it came from and returns itself there on
/// drop, so it may outlive the context that created it.
pub struct HostAllocation {
    ptr: NonNull<u8>,
    size: usize,
    resource: Arc<dyn MemoryResource>,
}

// Raw bytes, access is synchronised by the owning buffer's lock.
unsafe impl Send for HostAllocation {}
unsafe impl Sync for HostAllocation {}

impl HostAllocation {
    pub fn new(resource: Arc<dyn MemoryResource>, size: usize) -> Result<Self> {
        if size == 0 {
            return Ok(Self::empty(resource));
        }

        let layout = Self::layout(size)?;
        let ptr = resource
            .allocate_zeroed(layout)
            .ok_or_else(|| Error::allocation(format!("host allocation of {} bytes failed", size)))?;

        Ok(Self {
            ptr,
            size,
            resource,
        })
    }

    pub fn empty(resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            ptr: dangling(),
            size: 0,
            resource,
        }
    }

    /// New block of `size` bytes keeping the common prefix of `self`.
    pub fn resized(&self, size: usize) -> Result<Self> {
        let block = Self::new(Arc::clone(&self.resource), size)?;
        let keep = self.size.min(size);
        if keep > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), block.ptr.as_ptr(), keep);
            }
        }
        Ok(block)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }

    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size, HOST_ALIGNMENT)
            .map_err(|e| Error::allocation(format!("invalid layout for {} bytes: {}", size, e)))
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        if self.size == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.size) {
            self.resource.deallocate(self.ptr, layout);
        }
    }
}

impl fmt::Debug for HostAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAllocation")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .finish()
    }
}

fn dangling() -> NonNull<u8> {
    // Aligned, non-null and never dereferenced for a zero-sized block.
    NonNull::new(HOST_ALIGNMENT as *mut u8).unwrap_or(NonNull::dangling())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CountingMemoryResource;

    #[test]
    fn test_allocation_is_zeroed_and_aligned() {
        let resource: Arc<dyn MemoryResource> = Arc::new(CountingMemoryResource::system());
        let block = HostAllocation::new(resource, 100).unwrap();
        assert_eq!(block.size(), 100);
        assert_eq!(block.as_ptr() as usize % HOST_ALIGNMENT, 0);
        assert!(block.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_drop_returns_memory() {
        let counting = Arc::new(CountingMemoryResource::system());
        {
            let _block = HostAllocation::new(counting.clone(), 256).unwrap();
            assert_eq!(counting.live_bytes(), 256);
        }
        assert_eq!(counting.live_bytes(), 0);
    }

    #[test]
    fn test_resized_keeps_prefix() {
        let resource: Arc<dyn MemoryResource> = Arc::new(CountingMemoryResource::system());
        let mut block = HostAllocation::new(resource, 8).unwrap();
        block.as_bytes_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let grown = block.resized(12).unwrap();
        assert_eq!(grown.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);

        let shrunk = block.resized(3).unwrap();
        assert_eq!(shrunk.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_empty_allocation() {
        let counting = Arc::new(CountingMemoryResource::system());
        let block = HostAllocation::new(counting.clone(), 0).unwrap();
        assert_eq!(block.size(), 0);
        assert!(block.as_bytes().is_empty());
        assert_eq!(counting.total_allocations(), 0);
    }
}
