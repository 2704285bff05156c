use super::storage::StorageWriteGuard;
use super::BufferCore;
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Host view of a buffer's contents, `size()` elements long.
///
/// The buffer stays locked against resizing and device operations while the
/// view lives. Writes reach the device when the view is dropped.
pub struct MappedMemory<T: Pod> {
    guard: StorageWriteGuard,
    core: Arc<BufferCore>,
    len: usize,
    #[cfg(feature = "vulkan")]
    device: Option<crate::device::Device>,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedMemory<T> {
    pub(crate) fn new(
        guard: StorageWriteGuard,
        core: Arc<BufferCore>,
        #[cfg(feature = "vulkan")] device: Option<crate::device::Device>,
    ) -> Self {
        let len = guard.size_in_bytes() / std::mem::size_of::<T>();
        Self {
            guard,
            core,
            len,
            #[cfg(feature = "vulkan")]
            device,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn byte_len(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }
}

impl<T: Pod> Deref for MappedMemory<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        let n = self.byte_len();
        match self.guard.host_bytes() {
            Some(bytes) => bytemuck::cast_slice(&bytes[..n]),
            None => &[],
        }
    }
}

impl<T: Pod> DerefMut for MappedMemory<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        let n = self.byte_len();
        match self.guard.host_bytes_mut() {
            Some(bytes) => bytemuck::cast_slice_mut(&mut bytes[..n]),
            None => &mut [],
        }
    }
}

impl<T: Pod> Drop for MappedMemory<T> {
    fn drop(&mut self) {
        #[cfg(feature = "vulkan")]
        if let Some(device) = &self.device {
            if let (Some(vk), Ok(storage)) = (device.as_vulkan(), self.guard.as_vulkan()) {
                storage.upload_mirror(vk);
            }
        }
        self.core.mapped.store(false, Ordering::Release);
    }
}

impl<T: Pod> fmt::Debug for MappedMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedMemory")
            .field("len", &self.len)
            .finish()
    }
}
