//! Backing store shared by every typed view of one buffer.

#[cfg(feature = "vulkan")]
use crate::error::Error;
use crate::error::Result;
use crate::memory::HostAllocation;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use std::sync::Arc;

pub(crate) enum Storage {
    Host(HostAllocation),
    #[cfg(feature = "vulkan")]
    Vulkan(super::vulkan::VulkanStorage),
}

pub(crate) type SharedStorage = Arc<RwLock<Storage>>;
pub(crate) type StorageReadGuard = ArcRwLockReadGuard<RawRwLock, Storage>;
pub(crate) type StorageWriteGuard = ArcRwLockWriteGuard<RawRwLock, Storage>;

impl Storage {
    pub(crate) fn size_in_bytes(&self) -> usize {
        match self {
            Storage::Host(alloc) => alloc.size(),
            #[cfg(feature = "vulkan")]
            Storage::Vulkan(vk) => vk.size(),
        }
    }

    /// Host copy of the contents: the allocation itself on the CPU, the
    /// mirror of a host-visible Vulkan buffer.
    pub(crate) fn host_bytes(&self) -> Option<&[u8]> {
        match self {
            Storage::Host(alloc) => Some(alloc.as_bytes()),
            #[cfg(feature = "vulkan")]
            Storage::Vulkan(vk) => vk.mirror().map(|m| &m.as_bytes()[..vk.size()]),
        }
    }

    pub(crate) fn host_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Storage::Host(alloc) => Some(alloc.as_bytes_mut()),
            #[cfg(feature = "vulkan")]
            Storage::Vulkan(vk) => {
                let size = vk.size();
                vk.mirror_mut().map(|m| &mut m.as_bytes_mut()[..size])
            }
        }
    }

    /// Base pointer of CPU storage.
    pub(crate) fn host_ptr(&self) -> Result<*mut u8> {
        match self {
            Storage::Host(alloc) => Ok(alloc.as_ptr()),
            #[cfg(feature = "vulkan")]
            Storage::Vulkan(_) => Err(Error::invalid_instruction(
                "vulkan buffer used by a cpu operation",
            )),
        }
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn as_vulkan(&self) -> Result<&super::vulkan::VulkanStorage> {
        match self {
            Storage::Vulkan(vk) => Ok(vk),
            Storage::Host(_) => Err(Error::invalid_instruction(
                "cpu buffer used by a vulkan operation",
            )),
        }
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn as_vulkan_mut(&mut self) -> Result<&mut super::vulkan::VulkanStorage> {
        match self {
            Storage::Vulkan(vk) => Ok(vk),
            Storage::Host(_) => Err(Error::invalid_instruction(
                "cpu buffer used by a vulkan operation",
            )),
        }
    }
}

/// Lock `read` shared and `write` exclusively. Locks are taken in address
/// order; `read` and `write` must be different storages.
pub(crate) fn lock_read_write(
    read: &SharedStorage,
    write: &SharedStorage,
) -> (StorageReadGuard, StorageWriteGuard) {
    if Arc::as_ptr(read) < Arc::as_ptr(write) {
        let r = read.read_arc();
        let w = write.write_arc();
        (r, w)
    } else {
        let w = write.write_arc();
        let r = read.read_arc();
        (r, w)
    }
}

/// Lock every storage shared, each once, in address order.
///
/// Returns the guards plus, for every entry of `list`, the index of the
/// guard covering it.
pub(crate) fn lock_shared(list: &[SharedStorage]) -> (Vec<StorageReadGuard>, Vec<usize>) {
    let mut order: Vec<usize> = (0..list.len()).collect();
    order.sort_by_key(|&i| Arc::as_ptr(&list[i]));

    let mut guards: Vec<StorageReadGuard> = Vec::with_capacity(list.len());
    let mut slots = vec![0; list.len()];
    let mut last: Option<usize> = None;
    for i in order {
        match last {
            Some(prev) if Arc::ptr_eq(&list[prev], &list[i]) => {}
            _ => guards.push(list[i].read_arc()),
        }
        slots[i] = guards.len() - 1;
        last = Some(i);
    }
    (guards, slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemMemoryResource;

    fn host(size: usize) -> SharedStorage {
        let alloc = HostAllocation::new(Arc::new(SystemMemoryResource), size).unwrap();
        Arc::new(RwLock::new(Storage::Host(alloc)))
    }

    #[test]
    fn test_lock_shared_dedups() {
        let a = host(16);
        let b = host(32);
        let list = vec![Arc::clone(&a), Arc::clone(&b), Arc::clone(&a)];

        let (guards, slots) = lock_shared(&list);
        assert_eq!(guards.len(), 2);
        assert_eq!(slots[0], slots[2]);
        assert_ne!(slots[0], slots[1]);
        assert_eq!(guards[slots[1]].size_in_bytes(), 32);
    }

    #[test]
    fn test_lock_read_write_either_order() {
        let a = host(8);
        let b = host(8);
        {
            let (_r, _w) = lock_read_write(&a, &b);
        }
        let (r, w) = lock_read_write(&b, &a);
        assert_eq!(r.size_in_bytes(), 8);
        assert_eq!(w.size_in_bytes(), 8);
    }

    #[test]
    fn test_host_bytes() {
        let storage = host(4);
        let mut guard = storage.write();
        guard.host_bytes_mut().unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(guard.host_bytes().unwrap(), &[1, 2, 3, 4]);
        assert!(guard.host_ptr().is_ok());
    }
}
