//! Typed device buffers.

pub(crate) mod cpu;
mod mapped;
pub(crate) mod storage;
mod usage;
#[cfg(feature = "vulkan")]
pub(crate) mod vulkan;

pub use mapped::MappedMemory;
pub use usage::{BufferFlags, BufferUsage, MemoryModel, MemoryProperties};

use crate::device::fence::Signal;
use crate::device::{Device, DeviceVariant, LaunchResult, WeakDevice};
use crate::device_info::{BackendKind, DeviceInfo};
use crate::error::{Error, Result};
use crate::id::IdData;
use crate::memory::{HostAllocation, UsageCounter, HOST_ALIGNMENT};
use bytemuck::Pod;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
#[cfg(feature = "vulkan")]
use storage::lock_shared;
use storage::{lock_read_write, SharedStorage, Storage};

/// Range and synchronization options of [`Buffer::fill`] and [`copy`].
///
/// Offsets and `size` count elements of the buffer's element type.
#[derive(Debug, Clone, Default)]
pub struct BufferLaunchOptions {
    pub source_offset: usize,
    pub dest_offset: usize,
    /// Elements to process; the rest of the destination when `None`.
    pub size: Option<usize>,
    /// Return immediately with an active fence instead of blocking.
    pub external_sync_mode: bool,
    pub label: String,
}

impl BufferLaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_offset(mut self, offset: usize) -> Self {
        self.source_offset = offset;
        self
    }

    pub fn dest_offset(mut self, offset: usize) -> Self {
        self.dest_offset = offset;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn external_sync_mode(mut self, enable: bool) -> Self {
        self.external_sync_mode = enable;
        self
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }
}

pub(crate) struct BufferCore {
    id: IdData,
    device: WeakDevice,
    kind: BackendKind,
    usage: BufferUsage,
    flags: BufferFlags,
    properties: MemoryProperties,
    heap_index: usize,
    /// Element size of the type the buffer was created with.
    element_size: usize,
    storage: SharedStorage,
    size_in_bytes: AtomicUsize,
    generation: AtomicU64,
    heap_usage: UsageCounter,
    pub(crate) mapped: AtomicBool,
}

impl Drop for BufferCore {
    fn drop(&mut self) {
        self.heap_usage
            .release(self.size_in_bytes.load(Ordering::Acquire) as u64);
    }
}

/// Typed allocation owned by the application.
///
/// Cloning is cheap and yields another handle to the same allocation, as
/// does [`reinterp`](Buffer::reinterp). The memory is released, and the
/// owning heap's usage counter decremented, when the last handle drops.
pub struct Buffer<T: Pod> {
    core: Arc<BufferCore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> Buffer<T> {
    pub(crate) fn new(device: &Device, usage: BufferUsage, flags: BufferFlags) -> Result<Self> {
        check_element_type::<T>()?;

        let id = device.issue_id()?;
        let resource = device.memory_resource()?;
        let properties = MemoryProperties::derive(usage, flags, memory_model(device));
        let heap_index = select_heap(device.device_info(), &properties);
        let heap_usage = device
            .heap_usage_list()
            .get(heap_index)
            .cloned()
            .unwrap_or_default();

        let storage = match device.variant() {
            DeviceVariant::Cpu(_) => Storage::Host(HostAllocation::empty(resource)),
            #[cfg(feature = "vulkan")]
            DeviceVariant::Vulkan(_) => Storage::Vulkan(vulkan::VulkanStorage::empty(
                properties.is_host_visible,
                &resource,
            )),
        };

        tracing::trace!(
            id = id.id(),
            ?usage,
            ?flags,
            heap_index,
            "created buffer"
        );

        Ok(Self {
            core: Arc::new(BufferCore {
                id,
                device: device.downgrade(),
                kind: device.kind(),
                usage,
                flags,
                properties,
                heap_index,
                element_size: mem::size_of::<T>(),
                storage: Arc::new(RwLock::new(storage)),
                size_in_bytes: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                heap_usage,
                mapped: AtomicBool::new(false),
            }),
            _marker: PhantomData,
        })
    }

    pub fn id(&self) -> &IdData {
        &self.core.id
    }

    pub fn set_name<S: Into<String>>(&self, name: S) {
        self.core.id.set_name(name);
    }

    pub fn device(&self) -> Result<Device> {
        self.core.device.get("buffer")
    }

    pub fn weak_device(&self) -> &WeakDevice {
        &self.core.device
    }

    pub fn kind(&self) -> BackendKind {
        self.core.kind
    }

    /// Element count.
    pub fn size(&self) -> usize {
        self.size_in_bytes() / mem::size_of::<T>()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.core.size_in_bytes.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size_in_bytes() == 0
    }

    pub fn usage(&self) -> BufferUsage {
        self.core.usage
    }

    pub fn flags(&self) -> BufferFlags {
        self.core.flags
    }

    pub fn memory_properties(&self) -> MemoryProperties {
        self.core.properties
    }

    /// Index into the device's heap list.
    pub fn heap_index(&self) -> usize {
        self.core.heap_index
    }

    pub fn is_device_local(&self) -> bool {
        self.core.properties.is_device_local
    }

    pub fn is_host_visible(&self) -> bool {
        self.core.properties.is_host_visible
    }

    pub fn is_host_coherent(&self) -> bool {
        self.core.properties.is_host_coherent
    }

    pub fn is_host_cached(&self) -> bool {
        self.core.properties.is_host_cached
    }

    pub fn is_mapped(&self) -> bool {
        self.core.mapped.load(Ordering::Acquire)
    }

    /// Whether both handles share one allocation, whatever their element
    /// types.
    pub fn ptr_eq<U: Pod>(&self, other: &Buffer<U>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Resize to `size` elements.
    ///
    /// CPU buffers keep the common prefix. Vulkan buffers come back zeroed.
    pub fn set_size(&self, size: usize) -> Result<()> {
        let bytes = size
            .checked_mul(mem::size_of::<T>())
            .ok_or_else(|| Error::allocation(format!("{} elements overflow", size)))?;
        self.resize_bytes(bytes)
    }

    /// Release the backing memory.
    pub fn clear(&self) -> Result<()> {
        self.resize_bytes(0)
    }

    /// View the same allocation as elements of `U`.
    ///
    /// Fails unless `size_of::<U>()` divides the current byte size.
    pub fn reinterp<U: Pod>(&self) -> Result<Buffer<U>> {
        check_element_type::<U>()?;
        let bytes = self.size_in_bytes();
        if bytes % mem::size_of::<U>() != 0 {
            return Err(Error::invalid_instruction(format!(
                "{} bytes cannot be viewed as elements of {} bytes",
                bytes,
                mem::size_of::<U>()
            )));
        }

        Ok(Buffer {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        })
    }

    /// Lock the buffer and expose its contents to the host.
    pub fn map_memory(&self) -> Result<MappedMemory<T>> {
        if !self.core.properties.is_host_visible {
            return Err(Error::invalid_instruction("buffer is not host visible"));
        }
        if self.core.mapped.swap(true, Ordering::AcqRel) {
            return Err(Error::invalid_instruction("buffer is already mapped"));
        }

        let result = self.map_locked();
        if result.is_err() {
            self.core.mapped.store(false, Ordering::Release);
        }
        result
    }

    #[cfg(not(feature = "vulkan"))]
    fn map_locked(&self) -> Result<MappedMemory<T>> {
        let guard = self.core.storage.write_arc();
        Ok(MappedMemory::new(guard, Arc::clone(&self.core)))
    }

    #[cfg(feature = "vulkan")]
    fn map_locked(&self) -> Result<MappedMemory<T>> {
        let mut guard = self.core.storage.write_arc();
        let device = match &mut *guard {
            Storage::Vulkan(storage) => {
                let device = self.device()?;
                let vk = device
                    .as_vulkan()
                    .ok_or_else(|| Error::invalid_instruction("vulkan buffer on a cpu device"))?;
                storage.download_mirror(vk)?;
                Some(device)
            }
            Storage::Host(_) => None,
        };
        Ok(MappedMemory::new(guard, Arc::clone(&self.core), device))
    }

    /// Write `value` into the element range selected by `dest_offset` and
    /// `size` of `options`.
    pub fn fill(&self, value: T, options: &BufferLaunchOptions) -> Result<LaunchResult> {
        let device = self.device()?;
        self.ensure_unmapped()?;
        let elem = mem::size_of::<T>();
        let slot = device.reserve_fence(options.external_sync_mode)?;

        let (signal, count) = match device.variant() {
            DeviceVariant::Cpu(cpu) => {
                let guard = self.core.storage.write_arc();
                let (offset, count) = fill_range(guard.size_in_bytes() / elem, options)?;
                let pattern = bytemuck::bytes_of(&value).to_vec();
                let handle = cpu::fill(cpu, guard, offset * elem, pattern, count)?;
                (Signal::Cpu(handle), count)
            }
            #[cfg(feature = "vulkan")]
            DeviceVariant::Vulkan(vk) => {
                let guard = self.core.storage.read();
                let storage = guard.as_vulkan()?;
                let (offset, count) = fill_range(storage.size() / elem, options)?;
                let signal = vulkan::fill(vk, storage, offset * elem, bytemuck::bytes_of(&value), count)?;
                (signal, count)
            }
        };

        device.metrics().record_fill((count * elem) as u64);
        tracing::trace!(id = self.core.id.id(), count, label = %options.label, "fill");
        device.finish(slot, signal)
    }

    pub(crate) fn shared_storage(&self) -> &SharedStorage {
        &self.core.storage
    }

    /// Bumped on every reallocation.
    pub(crate) fn generation(&self) -> u64 {
        self.core.generation.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_unmapped(&self) -> Result<()> {
        if self.is_mapped() {
            return Err(Error::invalid_instruction(format!(
                "buffer {} is mapped",
                self.core.id.id()
            )));
        }
        Ok(())
    }

    fn resize_bytes(&self, bytes: usize) -> Result<()> {
        let device = self.device()?;
        let limit = device.device_info().max_allocation_size();
        if bytes as u64 > limit {
            return Err(Error::allocation(format!(
                "{} bytes exceeds the device limit of {} bytes",
                bytes, limit
            )));
        }
        if bytes % self.core.element_size != 0 {
            return Err(Error::invalid_instruction(format!(
                "{} bytes is not a whole number of the buffer's {}-byte elements",
                bytes, self.core.element_size
            )));
        }
        self.ensure_unmapped()?;

        let mut storage = self.core.storage.write();
        let old = storage.size_in_bytes();
        if old == bytes {
            return Ok(());
        }

        let replacement = match (&*storage, device.variant()) {
            (Storage::Host(alloc), _) => Storage::Host(alloc.resized(bytes)?),
            #[cfg(feature = "vulkan")]
            (Storage::Vulkan(_), DeviceVariant::Vulkan(vk)) => {
                let resource = device.memory_resource()?;
                let label = format!("zivc-buffer-{}", self.core.id.id());
                Storage::Vulkan(vulkan::VulkanStorage::new(
                    vk,
                    bytes,
                    self.core.properties.is_host_visible,
                    &resource,
                    &label,
                )?)
            }
            #[cfg(feature = "vulkan")]
            (Storage::Vulkan(_), _) => {
                return Err(Error::invalid_instruction("vulkan buffer on a cpu device"));
            }
        };
        *storage = replacement;

        self.core.heap_usage.add(bytes as u64);
        self.core.heap_usage.release(old as u64);
        self.core.size_in_bytes.store(bytes, Ordering::Release);
        self.core.generation.fetch_add(1, Ordering::AcqRel);

        tracing::trace!(id = self.core.id.id(), old, new = bytes, "resized buffer");
        Ok(())
    }
}

impl<T: Pod> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: Pod> Eq for Buffer<T> {}

impl<T: Pod> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.core.id)
            .field("element", &std::any::type_name::<T>())
            .field("size", &self.size())
            .field("usage", &self.core.usage)
            .field("properties", &self.core.properties)
            .finish()
    }
}

/// Copy elements from `src` to `dst`; both must live on the same device.
pub fn copy<T: Pod>(
    src: &Buffer<T>,
    dst: &Buffer<T>,
    options: &BufferLaunchOptions,
) -> Result<LaunchResult> {
    let device = dst.device()?;
    if !device.ptr_eq(&src.device()?) {
        return Err(Error::invalid_instruction(
            "copy between buffers of different devices",
        ));
    }
    src.ensure_unmapped()?;
    dst.ensure_unmapped()?;

    let elem = mem::size_of::<T>();
    let same = src.ptr_eq(dst);
    let slot = device.reserve_fence(options.external_sync_mode)?;

    let (signal, count) = match device.variant() {
        DeviceVariant::Cpu(cpu) => {
            if same {
                let guard = dst.core.storage.write_arc();
                let len = guard.size_in_bytes() / elem;
                let (s, d, n) = copy_ranges(len, len, options)?;
                let handle = cpu::copy_within(cpu, guard, s * elem, d * elem, n * elem)?;
                (Signal::Cpu(handle), n)
            } else {
                let (from, to) = lock_read_write(&src.core.storage, &dst.core.storage);
                let (s, d, n) = copy_ranges(
                    from.size_in_bytes() / elem,
                    to.size_in_bytes() / elem,
                    options,
                )?;
                let handle = cpu::copy(cpu, from, to, s * elem, d * elem, n * elem)?;
                (Signal::Cpu(handle), n)
            }
        }
        #[cfg(feature = "vulkan")]
        DeviceVariant::Vulkan(vk) => {
            let list = [Arc::clone(&src.core.storage), Arc::clone(&dst.core.storage)];
            let (guards, slots) = lock_shared(&list);
            let from = guards[slots[0]].as_vulkan()?;
            let to = guards[slots[1]].as_vulkan()?;
            let (s, d, n) = copy_ranges(from.size() / elem, to.size() / elem, options)?;
            let signal = vulkan::copy(vk, from, to, s * elem, d * elem, n * elem)?;
            (signal, n)
        }
    };

    device.metrics().record_copy((count * elem) as u64);
    tracing::trace!(
        src = src.core.id.id(),
        dst = dst.core.id.id(),
        count,
        label = %options.label,
        "copy"
    );
    device.finish(slot, signal)
}

fn check_element_type<T>() -> Result<()> {
    if mem::size_of::<T>() == 0 {
        return Err(Error::invalid_instruction("zero-sized element type"));
    }
    if mem::align_of::<T>() > HOST_ALIGNMENT {
        return Err(Error::invalid_instruction(format!(
            "element alignment {} exceeds {}",
            mem::align_of::<T>(),
            HOST_ALIGNMENT
        )));
    }
    Ok(())
}

fn memory_model(device: &Device) -> MemoryModel {
    match device.variant() {
        DeviceVariant::Cpu(_) => MemoryModel::Host,
        #[cfg(feature = "vulkan")]
        DeviceVariant::Vulkan(_) => match device.device_info().as_vulkan() {
            Some(info) if info.is_unified_memory() => MemoryModel::Unified,
            _ => MemoryModel::Discrete,
        },
    }
}

/// First heap whose locality matches the buffer's placement.
fn select_heap(info: &DeviceInfo, properties: &MemoryProperties) -> usize {
    info.heap_info_list()
        .iter()
        .position(|heap| heap.is_device_local() == properties.is_device_local)
        .unwrap_or(0)
}

fn check_range(what: &'static str, offset: usize, count: usize, len: usize) -> Result<()> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::out_of_range(
            what,
            offset.saturating_add(count.max(1)) - 1,
            len,
        )),
    }
}

fn fill_range(len: usize, options: &BufferLaunchOptions) -> Result<(usize, usize)> {
    let offset = options.dest_offset;
    let count = options.size.unwrap_or(len.saturating_sub(offset));
    check_range("fill", offset, count, len)?;
    Ok((offset, count))
}

fn copy_ranges(
    src_len: usize,
    dst_len: usize,
    options: &BufferLaunchOptions,
) -> Result<(usize, usize, usize)> {
    let count = options
        .size
        .unwrap_or(dst_len.saturating_sub(options.dest_offset));
    check_range("copy destination", options.dest_offset, count, dst_len)?;
    check_range("copy source", options.source_offset, count, src_len)?;
    Ok((options.source_offset, options.dest_offset, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextOptions;
    use crate::context::{create_context, Context};

    fn setup() -> (Context, Device) {
        let options = ContextOptions::builder().num_threads(2).build().unwrap();
        let context = create_context(options).unwrap();
        let device = context.query_device(0).unwrap();
        (context, device)
    }

    fn contents<T: Pod>(buffer: &Buffer<T>) -> Vec<T> {
        buffer.map_memory().unwrap().to_vec()
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("x", 0, 10, 10).is_ok());
        assert!(check_range("x", 10, 0, 10).is_ok());
        match check_range("x", 8, 4, 10) {
            Err(Error::OutOfRange { index, len, .. }) => {
                assert_eq!(index, 11);
                assert_eq!(len, 10);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(check_range("x", usize::MAX, 2, 10).is_err());
        assert!(check_range("x", 11, 0, 10).is_err());
    }

    #[test]
    fn test_set_size_tracks_heap_usage() {
        let (_context, device) = setup();
        let counter = device.heap_usage_list()[0].clone();
        let base = counter.current();

        let buffer = device.make_buffer::<u32>(BufferUsage::PreferDevice).unwrap();
        assert_eq!(buffer.size(), 0);

        buffer.set_size(100).unwrap();
        assert_eq!(buffer.size(), 100);
        assert_eq!(buffer.size_in_bytes(), 400);
        assert_eq!(counter.current(), base + 400);

        buffer.set_size(10).unwrap();
        assert_eq!(counter.current(), base + 40);
        assert!(counter.peak() >= base + 400);

        buffer.clear().unwrap();
        assert_eq!(buffer.size(), 0);
        assert_eq!(counter.current(), base);

        buffer.set_size(8).unwrap();
        drop(buffer);
        assert_eq!(counter.current(), base);
    }

    #[test]
    fn test_resize_keeps_prefix_on_cpu() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<u16>(BufferUsage::PreferHost).unwrap();
        buffer.set_size(4).unwrap();
        buffer.map_memory().unwrap().copy_from_slice(&[1, 2, 3, 4]);

        buffer.set_size(6).unwrap();
        assert_eq!(contents(&buffer), vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_reinterp_shares_allocation() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
        buffer.set_size(6).unwrap();

        let bytes = buffer.reinterp::<u8>().unwrap();
        assert_eq!(bytes.size(), 24);
        assert!(bytes.ptr_eq(&buffer));
        assert_eq!(bytes.id().id(), buffer.id().id());
        assert_eq!(bytes.memory_properties(), buffer.memory_properties());

        bytes.set_size(40).unwrap();
        assert_eq!(buffer.size(), 10);

        let wide = buffer.reinterp::<u64>().unwrap();
        assert_eq!(wide.size(), 5);

        buffer.set_size(3).unwrap();
        assert!(matches!(
            buffer.reinterp::<u64>(),
            Err(Error::InvalidInstruction(_))
        ));
    }

    #[test]
    fn test_reinterp_resize_keeps_whole_elements() {
        let (_context, device) = setup();
        let words = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
        words.set_size(4).unwrap();
        let bytes = words.reinterp::<u8>().unwrap();

        assert!(matches!(bytes.set_size(13), Err(Error::InvalidInstruction(_))));
        assert_eq!(words.size(), 4);
        assert_eq!(words.size_in_bytes(), 16);

        bytes.set_size(12).unwrap();
        assert_eq!(words.size(), 3);
        assert_eq!(words.size_in_bytes(), words.size() * 4);
    }

    #[test]
    fn test_map_memory_guards() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<i32>(BufferUsage::HostOnly).unwrap();
        buffer.set_size(4).unwrap();

        let mapped = buffer.map_memory().unwrap();
        assert_eq!(mapped.len(), 4);
        assert!(buffer.is_mapped());
        assert!(buffer.map_memory().is_err());
        assert!(buffer.set_size(8).is_err());
        assert!(buffer
            .fill(1, &BufferLaunchOptions::new())
            .is_err());
        drop(mapped);

        assert!(!buffer.is_mapped());
        assert!(buffer.set_size(8).is_ok());
    }

    #[test]
    fn test_fill_sub_range() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<i32>(BufferUsage::HostOnly).unwrap();
        buffer.set_size(10).unwrap();

        buffer.fill(7, &BufferLaunchOptions::new()).unwrap();
        buffer
            .fill(-1, &BufferLaunchOptions::new().dest_offset(2).size(6))
            .unwrap();
        assert_eq!(contents(&buffer), vec![7, 7, -1, -1, -1, -1, -1, -1, 7, 7]);

        assert!(matches!(
            buffer.fill(0, &BufferLaunchOptions::new().dest_offset(8).size(3)),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_fill_async_returns_fence() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<f32>(BufferUsage::PreferHost).unwrap();
        buffer.set_size(1 << 16).unwrap();

        let mut result = buffer
            .fill(0.5, &BufferLaunchOptions::new().external_sync_mode(true))
            .unwrap();
        assert!(result.fence().is_active());
        assert_eq!(device.num_of_fences(), device.fence_capacity() - 1);

        device.wait_for_fence(result.fence_mut()).unwrap();
        assert!(!result.fence().is_active());
        assert_eq!(device.num_of_fences(), device.fence_capacity());
        assert!(contents(&buffer).iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_copy_ranges_and_overlap() {
        let (_context, device) = setup();
        let a = device.make_buffer::<u8>(BufferUsage::PreferHost).unwrap();
        let b = device.make_buffer::<u8>(BufferUsage::PreferHost).unwrap();
        a.set_size(8).unwrap();
        b.set_size(8).unwrap();
        a.map_memory().unwrap().copy_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);

        copy(&a, &b, &BufferLaunchOptions::new().source_offset(4).dest_offset(1).size(3)).unwrap();
        assert_eq!(contents(&b), vec![0, 4, 5, 6, 0, 0, 0, 0]);

        // overlapping copy within one buffer
        copy(&a, &a, &BufferLaunchOptions::new().source_offset(0).dest_offset(2).size(6)).unwrap();
        assert_eq!(contents(&a), vec![0, 1, 0, 1, 2, 3, 4, 5]);

        assert!(matches!(
            copy(&a, &b, &BufferLaunchOptions::new().source_offset(6).size(4)),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_copy_between_devices_is_rejected() {
        let (_c1, d1) = setup();
        let (_c2, d2) = setup();
        let a = d1.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
        let b = d2.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
        a.set_size(4).unwrap();
        b.set_size(4).unwrap();

        assert!(matches!(
            copy(&a, &b, &BufferLaunchOptions::new()),
            Err(Error::InvalidInstruction(_))
        ));
    }

    #[test]
    fn test_zero_sized_element_rejected() {
        let (_context, device) = setup();
        assert!(device.make_buffer::<()>(BufferUsage::PreferHost).is_err());
    }

    #[test]
    fn test_allocation_limit() {
        let (_context, device) = setup();
        let buffer = device.make_buffer::<u64>(BufferUsage::PreferHost).unwrap();
        let limit = device.device_info().max_allocation_size() as usize;
        assert!(matches!(
            buffer.set_size(limit / 8 + 1),
            Err(Error::BufferAllocationFailed(_))
        ));
    }

    #[test]
    fn test_buffer_outlives_device() {
        let (context, device) = setup();
        let buffer = device.make_buffer::<u32>(BufferUsage::PreferHost).unwrap();
        buffer.set_size(4).unwrap();
        drop(device);
        drop(context);

        assert_eq!(buffer.size(), 4);
        assert!(matches!(buffer.device(), Err(Error::ParentExpired { .. })));
        assert!(buffer.map_memory().is_ok());
    }
}
