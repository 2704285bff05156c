//! Active handles to compute devices.

pub(crate) mod cpu;
pub mod fence;
#[cfg(feature = "vulkan")]
pub(crate) mod vulkan;

pub use fence::{Fence, FencePool, LaunchResult};

use crate::buffer::{Buffer, BufferFlags, BufferUsage};
use crate::context::ContextCore;
use crate::device_info::{BackendKind, DeviceInfo};
use crate::error::{Error, Result};
use crate::id::IdData;
use crate::kernel::arg::KernelSignature;
use crate::kernel::{Kernel, KernelInit};
use crate::memory::{MemoryResource, UsageCounter};
use crate::telemetry::DeviceMetrics;
use bytemuck::Pod;
use cpu::CpuDevice;
use fence::{FenceSlot, Signal};
use std::fmt;
use std::sync::{Arc, Weak};

pub(crate) enum DeviceVariant {
    Cpu(CpuDevice),
    #[cfg(feature = "vulkan")]
    Vulkan(vulkan::VulkanDevice),
}

pub(crate) struct DeviceInner {
    id: IdData,
    context: Weak<ContextCore>,
    info: Arc<DeviceInfo>,
    heap_usage: Vec<UsageCounter>,
    fences: FencePool,
    metrics: Arc<DeviceMetrics>,
    variant: DeviceVariant,
}

/// Shared handle to one compute device.
///
/// Cloning is cheap. Buffers and kernels only hold a [`WeakDevice`], as
/// does the context, so the device lives until the last `Device` handle is
/// dropped.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

/// Non-owning device handle.
#[derive(Clone, Default)]
pub struct WeakDevice {
    inner: Weak<DeviceInner>,
}

impl WeakDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Device> {
        self.inner.upgrade().map(|inner| Device { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Like [`upgrade`](Self::upgrade) but reports a dead handle as an
    /// error on behalf of `child`.
    pub(crate) fn get(&self, child: &'static str) -> Result<Device> {
        self.upgrade().ok_or_else(|| Error::expired(child, "device"))
    }
}

impl fmt::Debug for WeakDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDevice")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Device {
    pub(crate) fn new(
        id: IdData,
        context: Weak<ContextCore>,
        info: Arc<DeviceInfo>,
        fence_capacity: usize,
        variant: DeviceVariant,
    ) -> Self {
        let heap_usage = info
            .heap_info_list()
            .iter()
            .map(|heap| heap.used_size_for_buffer().clone())
            .collect();

        Self {
            inner: Arc::new(DeviceInner {
                id,
                context,
                info,
                heap_usage,
                fences: FencePool::new(fence_capacity),
                metrics: Arc::new(DeviceMetrics::new()),
                variant,
            }),
        }
    }

    pub fn id(&self) -> &IdData {
        &self.inner.id
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.info.kind()
    }

    pub fn device_info(&self) -> &Arc<DeviceInfo> {
        &self.inner.info
    }

    /// Per-heap usage counters, indexed like the device info's heap list.
    pub fn heap_usage_list(&self) -> &[UsageCounter] {
        &self.inner.heap_usage
    }

    pub fn metrics(&self) -> &DeviceMetrics {
        &self.inner.metrics
    }

    pub(crate) fn metrics_handle(&self) -> Arc<DeviceMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn fence_pool(&self) -> &FencePool {
        &self.inner.fences
    }

    /// Fences that can still be handed out.
    pub fn num_of_fences(&self) -> usize {
        self.inner.fences.available()
    }

    pub fn fence_capacity(&self) -> usize {
        self.inner.fences.capacity()
    }

    /// Work groups per batch of a CPU dispatch. `None` on non-CPU devices.
    pub fn task_batch_size(&self) -> Option<usize> {
        match &self.inner.variant {
            DeviceVariant::Cpu(cpu) => Some(cpu.task_batch_size()),
            #[cfg(feature = "vulkan")]
            DeviceVariant::Vulkan(_) => None,
        }
    }

    pub fn make_buffer<T: Pod>(&self, usage: BufferUsage) -> Result<Buffer<T>> {
        self.make_buffer_with_flags(usage, BufferFlags::NONE)
    }

    pub fn make_buffer_with_flags<T: Pod>(
        &self,
        usage: BufferUsage,
        flags: BufferFlags,
    ) -> Result<Buffer<T>> {
        let buffer = Buffer::new(self, usage, flags)?;
        self.inner.metrics.record_buffer_allocation();
        Ok(buffer)
    }

    pub fn create_kernel<S: KernelSignature>(&self, init: KernelInit<S>) -> Result<Kernel<S>> {
        Kernel::new(self, init)
    }

    /// Block until every submission on this device finished.
    pub fn wait_for_completion(&self) {
        match &self.inner.variant {
            DeviceVariant::Cpu(cpu) => cpu.wait_for_completion(),
            #[cfg(feature = "vulkan")]
            DeviceVariant::Vulkan(vk) => vk.wait_for_completion(),
        }
    }

    /// Block until the fenced operation finished. Clears the fence.
    pub fn wait_for_fence(&self, fence: &mut Fence) -> Result<()> {
        fence.wait()
    }

    pub fn downgrade(&self) -> WeakDevice {
        WeakDevice {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same device.
    pub fn ptr_eq(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn context(&self) -> Result<Arc<ContextCore>> {
        self.inner
            .context
            .upgrade()
            .ok_or_else(|| Error::expired("device", "context"))
    }

    pub(crate) fn memory_resource(&self) -> Result<Arc<dyn MemoryResource>> {
        Ok(Arc::clone(self.context()?.memory_resource()))
    }

    pub(crate) fn issue_id(&self) -> Result<IdData> {
        Ok(self.context()?.issue_id())
    }

    pub(crate) fn variant(&self) -> &DeviceVariant {
        &self.inner.variant
    }

    pub(crate) fn as_cpu(&self) -> Option<&CpuDevice> {
        match &self.inner.variant {
            DeviceVariant::Cpu(cpu) => Some(cpu),
            #[cfg(feature = "vulkan")]
            _ => None,
        }
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn as_vulkan(&self) -> Option<&vulkan::VulkanDevice> {
        match &self.inner.variant {
            DeviceVariant::Vulkan(vk) => Some(vk),
            _ => None,
        }
    }

    /// Reserve a fence slot up front when the caller wants an async result.
    pub(crate) fn reserve_fence(&self, external_sync: bool) -> Result<Option<FenceSlot>> {
        if external_sync {
            self.inner.fences.acquire().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Either wait for `signal` or hand it back as an active fence.
    pub(crate) fn finish(&self, slot: Option<FenceSlot>, signal: Signal) -> Result<LaunchResult> {
        match slot {
            Some(slot) => Ok(LaunchResult::pending(Fence::activate(slot, signal))),
            None => {
                signal.wait()?;
                Ok(LaunchResult::completed())
            }
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("name", &self.inner.info.name())
            .finish()
    }
}
