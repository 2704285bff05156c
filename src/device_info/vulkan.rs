//! Capability snapshot of one Vulkan physical device, read through wgpu.

use super::cpu::system_memory;
use crate::memory::MemoryHeapInfo;
use std::fmt;

/// Bindings a kernel cannot use for buffers: the POD block.
pub const RESERVED_STORAGE_BINDINGS: usize = 1;

/// Preferred work-group size when the adapter allows it.
pub const DEFAULT_WORK_GROUP_SIZE: u32 = 64;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

pub struct VulkanDeviceInfo {
    adapter: wgpu::Adapter,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    features: wgpu::Features,
    extension_names: Vec<&'static str>,
    layer_names: Vec<&'static str>,
    heap_info_list: Vec<MemoryHeapInfo>,
}

impl VulkanDeviceInfo {
    pub fn new(adapter: wgpu::Adapter, flags: wgpu::InstanceFlags) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();
        let features = adapter.features();

        let mut extension_names: Vec<&'static str> =
            features.iter_names().map(|(name, _)| name).collect();
        extension_names.sort_unstable();

        let mut layer_names = Vec::new();
        if flags.contains(wgpu::InstanceFlags::VALIDATION) {
            layer_names.push(VALIDATION_LAYER);
        }
        layer_names.sort_unstable();

        let heap_info_list = synthesize_heaps(&info, &limits);

        tracing::debug!(
            name = %info.name,
            device_type = ?info.device_type,
            heaps = heap_info_list.len(),
            "fetched vulkan device info"
        );

        Self {
            adapter,
            info,
            limits,
            features,
            extension_names,
            layer_names,
            heap_info_list,
        }
    }

    /// Refresh the host-memory statistics in place.
    pub fn fetch(&self) {
        let (total, available) = system_memory();
        for heap in self.heap_info_list.iter().filter(|h| is_host_heap(&self.info, h)) {
            heap.set_total_size(total);
            heap.set_available_size(available);
        }
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub fn features(&self) -> wgpu::Features {
        self.features
    }

    pub fn device_type(&self) -> wgpu::DeviceType {
        self.info.device_type
    }

    /// Integrated and software adapters share memory with the host.
    pub fn is_unified_memory(&self) -> bool {
        is_unified(&self.info)
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn vendor_name(&self) -> &'static str {
        vendor_name(self.info.vendor)
    }

    pub fn heap_info_list(&self) -> &[MemoryHeapInfo] {
        &self.heap_info_list
    }

    pub fn max_allocation_size(&self) -> u64 {
        self.limits.max_buffer_size
    }

    pub fn max_num_of_buffers_per_kernel(&self) -> usize {
        (self.limits.max_storage_buffers_per_shader_stage as usize)
            .saturating_sub(RESERVED_STORAGE_BINDINGS)
            .min(crate::device_info::MAX_PARAMETERS_PER_KERNEL)
    }

    pub fn max_work_group_count(&self) -> [u32; 3] {
        [self.limits.max_compute_workgroups_per_dimension; 3]
    }

    pub fn work_group_size(&self) -> u32 {
        let limit = self.limits.max_compute_invocations_per_workgroup.max(1);
        let size = DEFAULT_WORK_GROUP_SIZE.min(limit);
        // round down to a power of two
        1 << (31 - size.leading_zeros())
    }

    pub fn is_extension_supported(&self, name: &str) -> bool {
        self.extension_names.binary_search(&name).is_ok()
    }

    pub fn is_layer_supported(&self, name: &str) -> bool {
        self.layer_names.binary_search(&name).is_ok()
    }

    pub fn extension_names(&self) -> &[&'static str] {
        &self.extension_names
    }

    pub fn layer_names(&self) -> &[&'static str] {
        &self.layer_names
    }
}

impl fmt::Debug for VulkanDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanDeviceInfo")
            .field("name", &self.info.name)
            .field("vendor", &self.vendor_name())
            .field("device_type", &self.info.device_type)
            .field("heap_info_list", &self.heap_info_list)
            .finish()
    }
}

pub fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x10DE => "NVIDIA",
        0x1002 => "AMD",
        0x8086 => "Intel",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x106B => "Apple",
        _ => "unknown",
    }
}

fn is_unified(info: &wgpu::AdapterInfo) -> bool {
    !matches!(
        info.device_type,
        wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::VirtualGpu
    )
}

fn is_host_heap(info: &wgpu::AdapterInfo, heap: &MemoryHeapInfo) -> bool {
    is_unified(info) || !heap.is_device_local()
}

// wgpu does not expose memory heaps; derive them from the adapter type.
fn synthesize_heaps(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Vec<MemoryHeapInfo> {
    let (host_total, host_available) = system_memory();
    if is_unified(info) {
        vec![MemoryHeapInfo::new(host_total, host_available, true)]
    } else {
        vec![
            MemoryHeapInfo::new(limits.max_buffer_size, limits.max_buffer_size, true),
            MemoryHeapInfo::new(host_total, host_available, false),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_names() {
        assert_eq!(vendor_name(0x10DE), "NVIDIA");
        assert_eq!(vendor_name(0x1002), "AMD");
        assert_eq!(vendor_name(0xFFFF), "unknown");
    }

    #[test]
    fn test_discrete_gpu_gets_two_heaps() {
        let info = wgpu::AdapterInfo {
            name: "test".to_string(),
            vendor: 0x10DE,
            device: 0,
            device_type: wgpu::DeviceType::DiscreteGpu,
            driver: String::new(),
            driver_info: String::new(),
            backend: wgpu::Backend::Vulkan,
        };
        let heaps = synthesize_heaps(&info, &wgpu::Limits::default());
        assert_eq!(heaps.len(), 2);
        assert!(heaps[0].is_device_local());
        assert!(!heaps[1].is_device_local());
    }

    #[test]
    fn test_integrated_gpu_gets_unified_heap() {
        let info = wgpu::AdapterInfo {
            name: "test".to_string(),
            vendor: 0x8086,
            device: 0,
            device_type: wgpu::DeviceType::IntegratedGpu,
            driver: String::new(),
            driver_info: String::new(),
            backend: wgpu::Backend::Vulkan,
        };
        let heaps = synthesize_heaps(&info, &wgpu::Limits::default());
        assert_eq!(heaps.len(), 1);
        assert!(heaps[0].is_device_local());
        assert!(is_host_heap(&info, &heaps[0]));
    }
}
