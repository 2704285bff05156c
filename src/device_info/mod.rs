//! Capability records produced by backend enumeration.

pub mod cpu;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use cpu::CpuDeviceInfo;
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanDeviceInfo;

use crate::memory::MemoryHeapInfo;
use std::fmt;

/// Global ceiling on the buffers a single kernel may take.
pub const MAX_PARAMETERS_PER_KERNEL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Cpu,
    Vulkan,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Cpu, BackendKind::Vulkan];

    pub(crate) fn slot(self) -> usize {
        match self {
            BackendKind::Cpu => 0,
            BackendKind::Vulkan => 1,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cpu => f.write_str("cpu"),
            BackendKind::Vulkan => f.write_str("vulkan"),
        }
    }
}

/// Static capability snapshot of one compute device.
///
/// Owned by the backend that enumerated it and refreshed in place by
/// [`DeviceInfo::fetch`].
#[derive(Debug)]
pub enum DeviceInfo {
    Cpu(CpuDeviceInfo),
    #[cfg(feature = "vulkan")]
    Vulkan(VulkanDeviceInfo),
}

macro_rules! dispatch {
    ($self:expr, $info:ident => $body:expr) => {
        match $self {
            DeviceInfo::Cpu($info) => $body,
            #[cfg(feature = "vulkan")]
            DeviceInfo::Vulkan($info) => $body,
        }
    };
}

impl DeviceInfo {
    pub fn kind(&self) -> BackendKind {
        match self {
            DeviceInfo::Cpu(_) => BackendKind::Cpu,
            #[cfg(feature = "vulkan")]
            DeviceInfo::Vulkan(_) => BackendKind::Vulkan,
        }
    }

    /// Re-read the platform statistics. Safe to call repeatedly.
    pub fn fetch(&self) {
        dispatch!(self, info => info.fetch())
    }

    pub fn name(&self) -> &str {
        dispatch!(self, info => info.name())
    }

    pub fn vendor_name(&self) -> &str {
        dispatch!(self, info => info.vendor_name())
    }

    pub fn heap_info_list(&self) -> &[MemoryHeapInfo] {
        dispatch!(self, info => info.heap_info_list())
    }

    pub fn max_allocation_size(&self) -> u64 {
        dispatch!(self, info => info.max_allocation_size())
    }

    pub fn max_num_of_buffers_per_kernel(&self) -> usize {
        dispatch!(self, info => info.max_num_of_buffers_per_kernel()).min(MAX_PARAMETERS_PER_KERNEL)
    }

    pub fn max_work_group_count(&self) -> [u32; 3] {
        dispatch!(self, info => info.max_work_group_count())
    }

    /// Total invocations of one work group. Always a power of two.
    pub fn work_group_size(&self) -> u32 {
        dispatch!(self, info => info.work_group_size())
    }

    /// Split [`work_group_size`](Self::work_group_size) over `dimension` axes.
    pub fn work_group_size_dim(&self, dimension: usize) -> [u32; 3] {
        split_work_group_size(self.work_group_size(), dimension)
    }

    pub fn as_cpu(&self) -> Option<&CpuDeviceInfo> {
        match self {
            DeviceInfo::Cpu(info) => Some(info),
            #[cfg(feature = "vulkan")]
            _ => None,
        }
    }

    #[cfg(feature = "vulkan")]
    pub fn as_vulkan(&self) -> Option<&VulkanDeviceInfo> {
        match self {
            DeviceInfo::Vulkan(info) => Some(info),
            _ => None,
        }
    }
}

/// Distribute a power-of-two group size over the first `dimension` axes,
/// larger shares first.
pub fn split_work_group_size(size: u32, dimension: usize) -> [u32; 3] {
    let dimension = dimension.clamp(1, 3);
    let mut exponent = size.max(1).trailing_zeros();
    let mut out = [1u32; 3];
    for (axis, slot) in out.iter_mut().enumerate().take(dimension) {
        let remaining_axes = (dimension - axis) as u32;
        let share = (exponent + remaining_axes - 1) / remaining_axes;
        *slot = 1 << share;
        exponent -= share;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_work_group_size() {
        assert_eq!(split_work_group_size(128, 1), [128, 1, 1]);
        assert_eq!(split_work_group_size(128, 2), [16, 8, 1]);
        assert_eq!(split_work_group_size(128, 3), [8, 4, 4]);
        assert_eq!(split_work_group_size(64, 3), [4, 4, 4]);
        assert_eq!(split_work_group_size(1, 3), [1, 1, 1]);
    }

    #[test]
    fn test_split_preserves_total() {
        for exp in 0..11 {
            let size = 1u32 << exp;
            for dim in 1..=3 {
                let [x, y, z] = split_work_group_size(size, dim);
                assert_eq!(x * y * z, size);
            }
        }
    }

    #[test]
    fn test_cpu_dispatch() {
        let info = DeviceInfo::Cpu(CpuDeviceInfo::new(2));
        assert_eq!(info.kind(), BackendKind::Cpu);
        assert_eq!(info.work_group_size_dim(3), [1, 1, 1]);
        assert_eq!(info.max_num_of_buffers_per_kernel(), 256);
        assert!(info.as_cpu().is_some());
        info.fetch();
    }
}
