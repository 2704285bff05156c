//! Compute backends: device enumeration and device instantiation.

pub mod cpu;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use cpu::CpuBackend;
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;

use crate::context::ContextCore;
use crate::device::Device;
use crate::device_info::{BackendKind, DeviceInfo};
use crate::error::{Error, Result};
use std::sync::{Arc, Weak};

/// Per-context settings every created device inherits.
#[derive(Debug, Clone)]
pub(crate) struct DeviceSettings {
    pub context: Weak<ContextCore>,
    pub fence_capacity: usize,
    pub task_batch_size: usize,
}

#[derive(Debug)]
pub enum Backend {
    Cpu(CpuBackend),
    #[cfg(feature = "vulkan")]
    Vulkan(VulkanBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Cpu(_) => BackendKind::Cpu,
            #[cfg(feature = "vulkan")]
            Backend::Vulkan(_) => BackendKind::Vulkan,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.device_info_list().is_empty()
    }

    pub fn device_info_list(&self) -> &[Arc<DeviceInfo>] {
        match self {
            Backend::Cpu(b) => b.device_info_list(),
            #[cfg(feature = "vulkan")]
            Backend::Vulkan(b) => b.device_info_list(),
        }
    }

    pub fn num_of_devices(&self) -> usize {
        self.device_info_list().len()
    }

    /// Refresh the device records. Safe to call any number of times.
    pub fn update_device_info(&mut self) -> Result<()> {
        match self {
            Backend::Cpu(b) => {
                b.update_device_info();
                Ok(())
            }
            #[cfg(feature = "vulkan")]
            Backend::Vulkan(b) => b.update_device_info(),
        }
    }

    /// Instantiate a device for `info`, which must be one of this backend's
    /// own records.
    pub(crate) fn create_device(
        &self,
        info: &Arc<DeviceInfo>,
        settings: &DeviceSettings,
    ) -> Result<Device> {
        if !self
            .device_info_list()
            .iter()
            .any(|owned| Arc::ptr_eq(owned, info))
        {
            return Err(Error::initialization(format!(
                "device info '{}' does not belong to the {} backend",
                info.name(),
                self.kind()
            )));
        }

        let device = match self {
            Backend::Cpu(b) => b.create_device(info, settings)?,
            #[cfg(feature = "vulkan")]
            Backend::Vulkan(b) => b.create_device(info, settings)?,
        };

        tracing::debug!(
            backend = %self.kind(),
            device = info.name(),
            id = device.id().id(),
            "created device"
        );
        Ok(device)
    }
}
