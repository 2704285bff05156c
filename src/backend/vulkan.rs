use super::DeviceSettings;
use crate::config::ContextOptions;
use crate::device::vulkan::VulkanDevice;
use crate::device::{Device, DeviceVariant};
use crate::device_info::{DeviceInfo, VulkanDeviceInfo};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Backend driving Vulkan compute devices through wgpu.
pub struct VulkanBackend {
    instance: wgpu::Instance,
    flags: wgpu::InstanceFlags,
    device_filter: Option<String>,
    device_info_list: Vec<Arc<DeviceInfo>>,
}

impl VulkanBackend {
    pub fn new(options: &ContextOptions) -> Result<Self> {
        let flags = if options.enable_debug {
            wgpu::InstanceFlags::DEBUG | wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let mut backend = Self {
            instance,
            flags,
            device_filter: options.vulkan_device_filter.clone(),
            device_info_list: Vec::new(),
        };
        backend.update_device_info()?;

        if backend.device_info_list.is_empty() {
            return Err(Error::backend_initialization("no vulkan adapter found"));
        }
        Ok(backend)
    }

    pub fn device_info_list(&self) -> &[Arc<DeviceInfo>] {
        &self.device_info_list
    }

    pub fn instance_flags(&self) -> wgpu::InstanceFlags {
        self.flags
    }

    /// Re-enumerate adapters. Records whose adapter is unchanged are
    /// refreshed in place, otherwise the list is rebuilt.
    pub fn update_device_info(&mut self) -> Result<()> {
        let adapters: Vec<wgpu::Adapter> = self
            .instance
            .enumerate_adapters(wgpu::Backends::VULKAN)
            .into_iter()
            .filter(|adapter| self.accepts(&adapter.get_info()))
            .collect();

        let unchanged = adapters.len() == self.device_info_list.len()
            && adapters
                .iter()
                .zip(&self.device_info_list)
                .all(|(adapter, info)| {
                    info.as_vulkan()
                        .is_some_and(|vk| *vk.adapter_info() == adapter.get_info())
                });

        if unchanged {
            for info in &self.device_info_list {
                info.fetch();
            }
        } else {
            self.device_info_list = adapters
                .into_iter()
                .map(|adapter| Arc::new(DeviceInfo::Vulkan(VulkanDeviceInfo::new(adapter, self.flags))))
                .collect();
        }

        tracing::debug!(devices = self.device_info_list.len(), "enumerated vulkan devices");
        Ok(())
    }

    pub(crate) fn create_device(
        &self,
        info: &Arc<DeviceInfo>,
        settings: &DeviceSettings,
    ) -> Result<Device> {
        let vk_info = info
            .as_vulkan()
            .ok_or_else(|| Error::initialization("not a vulkan device info"))?;
        let context = settings
            .context
            .upgrade()
            .ok_or_else(|| Error::expired("backend", "context"))?;

        let id = context.issue_id();
        let vk = VulkanDevice::new(vk_info, &format!("zivc-device-{}", id.id()))?;

        Ok(Device::new(
            id,
            settings.context.clone(),
            Arc::clone(info),
            settings.fence_capacity,
            DeviceVariant::Vulkan(vk),
        ))
    }

    fn accepts(&self, info: &wgpu::AdapterInfo) -> bool {
        match &self.device_filter {
            Some(filter) => info.name.to_lowercase().contains(&filter.to_lowercase()),
            None => true,
        }
    }
}

impl fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("flags", &self.flags)
            .field("device_filter", &self.device_filter)
            .field("device_info_list", &self.device_info_list)
            .finish()
    }
}
