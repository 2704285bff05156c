use super::DeviceSettings;
use crate::config::ContextOptions;
use crate::device::cpu::CpuDevice;
use crate::device::{Device, DeviceVariant};
use crate::device_info::{CpuDeviceInfo, DeviceInfo};
use crate::error::{Error, Result};
use crate::executor::ThreadManager;
use std::sync::Arc;

/// Backend running kernels on the host through a work-stealing pool.
#[derive(Debug)]
pub struct CpuBackend {
    thread_manager: Arc<ThreadManager>,
    device_info_list: Vec<Arc<DeviceInfo>>,
}

impl CpuBackend {
    pub fn new(options: &ContextOptions) -> Result<Self> {
        let thread_manager = Arc::new(ThreadManager::new(options)?);
        let info = CpuDeviceInfo::new(thread_manager.num_of_threads());

        Ok(Self {
            thread_manager,
            device_info_list: vec![Arc::new(DeviceInfo::Cpu(info))],
        })
    }

    pub fn thread_manager(&self) -> &Arc<ThreadManager> {
        &self.thread_manager
    }

    pub fn device_info_list(&self) -> &[Arc<DeviceInfo>] {
        &self.device_info_list
    }

    pub fn update_device_info(&self) {
        for info in &self.device_info_list {
            info.fetch();
        }
    }

    pub(crate) fn create_device(
        &self,
        info: &Arc<DeviceInfo>,
        settings: &DeviceSettings,
    ) -> Result<Device> {
        let context = settings
            .context
            .upgrade()
            .ok_or_else(|| Error::expired("backend", "context"))?;

        let min_work_group_size = info.work_group_size() as usize;
        let cpu = CpuDevice::new(
            &self.thread_manager,
            settings.task_batch_size,
            min_work_group_size,
        );

        Ok(Device::new(
            context.issue_id(),
            settings.context.clone(),
            Arc::clone(info),
            settings.fence_capacity,
            DeviceVariant::Cpu(cpu),
        ))
    }
}
