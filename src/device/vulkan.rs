//! Vulkan device: one wgpu logical device plus its queue.

use super::fence::Signal;
use crate::device_info::VulkanDeviceInfo;
use crate::error::{Error, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) struct VulkanDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl VulkanDevice {
    pub(crate) fn new(info: &VulkanDeviceInfo, label: &str) -> Result<Self> {
        let adapter = info.adapter();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| Error::initialization(format!("failed to create vulkan device: {}", e)))?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured vulkan error");
        }));

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub(crate) fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(crate) fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit recorded commands and return a handle that signals on
    /// completion.
    pub(crate) fn submit(&self, encoder: wgpu::CommandEncoder) -> Signal {
        let index = self.queue.submit(Some(encoder.finish()));
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        self.queue.on_submitted_work_done(move || {
            flag.store(true, std::sync::atomic::Ordering::Release);
        });

        Signal::Vulkan {
            device: Arc::clone(&self.device),
            index,
            done,
        }
    }

    pub(crate) fn wait_for_completion(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}
