//! Compute pipelines on a Vulkan device.
//!
//! Binding layout of group 0, for a kernel with `n` buffer arguments:
//!
//! | binding | contents |
//! |---|---|
//! | `0..n` | buffer arguments in declaration order; constant ones read-only |
//! | `n` | POD block, read-only storage, each value aligned to `max(align, 4)` |
//! | `n + 1` | launch info uniform: `global_offset` and `work_size` as `vec4<u32>` |
//!
//! Local arguments become `var<workgroup>` declarations in the shader and
//! are not bound.

use super::arg::BoundBuffer;
use super::Geometry;
use crate::buffer::storage::{lock_shared, SharedStorage};
use crate::device::fence::Signal;
use crate::device::vulkan::VulkanDevice;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::sync::Arc;

const MIN_POD_BLOCK_SIZE: u64 = 16;
const LAUNCH_INFO_SIZE: u64 = 32;

pub(crate) struct VulkanKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    pod_block: wgpu::Buffer,
    launch_info: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
    read_only: Vec<bool>,
    label: String,
}

impl VulkanKernel {
    /// Compile `source` and build the pipeline. `read_only` flags each buffer
    /// argument; `pod_size` is the size of the packed POD block.
    pub(crate) fn new(
        vk: &VulkanDevice,
        label: &str,
        source: &str,
        entry_point: &str,
        read_only: Vec<bool>,
        pod_size: usize,
    ) -> Result<Self> {
        let device = vk.device();
        let num_buffers = read_only.len() as u32;

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = read_only
            .iter()
            .enumerate()
            .map(|(binding, &read_only)| storage_entry(binding as u32, read_only))
            .collect();
        entries.push(storage_entry(num_buffers, true));
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: num_buffers + 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::initialization(format!(
                "failed to build kernel '{}': {}",
                label, error
            )));
        }

        let pod_block = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("zivc-pod-block"),
            size: (pod_size as u64).next_multiple_of(4).max(MIN_POD_BLOCK_SIZE),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let launch_info = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("zivc-launch-info"),
            size: LAUNCH_INFO_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            layout,
            pod_block,
            launch_info,
            bind_group: None,
            read_only,
            label: label.to_string(),
        })
    }

    /// Record and submit one dispatch. The bind group and POD block are
    /// rebuilt only when `changed` says the arguments differ from the last
    /// launch.
    pub(crate) fn dispatch(
        &mut self,
        vk: &VulkanDevice,
        bound: &[BoundBuffer],
        pods: &[u8],
        changed: bool,
        geometry: &Geometry,
    ) -> Result<Signal> {
        if bound.len() != self.read_only.len() {
            return Err(Error::invalid_instruction(format!(
                "kernel '{}' expects {} buffers, got {}",
                self.label,
                self.read_only.len(),
                bound.len()
            )));
        }

        if changed || self.bind_group.is_none() {
            let storages: Vec<SharedStorage> =
                bound.iter().map(|b| Arc::clone(&b.storage)).collect();
            let (guards, slots) = lock_shared(&storages);
            let buffers = slots
                .iter()
                .map(|&slot| guards[slot].as_vulkan()?.require_buffer())
                .collect::<Result<Vec<_>>>()?;

            let mut entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .enumerate()
                .map(|(binding, buffer)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32,
                resource: self.pod_block.as_entire_binding(),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32 + 1,
                resource: self.launch_info.as_entire_binding(),
            });

            self.bind_group = Some(vk.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&self.label),
                layout: &self.layout,
                entries: &entries,
            }));

            if !pods.is_empty() {
                let mut block = pods.to_vec();
                block.resize(pods.len().next_multiple_of(4), 0);
                vk.queue().write_buffer(&self.pod_block, 0, &block);
            }
        }

        let info: [u32; 8] = [
            geometry.global_offset[0],
            geometry.global_offset[1],
            geometry.global_offset[2],
            0,
            geometry.work_size[0],
            geometry.work_size[1],
            geometry.work_size[2],
            0,
        ];
        vk.queue()
            .write_buffer(&self.launch_info, 0, bytemuck::cast_slice(&info));

        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| Error::invalid_instruction("kernel has no bind group"))?;

        let mut encoder = vk.create_encoder(&self.label);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            let [x, y, z] = geometry.num_groups;
            pass.dispatch_workgroups(x, y, z);
        }
        Ok(vk.submit(encoder))
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
