//! Buffer storage and transfers on a Vulkan device.
//!
//! wgpu forbids combining `MAP_READ` with `MAP_WRITE`, so host-visible
//! buffers keep a host mirror: mapping downloads into it and unmapping
//! uploads it back.

use crate::device::fence::Signal;
use crate::device::vulkan::VulkanDevice;
use crate::error::{Error, Result};
use crate::memory::{HostAllocation, MemoryResource};
use std::sync::{mpsc, Arc};

const ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

fn align_down(n: u64) -> u64 {
    n - n % ALIGN
}

fn align_up(n: u64) -> u64 {
    n.div_ceil(ALIGN) * ALIGN
}

fn is_aligned(n: u64) -> bool {
    n % ALIGN == 0
}

pub(crate) struct VulkanStorage {
    buffer: Option<wgpu::Buffer>,
    size: usize,
    mirror: Option<HostAllocation>,
}

impl VulkanStorage {
    pub(crate) fn empty(host_visible: bool, resource: &Arc<dyn MemoryResource>) -> Self {
        Self {
            buffer: None,
            size: 0,
            mirror: host_visible.then(|| HostAllocation::empty(Arc::clone(resource))),
        }
    }

    /// Fresh storage of `size` bytes. Contents start zeroed.
    pub(crate) fn new(
        vk: &VulkanDevice,
        size: usize,
        host_visible: bool,
        resource: &Arc<dyn MemoryResource>,
        label: &str,
    ) -> Result<Self> {
        if size == 0 {
            return Ok(Self::empty(host_visible, resource));
        }

        let padded = align_up(size as u64);
        let device = vk.device();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::allocation(format!(
                "vulkan buffer of {} bytes: {}",
                padded, error
            )));
        }

        let mirror = if host_visible {
            Some(HostAllocation::new(Arc::clone(resource), padded as usize)?)
        } else {
            None
        };

        Ok(Self {
            buffer: Some(buffer),
            size,
            mirror,
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn mirror(&self) -> Option<&HostAllocation> {
        self.mirror.as_ref()
    }

    pub(crate) fn mirror_mut(&mut self) -> Option<&mut HostAllocation> {
        self.mirror.as_mut()
    }

    /// Refresh the mirror from device memory.
    pub(crate) fn download_mirror(&mut self, vk: &VulkanDevice) -> Result<()> {
        let (Some(buffer), Some(mirror)) = (&self.buffer, &mut self.mirror) else {
            return Ok(());
        };
        let bytes = read_bytes(vk, buffer, 0, buffer.size())?;
        mirror.as_bytes_mut()[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Push the mirror to device memory. Visible to the next submission.
    pub(crate) fn upload_mirror(&self, vk: &VulkanDevice) {
        if let (Some(buffer), Some(mirror)) = (&self.buffer, &self.mirror) {
            let len = buffer.size() as usize;
            vk.queue().write_buffer(buffer, 0, &mirror.as_bytes()[..len]);
        }
    }

    pub(crate) fn require_buffer(&self) -> Result<&wgpu::Buffer> {
        self.buffer
            .as_ref()
            .ok_or_else(|| Error::invalid_instruction("empty vulkan buffer"))
    }
}

/// Blocking readback of an aligned range.
pub(crate) fn read_bytes(
    vk: &VulkanDevice,
    buffer: &wgpu::Buffer,
    offset: u64,
    size: u64,
) -> Result<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }

    let staging = vk.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("zivc-readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = vk.create_encoder("zivc-readback");
    encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
    vk.queue().submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    vk.device().poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| Error::invalid_instruction("map_async callback was not invoked"))?
        .map_err(|e| Error::invalid_instruction(format!("map_async failed: {}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}

/// Repeat `pattern` `count` times starting at `byte_offset`.
pub(crate) fn fill(
    vk: &VulkanDevice,
    storage: &VulkanStorage,
    byte_offset: usize,
    pattern: &[u8],
    count: usize,
) -> Result<Signal> {
    let mut encoder = vk.create_encoder("zivc-fill");
    if count == 0 {
        return Ok(vk.submit(encoder));
    }

    let buffer = storage.require_buffer()?;
    let offset = byte_offset as u64;
    let total = (pattern.len() * count) as u64;

    if is_aligned(offset) && is_aligned(total) {
        let staging = vk.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("zivc-fill-staging"),
            size: total,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        {
            let mut view = staging.slice(..).get_mapped_range_mut();
            for chunk in view.chunks_exact_mut(pattern.len()) {
                chunk.copy_from_slice(pattern);
            }
        }
        staging.unmap();
        encoder.copy_buffer_to_buffer(&staging, 0, buffer, offset, total);
    } else {
        // read-modify-write of the aligned window around the range
        let start = align_down(offset);
        let end = align_up(offset + total);
        let mut window = read_bytes(vk, buffer, start, end - start)?;
        let head = (offset - start) as usize;
        for chunk in window[head..head + total as usize].chunks_exact_mut(pattern.len()) {
            chunk.copy_from_slice(pattern);
        }
        vk.queue().write_buffer(buffer, start, &window);
    }

    Ok(vk.submit(encoder))
}

/// Copy `bytes` from `src` to `dst`, which may be the same storage.
pub(crate) fn copy(
    vk: &VulkanDevice,
    src: &VulkanStorage,
    dst: &VulkanStorage,
    src_offset: usize,
    dst_offset: usize,
    bytes: usize,
) -> Result<Signal> {
    let mut encoder = vk.create_encoder("zivc-copy");
    if bytes == 0 {
        return Ok(vk.submit(encoder));
    }

    let from = src.require_buffer()?;
    let to = dst.require_buffer()?;
    let (src_offset, dst_offset, bytes) = (src_offset as u64, dst_offset as u64, bytes as u64);
    let same = std::ptr::eq(src, dst);

    if is_aligned(src_offset) && is_aligned(dst_offset) && is_aligned(bytes) {
        if same {
            let temp = vk.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some("zivc-copy-temp"),
                size: bytes,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            encoder.copy_buffer_to_buffer(from, src_offset, &temp, 0, bytes);
            encoder.copy_buffer_to_buffer(&temp, 0, to, dst_offset, bytes);
        } else {
            encoder.copy_buffer_to_buffer(from, src_offset, to, dst_offset, bytes);
        }
    } else {
        let src_start = align_down(src_offset);
        let src_window = read_bytes(vk, from, src_start, align_up(src_offset + bytes) - src_start)?;
        let dst_start = align_down(dst_offset);
        let mut dst_window = read_bytes(vk, to, dst_start, align_up(dst_offset + bytes) - dst_start)?;

        let s = (src_offset - src_start) as usize;
        let d = (dst_offset - dst_start) as usize;
        let n = bytes as usize;
        dst_window[d..d + n].copy_from_slice(&src_window[s..s + n]);
        vk.queue().write_buffer(to, dst_start, &dst_window);
    }

    Ok(vk.submit(encoder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_down(7), 4);
        assert_eq!(align_up(7), 8);
        assert_eq!(align_up(8), 8);
        assert!(is_aligned(12));
        assert!(!is_aligned(6));
    }
}
