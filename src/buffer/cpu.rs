//! Buffer operations on CPU storage, run on the device's thread manager.

use super::storage::{StorageReadGuard, StorageWriteGuard};
use crate::device::cpu::CpuDevice;
use crate::error::Result;
use crate::executor::TaskHandle;
use std::ptr;

/// Bytes handled by one task of a fill or copy.
const CHUNK_BYTES: usize = 256 * 1024;

#[derive(Clone, Copy)]
struct RawRegion {
    ptr: *mut u8,
}

// Tasks write disjoint chunks of the region.
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}

impl RawRegion {
    // by value, so closures capture the whole region rather than the raw field
    fn at(self, offset: usize) -> *mut u8 {
        self.ptr.wrapping_add(offset)
    }
}

/// Repeat `pattern` `count` times starting at `byte_offset`.
pub(crate) fn fill(
    cpu: &CpuDevice,
    guard: StorageWriteGuard,
    byte_offset: usize,
    pattern: Vec<u8>,
    count: usize,
) -> Result<TaskHandle> {
    let elem = pattern.len();
    let per_chunk = (CHUNK_BYTES / elem.max(1)).max(1);
    let chunks = count.div_ceil(per_chunk);
    let region = RawRegion {
        ptr: guard.host_ptr()?.wrapping_add(byte_offset),
    };

    cpu.submit_loop(
        move |chunk| {
            let _ = &guard;
            let first = chunk * per_chunk;
            let n = per_chunk.min(count - first);
            for i in first..first + n {
                unsafe {
                    ptr::copy_nonoverlapping(pattern.as_ptr(), region.at(i * elem), elem);
                }
            }
        },
        0,
        chunks,
    )
}

/// Copy `bytes` between two different storages.
pub(crate) fn copy(
    cpu: &CpuDevice,
    src: StorageReadGuard,
    dst: StorageWriteGuard,
    src_offset: usize,
    dst_offset: usize,
    bytes: usize,
) -> Result<TaskHandle> {
    let from = RawRegion {
        ptr: src.host_ptr()?.wrapping_add(src_offset),
    };
    let to = RawRegion {
        ptr: dst.host_ptr()?.wrapping_add(dst_offset),
    };
    let chunks = bytes.div_ceil(CHUNK_BYTES);

    cpu.submit_loop(
        move |chunk| {
            let _ = (&src, &dst);
            let start = chunk * CHUNK_BYTES;
            let n = CHUNK_BYTES.min(bytes - start);
            unsafe {
                ptr::copy_nonoverlapping(from.at(start), to.at(start), n);
            }
        },
        0,
        chunks,
    )
}

/// Copy within one storage; ranges may overlap.
pub(crate) fn copy_within(
    cpu: &CpuDevice,
    guard: StorageWriteGuard,
    src_offset: usize,
    dst_offset: usize,
    bytes: usize,
) -> Result<TaskHandle> {
    let base = RawRegion {
        ptr: guard.host_ptr()?,
    };

    cpu.submit(move || {
        let _ = &guard;
        unsafe {
            ptr::copy(base.at(src_offset), base.at(dst_offset), bytes);
        }
    })
}
