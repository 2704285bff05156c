//! Work-group dispatch on the CPU thread manager.

use super::arg::{BoundBuffer, KernelSignature, RawSlice};
use super::{Geometry, KernelFn, WorkItem};
use crate::buffer::storage::{lock_shared, SharedStorage};
use crate::device::cpu::CpuDevice;
use crate::error::Result;
use crate::executor::TaskHandle;
use crate::telemetry::DeviceMetrics;
use crate::util::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-launch state shared by the worker tasks.
pub(crate) struct Dispatch {
    pub(crate) geometry: Geometry,
    pub(crate) progress: Option<Arc<AtomicUsize>>,
    pub(crate) metrics: Arc<DeviceMetrics>,
    pub(crate) started: Instant,
}

/// Split the group space into batches of `task_batch_size` groups and start
/// one task per worker. Tasks claim batches until none are left.
pub(crate) fn dispatch<S: KernelSignature>(
    cpu: &CpuDevice,
    entry: KernelFn<S>,
    values: &S::Values,
    bound: &[BoundBuffer],
    launch: Dispatch,
) -> Result<TaskHandle> {
    let storages: Vec<SharedStorage> = bound.iter().map(|b| Arc::clone(&b.storage)).collect();
    let (guards, slots) = lock_shared(&storages);
    let slices = slots
        .iter()
        .map(|&slot| {
            let storage = &guards[slot];
            Ok(RawSlice {
                ptr: storage.host_ptr()?,
                len: storage.size_in_bytes(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let prepared = S::prepare(values, &slices);

    let Dispatch {
        geometry,
        progress,
        metrics,
        started,
    } = launch;
    let total_groups = geometry.total_groups();
    let batch_size = cpu.task_batch_size();
    let num_batches = total_groups.div_ceil(batch_size);
    let num_tasks = cpu.num_of_threads()?.min(num_batches).max(1);

    let next = Arc::new(CachePadded::new(AtomicUsize::new(0)));
    let running = Arc::new(AtomicUsize::new(num_tasks));

    tracing::trace!(total_groups, num_batches, num_tasks, "cpu dispatch");

    cpu.submit_loop(
        move |_| {
            // storages stay read-locked until the last task is gone
            let _ = &guards;
            let scratch = S::new_scratch();
            loop {
                let batch = next.fetch_add(1, Ordering::Relaxed);
                if batch >= num_batches {
                    break;
                }
                let first = batch * batch_size;
                let last = (first + batch_size).min(total_groups);

                let mut items = 0;
                for group in first..last {
                    S::reset_scratch(&scratch);
                    let params = unsafe { S::params(prepared, &scratch) };
                    items += run_group::<S>(entry, params, &geometry, group);
                }
                metrics.record_batch(items);
                if let Some(progress) = &progress {
                    progress.fetch_add(1, Ordering::Release);
                }
            }
            if running.fetch_sub(1, Ordering::AcqRel) == 1 {
                metrics.record_launch_latency(started.elapsed());
            }
        },
        0,
        num_tasks,
    )
}

/// Run every in-range item of one group, in local-id order.
fn run_group<S: KernelSignature>(
    entry: KernelFn<S>,
    params: S::Params<'_>,
    geometry: &Geometry,
    group: usize,
) -> u64 {
    let group_id = geometry.group_coords(group);
    let size = geometry.work_group_size;
    let mut count = 0;

    for z in 0..size[2] {
        for y in 0..size[1] {
            for x in 0..size[0] {
                let local_id = [x, y, z];
                let mut global_id = [0u32; 3];
                let mut in_range = true;
                for d in 0..3 {
                    let id = u64::from(group_id[d]) * u64::from(size[d]) + u64::from(local_id[d]);
                    in_range &= id < u64::from(geometry.work_size[d]);
                    global_id[d] = id as u32;
                }
                if !in_range {
                    continue;
                }

                let item = WorkItem::new(global_id, local_id, group_id, geometry);
                entry(&item, params);
                count += 1;
            }
        }
    }
    count
}
