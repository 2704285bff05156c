//! Kernels: a signature, a CPU entry point and/or WGSL source, plus the
//! argument cache of the last launch.

pub mod arg;
mod cpu;
#[cfg(feature = "vulkan")]
mod vulkan;

use crate::device::fence::Signal;
use crate::device::{Device, DeviceVariant, LaunchResult, WeakDevice};
use crate::device_info::MAX_PARAMETERS_PER_KERNEL;
use crate::error::{Error, Result};
use crate::id::IdData;
use arg::{BoundBuffer, KernelArgCache, KernelSignature};
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

/// CPU entry point of a kernel with signature `S`. Called once per work
/// item.
pub type KernelFn<S> = for<'a> fn(&WorkItem, <S as KernelSignature>::Params<'a>);

/// Position of one work item within a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    global_id: [u32; 3],
    local_id: [u32; 3],
    group_id: [u32; 3],
    work_size: [u32; 3],
    work_group_size: [u32; 3],
    num_groups: [u32; 3],
    global_offset: [u32; 3],
}

impl WorkItem {
    fn new(global_id: [u32; 3], local_id: [u32; 3], group_id: [u32; 3], geometry: &Geometry) -> Self {
        Self {
            global_id,
            local_id,
            group_id,
            work_size: geometry.work_size,
            work_group_size: geometry.work_group_size,
            num_groups: geometry.num_groups,
            global_offset: geometry.global_offset,
        }
    }

    /// Global id along `dim`, including the launch's global id offset.
    pub fn global_id(&self, dim: usize) -> u32 {
        self.global_id[dim].wrapping_add(self.global_offset[dim])
    }

    /// Row-major index of the item in the work space, without the offset.
    pub fn global_linear_id(&self) -> usize {
        let [x, y, z] = self.global_id.map(|v| v as usize);
        let [w, h, _] = self.work_size.map(|v| v as usize);
        x + w * (y + h * z)
    }

    pub fn local_id(&self, dim: usize) -> u32 {
        self.local_id[dim]
    }

    pub fn local_linear_id(&self) -> usize {
        let [x, y, z] = self.local_id.map(|v| v as usize);
        let [w, h, _] = self.work_group_size.map(|v| v as usize);
        x + w * (y + h * z)
    }

    pub fn group_id(&self, dim: usize) -> u32 {
        self.group_id[dim]
    }

    pub fn work_size(&self, dim: usize) -> u32 {
        self.work_size[dim]
    }

    pub fn work_group_size(&self, dim: usize) -> u32 {
        self.work_group_size[dim]
    }

    pub fn num_groups(&self, dim: usize) -> u32 {
        self.num_groups[dim]
    }

    pub fn global_offset(&self, dim: usize) -> u32 {
        self.global_offset[dim]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub(crate) work_size: [u32; 3],
    pub(crate) work_group_size: [u32; 3],
    pub(crate) num_groups: [u32; 3],
    pub(crate) global_offset: [u32; 3],
}

impl Geometry {
    fn new(work_size: [u32; 3], work_group_size: [u32; 3], global_offset: [u32; 3]) -> Self {
        let mut num_groups = [1; 3];
        for ((groups, &size), &group) in num_groups.iter_mut().zip(&work_size).zip(&work_group_size) {
            *groups = size.div_ceil(group);
        }
        Self {
            work_size,
            work_group_size,
            num_groups,
            global_offset,
        }
    }

    pub(crate) fn total_groups(&self) -> usize {
        self.num_groups.iter().map(|&n| n as usize).product()
    }

    /// Split a row-major group index into coordinates.
    pub(crate) fn group_coords(&self, linear: usize) -> [u32; 3] {
        let [nx, ny, _] = self.num_groups.map(|n| n as usize);
        [
            (linear % nx) as u32,
            ((linear / nx) % ny) as u32,
            (linear / (nx * ny)) as u32,
        ]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.work_size.contains(&0)
    }
}

/// Everything needed to create a kernel.
pub struct KernelInit<S: KernelSignature> {
    pub name: String,
    /// Number of work-space axes, 1..=3.
    pub dimension: usize,
    /// Defaults to the device's work-group size split over `dimension`.
    pub work_group_size: Option<[u32; 3]>,
    pub cpu_entry: Option<KernelFn<S>>,
    pub wgsl_source: Option<String>,
    pub entry_point: String,
}

impl<S: KernelSignature> KernelInit<S> {
    pub fn new<N: Into<String>>(name: N, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            work_group_size: None,
            cpu_entry: None,
            wgsl_source: None,
            entry_point: "main".to_string(),
        }
    }

    pub fn cpu(mut self, entry: KernelFn<S>) -> Self {
        self.cpu_entry = Some(entry);
        self
    }

    pub fn wgsl<T: Into<String>, E: Into<String>>(mut self, source: T, entry_point: E) -> Self {
        self.wgsl_source = Some(source.into());
        self.entry_point = entry_point.into();
        self
    }

    pub fn work_group_size(mut self, size: [u32; 3]) -> Self {
        self.work_group_size = Some(size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.dimension) {
            return Err(Error::invalid_instruction(format!(
                "kernel '{}': dimension {} is not in 1..=3",
                self.name, self.dimension
            )));
        }
        if let Some(size) = self.work_group_size {
            if size.contains(&0) {
                return Err(Error::invalid_instruction(format!(
                    "kernel '{}': work group size {:?} has a zero axis",
                    self.name, size
                )));
            }
            if size[self.dimension..].iter().any(|&s| s != 1) {
                return Err(Error::invalid_instruction(format!(
                    "kernel '{}': work group size {:?} exceeds dimension {}",
                    self.name, size, self.dimension
                )));
            }
        }
        if S::NUM_OF_PARAMETERS > MAX_PARAMETERS_PER_KERNEL {
            return Err(Error::ParameterLimitExceeded {
                requested: S::NUM_OF_PARAMETERS,
                limit: MAX_PARAMETERS_PER_KERNEL,
            });
        }
        Ok(())
    }
}

impl<S: KernelSignature> Clone for KernelInit<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dimension: self.dimension,
            work_group_size: self.work_group_size,
            cpu_entry: self.cpu_entry,
            wgsl_source: self.wgsl_source.clone(),
            entry_point: self.entry_point.clone(),
        }
    }
}

impl<S: KernelSignature> fmt::Debug for KernelInit<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInit")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("work_group_size", &self.work_group_size)
            .field("cpu_entry", &self.cpu_entry.is_some())
            .field("wgsl_source", &self.wgsl_source.is_some())
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

/// Per-launch options.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Work items per axis. Axes past the kernel's dimension are ignored.
    pub work_size: [u32; 3],
    pub global_id_offset: [u32; 3],
    /// Return immediately with an active fence instead of blocking.
    pub external_sync_mode: bool,
    pub label: String,
    /// Incremented once per finished batch of work groups (CPU devices).
    pub progress: Option<Arc<AtomicUsize>>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            work_size: [1; 3],
            global_id_offset: [0; 3],
            external_sync_mode: false,
            label: String::new(),
            progress: None,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_size(mut self, size: [u32; 3]) -> Self {
        self.work_size = size;
        self
    }

    pub fn global_id_offset(mut self, offset: [u32; 3]) -> Self {
        self.global_id_offset = offset;
        self
    }

    pub fn external_sync_mode(mut self, enable: bool) -> Self {
        self.external_sync_mode = enable;
        self
    }

    pub fn label<L: Into<String>>(mut self, label: L) -> Self {
        self.label = label.into();
        self
    }

    pub fn progress(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.progress = Some(counter);
        self
    }
}

enum KernelBackend<S: KernelSignature> {
    Cpu(KernelFn<S>),
    #[cfg(feature = "vulkan")]
    Vulkan(vulkan::VulkanKernel),
}

/// A kernel bound to one device.
pub struct Kernel<S: KernelSignature> {
    id: IdData,
    device: WeakDevice,
    name: String,
    dimension: usize,
    work_group_size: [u32; 3],
    cache: KernelArgCache<S>,
    backend: KernelBackend<S>,
}

impl<S: KernelSignature> Kernel<S> {
    pub(crate) fn new(device: &Device, init: KernelInit<S>) -> Result<Self> {
        init.validate()?;

        let info = device.device_info();
        let limit = info.max_num_of_buffers_per_kernel();
        if S::NUM_OF_BUFFERS > limit {
            return Err(Error::ParameterLimitExceeded {
                requested: S::NUM_OF_BUFFERS,
                limit,
            });
        }

        let work_group_size = init
            .work_group_size
            .unwrap_or_else(|| info.work_group_size_dim(init.dimension));
        let id = device.issue_id()?;
        id.set_name(init.name.clone());

        let backend = match device.variant() {
            DeviceVariant::Cpu(_) => KernelBackend::Cpu(init.cpu_entry.ok_or_else(|| {
                Error::invalid_instruction(format!("kernel '{}' has no cpu entry point", init.name))
            })?),
            #[cfg(feature = "vulkan")]
            DeviceVariant::Vulkan(vk) => {
                let source = init.wgsl_source.as_deref().ok_or_else(|| {
                    Error::invalid_instruction(format!("kernel '{}' has no wgsl source", init.name))
                })?;
                let read_only = S::ARGS
                    .iter()
                    .filter(|arg| arg.is_buffer())
                    .map(|arg| arg.is_constant())
                    .collect();
                let mut pods = Vec::new();
                S::write_pods(&S::empty_values(), &mut pods);
                KernelBackend::Vulkan(vulkan::VulkanKernel::new(
                    vk,
                    &init.name,
                    source,
                    &init.entry_point,
                    read_only,
                    pods.len(),
                )?)
            }
        };

        tracing::debug!(
            id = id.id(),
            name = %init.name,
            args = S::NUM_OF_ARGS,
            buffers = S::NUM_OF_BUFFERS,
            locals = S::NUM_OF_LOCALS,
            pods = S::NUM_OF_PODS,
            ?work_group_size,
            "created kernel"
        );

        Ok(Self {
            id,
            device: device.downgrade(),
            name: init.name,
            dimension: init.dimension,
            work_group_size,
            cache: KernelArgCache::new(),
            backend,
        })
    }

    pub fn id(&self) -> &IdData {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn work_group_size(&self) -> [u32; 3] {
        self.work_group_size
    }

    pub fn device(&self) -> Result<Device> {
        self.device.get("kernel")
    }

    /// Arguments of the most recent launch.
    pub fn arg_cache(&self) -> &KernelArgCache<S> {
        &self.cache
    }

    /// Work-group batches a CPU launch with `options` is split into; the
    /// final value of [`LaunchOptions::progress`] after it finished.
    pub fn num_of_batches(&self, options: &LaunchOptions) -> Result<usize> {
        let device = self.device()?;
        let geometry = self.geometry(options);
        let batch = device.task_batch_size().unwrap_or(1);
        Ok(geometry.total_groups().div_ceil(batch))
    }

    /// Launch over `options.work_size` items.
    pub fn run(&mut self, inputs: S::Inputs<'_>, options: &LaunchOptions) -> Result<LaunchResult> {
        let device = self.device()?;
        let values = S::store(inputs);
        let bound = S::bound_buffers(&values);
        check_bound(&self.name, &bound)?;

        let geometry = self.geometry(options);
        let max = device.device_info().max_work_group_count();
        for (d, (&groups, &limit)) in geometry.num_groups.iter().zip(&max).enumerate() {
            if groups > limit {
                return Err(Error::invalid_instruction(format!(
                    "kernel '{}': {} groups on axis {} exceed the device limit {}",
                    self.name, groups, d, limit
                )));
            }
        }
        let changed = self.cache.update(values);
        if geometry.is_empty() {
            return Ok(LaunchResult::completed());
        }

        let slot = device.reserve_fence(options.external_sync_mode)?;
        let started = Instant::now();
        let signal = match (&mut self.backend, device.variant()) {
            (KernelBackend::Cpu(entry), DeviceVariant::Cpu(cpu)) => {
                let launch = cpu::Dispatch {
                    geometry,
                    progress: options.progress.clone(),
                    metrics: device.metrics_handle(),
                    started,
                };
                Signal::Cpu(cpu::dispatch::<S>(
                    cpu,
                    *entry,
                    self.cache.values(),
                    &bound,
                    launch,
                )?)
            }
            #[cfg(feature = "vulkan")]
            (KernelBackend::Vulkan(kernel), DeviceVariant::Vulkan(vk)) => {
                let mut pods = Vec::new();
                S::write_pods(self.cache.values(), &mut pods);
                kernel.dispatch(vk, &bound, &pods, changed, &geometry)?
            }
            #[cfg(feature = "vulkan")]
            _ => {
                return Err(Error::invalid_instruction(
                    "kernel backend does not match its device",
                ))
            }
        };

        device.metrics().record_kernel_launch();
        tracing::trace!(
            id = self.id.id(),
            name = %self.name,
            label = %options.label,
            changed,
            work_size = ?geometry.work_size,
            "launched kernel"
        );

        let result = device.finish(slot, signal)?;
        if !options.external_sync_mode && device.as_cpu().is_none() {
            device.metrics().record_launch_latency(started.elapsed());
        }
        Ok(result)
    }

    fn geometry(&self, options: &LaunchOptions) -> Geometry {
        let mut work_size = options.work_size;
        let mut offset = options.global_id_offset;
        for d in self.dimension..3 {
            work_size[d] = 1;
            offset[d] = 0;
        }
        Geometry::new(work_size, self.work_group_size, offset)
    }
}

/// Reject mapped buffers and storages bound both read-only and writable.
fn check_bound(name: &str, bound: &[BoundBuffer]) -> Result<()> {
    for (i, buffer) in bound.iter().enumerate() {
        if buffer.mapped {
            return Err(Error::invalid_instruction(format!(
                "kernel '{}': buffer {} is mapped",
                name, buffer.id
            )));
        }
        let conflict = bound[..i].iter().any(|other| {
            Arc::ptr_eq(&other.storage, &buffer.storage) && other.read_only != buffer.read_only
        });
        if conflict {
            return Err(Error::invalid_instruction(format!(
                "kernel '{}': buffer {} is bound as both constant and global",
                name, buffer.id
            )));
        }
    }
    Ok(())
}

impl<S: KernelSignature> fmt::Debug for Kernel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.id)
            .field("dimension", &self.dimension)
            .field("work_group_size", &self.work_group_size)
            .field("args", &S::NUM_OF_ARGS)
            .finish()
    }
}
