//! Entry point: owns the backends and hands out devices.

use crate::backend::{Backend, CpuBackend, DeviceSettings};
use crate::config::ContextOptions;
use crate::device::{Device, WeakDevice};
use crate::device_info::{BackendKind, DeviceInfo};
use crate::error::{Error, Result};
use crate::executor::ThreadManager;
use crate::id::IdData;
use crate::memory::{MemoryResource, SystemMemoryResource};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// State shared between a context and the objects it created.
#[derive(Debug)]
pub(crate) struct ContextCore {
    id_counter: AtomicI64,
    memory_resource: Arc<dyn MemoryResource>,
}

impl ContextCore {
    fn new(memory_resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            id_counter: AtomicI64::new(0),
            memory_resource,
        }
    }

    pub(crate) fn issue_id(&self) -> IdData {
        IdData::new(self.id_counter.fetch_add(1, Ordering::AcqRel))
    }

    pub(crate) fn memory_resource(&self) -> &Arc<dyn MemoryResource> {
        &self.memory_resource
    }
}

/// Create and initialize a context.
pub fn create_context(options: ContextOptions) -> Result<Context> {
    Context::new(options)
}

pub struct Context {
    core: Arc<ContextCore>,
    options: ContextOptions,
    backend_list: [Option<Backend>; 2],
    device_info_list: Vec<Arc<DeviceInfo>>,
    device_list: Mutex<Vec<WeakDevice>>,
}

impl Context {
    pub fn new(options: ContextOptions) -> Result<Self> {
        let mut context = Self {
            core: Arc::new(ContextCore::new(Arc::new(SystemMemoryResource))),
            options: options.clone(),
            backend_list: [None, None],
            device_info_list: Vec::new(),
            device_list: Mutex::new(Vec::new()),
        };
        context.initialize(options)?;
        Ok(context)
    }

    /// Tear down any previous state and bring the backends up again.
    ///
    /// Devices handed out before stay usable for data already on them, but
    /// operations needing the context report [`Error::ParentExpired`].
    pub fn initialize(&mut self, options: ContextOptions) -> Result<()> {
        self.destroy();
        options.validate()?;

        let memory_resource = options
            .memory_resource
            .clone()
            .unwrap_or_else(|| Arc::new(SystemMemoryResource));
        self.core = Arc::new(ContextCore::new(memory_resource));

        let cpu = CpuBackend::new(&options)?;
        self.backend_list[BackendKind::Cpu.slot()] = Some(Backend::Cpu(cpu));

        if options.enable_vulkan {
            self.initialize_vulkan(&options);
        }

        self.options = options;
        self.update_device_info()?;

        tracing::info!(
            cpu = self.has_backend(BackendKind::Cpu),
            vulkan = self.has_backend(BackendKind::Vulkan),
            devices = self.num_of_devices(),
            "context initialized"
        );
        Ok(())
    }

    #[cfg(feature = "vulkan")]
    fn initialize_vulkan(&mut self, options: &ContextOptions) {
        match crate::backend::VulkanBackend::new(options) {
            Ok(backend) => {
                self.backend_list[BackendKind::Vulkan.slot()] = Some(Backend::Vulkan(backend));
            }
            Err(e) => tracing::warn!(error = %e, "vulkan backend unavailable"),
        }
    }

    #[cfg(not(feature = "vulkan"))]
    fn initialize_vulkan(&mut self, _options: &ContextOptions) {
        tracing::warn!("vulkan requested but the crate was built without the `vulkan` feature");
    }

    /// Release every backend. Idempotent.
    pub fn destroy(&mut self) {
        let had_backends = self.backend_list.iter().any(Option::is_some);

        self.device_list.get_mut().clear();
        self.device_info_list.clear();
        self.backend_list = [None, None];

        // children hold weak references to the old core
        let memory_resource = Arc::clone(self.core.memory_resource());
        self.core = Arc::new(ContextCore::new(memory_resource));

        if had_backends {
            tracing::info!("context destroyed");
        }
    }

    /// Refresh every available backend and rebuild the aggregated device
    /// list. Memoized devices survive for records whose identity is
    /// unchanged.
    pub fn update_device_info(&mut self) -> Result<()> {
        let mut info_list = Vec::new();
        for backend in self.backend_list.iter_mut().flatten() {
            if !backend.is_available() {
                continue;
            }
            backend.update_device_info()?;
            info_list.extend(backend.device_info_list().iter().cloned());
        }

        let old_devices = std::mem::take(self.device_list.get_mut());
        let devices = info_list
            .iter()
            .enumerate()
            .map(|(i, info)| {
                let same = self
                    .device_info_list
                    .get(i)
                    .is_some_and(|old| Arc::ptr_eq(old, info));
                match old_devices.get(i) {
                    Some(weak) if same => weak.clone(),
                    _ => WeakDevice::new(),
                }
            })
            .collect();

        self.device_info_list = info_list;
        *self.device_list.get_mut() = devices;

        tracing::debug!(devices = self.device_info_list.len(), "updated device info");
        Ok(())
    }

    pub fn num_of_devices(&self) -> usize {
        self.device_info_list.len()
    }

    pub fn device_info_list(&self) -> &[Arc<DeviceInfo>] {
        &self.device_info_list
    }

    /// Device at `index`. Returns the live device if one was handed out
    /// and is still held somewhere, otherwise creates a new one.
    pub fn query_device(&self, index: usize) -> Result<Device> {
        // held across creation so concurrent queries observe one device
        let mut devices = self.device_list.lock();
        let len = devices.len();
        let slot = devices
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range("device", index, len))?;

        if let Some(device) = slot.upgrade() {
            return Ok(device);
        }

        let info = &self.device_info_list[index];
        let backend = self
            .backend(info.kind())
            .ok_or_else(|| Error::initialization(format!("{} backend is gone", info.kind())))?;
        let device = backend.create_device(info, &self.device_settings())?;
        *slot = device.downgrade();
        Ok(device)
    }

    pub fn has_backend(&self, kind: BackendKind) -> bool {
        self.backend(kind).is_some_and(Backend::is_available)
    }

    pub fn backend(&self, kind: BackendKind) -> Option<&Backend> {
        self.backend_list[kind.slot()].as_ref()
    }

    /// Issue an object id unique within this context.
    pub fn issue_id(&self) -> IdData {
        self.core.issue_id()
    }

    /// Pool used for CPU dispatch. `None` before initialization.
    pub fn thread_manager(&self) -> Option<&Arc<ThreadManager>> {
        match self.backend(BackendKind::Cpu) {
            Some(Backend::Cpu(cpu)) => Some(cpu.thread_manager()),
            _ => None,
        }
    }

    pub fn memory_resource(&self) -> &Arc<dyn MemoryResource> {
        self.core.memory_resource()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            context: Arc::downgrade(&self.core),
            fence_capacity: self.options.fence_capacity,
            task_batch_size: self.options.task_batch_size,
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.options)
            .field("backend_list", &self.backend_list)
            .field("num_of_devices", &self.num_of_devices())
            .finish()
    }
}
