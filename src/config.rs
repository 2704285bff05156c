use crate::error::{Error, Result};
use crate::memory::MemoryResource;
use std::fmt;
use std::sync::Arc;

/// Hard ceiling for `num_threads`.
pub const MAX_THREADS: usize = 1024;

/// Hard ceiling for the CPU task batch size.
pub const MAX_TASK_BATCH_SIZE: usize = 1024;

#[derive(Clone)]
pub struct ContextOptions {
    pub num_threads: Option<usize>,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub pin_workers: bool,

    pub enable_vulkan: bool,
    pub enable_debug: bool,
    pub vulkan_device_filter: Option<String>,

    pub fence_capacity: usize,
    pub task_batch_size: usize,

    pub memory_resource: Option<Arc<dyn MemoryResource>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name_prefix: "zivc-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
            pin_workers: false,

            enable_vulkan: false,
            enable_debug: false,
            vulkan_device_filter: None,

            fence_capacity: 64,
            task_batch_size: 32,

            memory_resource: None,
        }
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("num_threads", &self.num_threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("stack_size", &self.stack_size)
            .field("pin_workers", &self.pin_workers)
            .field("enable_vulkan", &self.enable_vulkan)
            .field("enable_debug", &self.enable_debug)
            .field("vulkan_device_filter", &self.vulkan_device_filter)
            .field("fence_capacity", &self.fence_capacity)
            .field("task_batch_size", &self.task_batch_size)
            .field("memory_resource", &self.memory_resource.is_some())
            .finish()
    }
}

impl ContextOptions {
    pub fn builder() -> ContextOptionsBuilder {
        ContextOptionsBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
            if n > MAX_THREADS {
                return Err(Error::config(format!(
                    "num_threads too large (max {})",
                    MAX_THREADS
                )));
            }
        }

        if self.fence_capacity == 0 {
            return Err(Error::config("fence_capacity must be > 0"));
        }

        if self.task_batch_size == 0 || self.task_batch_size > MAX_TASK_BATCH_SIZE {
            return Err(Error::config(format!(
                "task_batch_size must be in 1..={}",
                MAX_TASK_BATCH_SIZE
            )));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct ContextOptionsBuilder {
    options: ContextOptions,
}

impl ContextOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ContextOptions::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.options.num_threads = Some(n);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.options.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.options.stack_size = Some(size);
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.options.pin_workers = pin;
        self
    }

    pub fn enable_vulkan(mut self, enable: bool) -> Self {
        self.options.enable_vulkan = enable;
        self
    }

    pub fn enable_debug(mut self, enable: bool) -> Self {
        self.options.enable_debug = enable;
        self
    }

    pub fn vulkan_device_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.options.vulkan_device_filter = Some(filter.into());
        self
    }

    pub fn fence_capacity(mut self, capacity: usize) -> Self {
        self.options.fence_capacity = capacity;
        self
    }

    pub fn task_batch_size(mut self, size: usize) -> Self {
        self.options.task_batch_size = size;
        self
    }

    pub fn memory_resource(mut self, resource: Arc<dyn MemoryResource>) -> Self {
        self.options.memory_resource = Some(resource);
        self
    }

    pub fn build(self) -> Result<ContextOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = ContextOptions::default();
        assert!(options.validate().is_ok());
        assert!(!options.enable_vulkan);
        assert!(options.worker_threads() >= 1);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(ContextOptions::builder().num_threads(0).build().is_err());
        assert!(ContextOptions::builder().num_threads(4096).build().is_err());
        assert!(ContextOptions::builder().fence_capacity(0).build().is_err());
        assert!(ContextOptions::builder().task_batch_size(2048).build().is_err());
        assert!(ContextOptions::builder().thread_name_prefix("").build().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let options = ContextOptions::builder()
            .num_threads(3)
            .enable_vulkan(true)
            .fence_capacity(8)
            .task_batch_size(16)
            .build()
            .unwrap();

        assert_eq!(options.worker_threads(), 3);
        assert!(options.enable_vulkan);
        assert_eq!(options.fence_capacity, 8);
        assert_eq!(options.task_batch_size, 16);
    }
}
