//! ZIVC - heterogeneous compute over a CPU thread pool and Vulkan
//!
//! One kernel description, one buffer API, two kinds of device: a CPU device
//! backed by a work-stealing thread pool, and (with the `vulkan` feature) GPU
//! devices driven through wgpu.
//!
//! # Quick Start
//!
//! ```no_run
//! use zivc_rs::prelude::*;
//!
//! fn scale(item: &WorkItem, (data, factor): (GlobalPtr<f32>, f32)) {
//!     let i = item.global_id(0) as usize;
//!     unsafe { *data.unsafe_index_mut(i) *= factor };
//! }
//!
//! let context = create_context(ContextOptions::default()).unwrap();
//! let device = context.query_device(0).unwrap();
//!
//! let data = device.make_buffer::<f32>(BufferUsage::PreferHost).unwrap();
//! data.set_size(1024).unwrap();
//! data.fill(1.5, &BufferLaunchOptions::new()).unwrap();
//!
//! let mut kernel = device
//!     .create_kernel(KernelInit::<(Global<f32>, f32)>::new("scale", 1).cpu(scale))
//!     .unwrap();
//! kernel
//!     .run((&data, 2.0), &LaunchOptions::new().work_size([1024, 1, 1]))
//!     .unwrap();
//!
//! assert!(data.map_memory().unwrap().iter().all(|&v| v == 3.0));
//! ```
//!
//! # Features
//!
//! - **Context / Device**: backend enumeration, memoized device handles,
//!   per-device fence pools and heap usage accounting
//! - **Typed Buffers**: placement hints, host mapping, fill and copy with
//!   sub-ranges, synchronous or fenced
//! - **Kernel Arguments**: signatures classified and packed at compile time
//! - **CPU Dispatch**: work groups claimed in batches by worker threads
//! - **Vulkan**: WGSL compute pipelines through wgpu (feature `vulkan`)
//! - **Telemetry**: per-device launch counters and latency histograms

#![warn(missing_debug_implementations)]

pub mod backend;
pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod device_info;
pub mod error;
pub mod executor;
pub mod id;
pub mod kernel;
pub mod memory;
pub mod prelude;
pub mod telemetry;
pub mod util;

pub use buffer::{copy, Buffer, BufferFlags, BufferLaunchOptions, BufferUsage, MemoryProperties};
pub use config::{ContextOptions, ContextOptionsBuilder};
pub use context::{create_context, Context};
pub use device::{Device, Fence, LaunchResult, WeakDevice};
pub use device_info::{BackendKind, DeviceInfo};
pub use error::{Error, Result};
pub use kernel::{Kernel, KernelInit, LaunchOptions, WorkItem};

#[doc(hidden)]
pub mod __private {
    pub use bytemuck;
}
