pub use crate::buffer::{copy, Buffer, BufferFlags, BufferLaunchOptions, BufferUsage, MappedMemory};
pub use crate::config::{ContextOptions, ContextOptionsBuilder};
pub use crate::context::{create_context, Context};
pub use crate::device::{Device, Fence, LaunchResult};
pub use crate::device_info::{BackendKind, DeviceInfo};
pub use crate::error::{Error, Result};
pub use crate::kernel::arg::{
    Constant, ConstantPtr, Global, GlobalPtr, KernelArgCache, KernelSignature, Local, LocalPtr,
};
pub use crate::kernel::{Kernel, KernelInit, LaunchOptions, WorkItem};
pub use crate::telemetry::{DeviceMetrics, MetricsSnapshot};
