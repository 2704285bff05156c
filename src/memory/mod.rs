//! Memory resources, host blocks and heap accounting.

pub mod allocation;
pub mod allocator;
pub mod heap;

pub use allocation::{HostAllocation, HOST_ALIGNMENT};
pub use allocator::{CountingMemoryResource, MemoryResource, SystemMemoryResource};
pub use heap::{MemoryHeapInfo, UsageCounter};
