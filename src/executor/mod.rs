//! Task execution infrastructure.
//!
//! Worker threads with work-stealing deques, the thread manager that the CPU
//! backend dispatches kernels on, and completion handles.

pub mod task;
pub mod thread_manager;
pub mod worker;

pub use task::{TaskHandle, TaskId};
pub use thread_manager::ThreadManager;

pub(crate) use task::Latch;
