//! Completion handles for asynchronous submissions.

use crate::error::{Error, Result};
use crate::executor::TaskHandle;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct PoolState {
    capacity: usize,
    in_use: AtomicUsize,
}

/// Fixed-capacity pool of fence slots owned by one device.
#[derive(Debug, Clone)]
pub struct FencePool {
    state: Arc<PoolState>,
}

impl FencePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(PoolState {
                capacity,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    pub fn in_use(&self) -> usize {
        self.state.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.in_use())
    }

    /// Reserve a slot; never blocks.
    pub(crate) fn acquire(&self) -> Result<FenceSlot> {
        let capacity = self.state.capacity;
        self.state
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| {
                tracing::warn!(capacity, "no available fence");
                Error::FenceExhausted { capacity }
            })?;

        Ok(FenceSlot {
            pool: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct FenceSlot {
    pool: Arc<PoolState>,
}

impl Drop for FenceSlot {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) enum Signal {
    Cpu(TaskHandle),
    #[cfg(feature = "vulkan")]
    Vulkan {
        device: Arc<wgpu::Device>,
        index: wgpu::SubmissionIndex,
        done: Arc<std::sync::atomic::AtomicBool>,
    },
}

impl Signal {
    fn is_signaled(&self) -> bool {
        match self {
            Signal::Cpu(handle) => handle.is_done(),
            #[cfg(feature = "vulkan")]
            Signal::Vulkan { device, done, .. } => {
                device.poll(wgpu::Maintain::Poll);
                done.load(Ordering::Acquire)
            }
        }
    }

    pub(crate) fn wait(self) -> Result<()> {
        match self {
            Signal::Cpu(handle) => handle.wait(),
            #[cfg(feature = "vulkan")]
            Signal::Vulkan { device, index, .. } => {
                device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
                Ok(())
            }
        }
    }
}

/// Completion handle of one asynchronous operation.
///
/// Waiting is destructive: after [`wait`](Fence::wait) returns the fence is
/// inactive and its slot is back in the device's pool. Dropping an active
/// fence releases the slot without waiting; the work still runs to
/// completion.
#[derive(Default)]
pub struct Fence {
    active: Option<(FenceSlot, Signal)>,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn activate(slot: FenceSlot, signal: Signal) -> Self {
        Self {
            active: Some((slot, signal)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Non-blocking completion check. An inactive fence counts as signaled.
    pub fn is_signaled(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |(_, signal)| signal.is_signaled())
    }

    /// Block until the operation finished, then clear the fence.
    ///
    /// Fails with [`Error::WorkerPanic`] if CPU work behind the fence
    /// panicked. The fence is cleared either way.
    pub fn wait(&mut self) -> Result<()> {
        match self.active.take() {
            Some((slot, signal)) => {
                let result = signal.wait();
                drop(slot);
                result
            }
            None => Ok(()),
        }
    }

    /// Release the slot without waiting.
    pub fn clear(&mut self) {
        self.active = None;
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Outcome of a buffer operation or kernel launch.
///
/// Carries an active fence only when the operation ran in external sync
/// mode; otherwise the work already finished when the call returned.
#[derive(Debug, Default)]
pub struct LaunchResult {
    fence: Fence,
}

impl LaunchResult {
    pub(crate) fn completed() -> Self {
        Self::default()
    }

    pub(crate) fn pending(fence: Fence) -> Self {
        Self { fence }
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn fence_mut(&mut self) -> &mut Fence {
        &mut self.fence
    }

    pub fn into_fence(self) -> Fence {
        self.fence
    }

    pub fn is_pending(&self) -> bool {
        self.fence.is_active() && !self.fence.is_signaled()
    }

    pub fn wait(&mut self) -> Result<()> {
        self.fence.wait()
    }
}
