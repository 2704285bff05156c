//! Placement hints and the memory properties derived from them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    PreferDevice,
    PreferHost,
    DeviceOnly,
    HostOnly,
    /// Written by the host, read by the device.
    HostToDevice,
    /// Written by the device, read back by the host.
    DeviceToHost,
}

impl BufferUsage {
    pub fn is_host_accessible(self) -> bool {
        matches!(
            self,
            BufferUsage::PreferHost
                | BufferUsage::HostOnly
                | BufferUsage::HostToDevice
                | BufferUsage::DeviceToHost
        )
    }

    pub fn prefers_device(self) -> bool {
        matches!(self, BufferUsage::PreferDevice | BufferUsage::DeviceOnly)
    }
}

/// Host access pattern hints.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u8);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const SEQUENTIAL_WRITABLE: BufferFlags = BufferFlags(1 << 0);
    pub const RANDOM_ACCESSIBLE: BufferFlags = BufferFlags(1 << 1);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        if self.contains(BufferFlags::SEQUENTIAL_WRITABLE) {
            list.entry(&"SEQUENTIAL_WRITABLE");
        }
        if self.contains(BufferFlags::RANDOM_ACCESSIBLE) {
            list.entry(&"RANDOM_ACCESSIBLE");
        }
        list.finish()
    }
}

/// How a device's memory relates to host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryModel {
    /// The device is the host (CPU backend).
    Host,
    /// Device and host share physical memory.
    Unified,
    /// Dedicated device memory.
    Discrete,
}

/// Memory properties of one buffer. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryProperties {
    pub is_device_local: bool,
    pub is_host_visible: bool,
    pub is_host_coherent: bool,
    pub is_host_cached: bool,
}

impl MemoryProperties {
    pub fn derive(usage: BufferUsage, flags: BufferFlags, model: MemoryModel) -> Self {
        if model == MemoryModel::Host {
            return Self {
                is_device_local: true,
                is_host_visible: true,
                is_host_coherent: true,
                is_host_cached: true,
            };
        }

        let is_host_visible = usage.is_host_accessible()
            || (usage == BufferUsage::PreferDevice && !flags.is_empty());
        let is_device_local = usage.prefers_device() || model == MemoryModel::Unified;
        let is_host_cached = is_host_visible
            && (usage == BufferUsage::DeviceToHost
                || flags.contains(BufferFlags::RANDOM_ACCESSIBLE));

        Self {
            is_device_local,
            is_host_visible,
            is_host_coherent: is_host_visible,
            is_host_cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_model_is_fully_visible() {
        let props = MemoryProperties::derive(
            BufferUsage::DeviceOnly,
            BufferFlags::NONE,
            MemoryModel::Host,
        );
        assert!(props.is_device_local && props.is_host_visible);
        assert!(props.is_host_coherent && props.is_host_cached);
    }

    #[test]
    fn test_discrete_placement() {
        let device_only = MemoryProperties::derive(
            BufferUsage::DeviceOnly,
            BufferFlags::RANDOM_ACCESSIBLE,
            MemoryModel::Discrete,
        );
        assert!(device_only.is_device_local);
        assert!(!device_only.is_host_visible);
        assert!(!device_only.is_host_cached);

        let readback = MemoryProperties::derive(
            BufferUsage::DeviceToHost,
            BufferFlags::NONE,
            MemoryModel::Discrete,
        );
        assert!(!readback.is_device_local);
        assert!(readback.is_host_visible && readback.is_host_coherent);
        assert!(readback.is_host_cached);

        let upload = MemoryProperties::derive(
            BufferUsage::HostToDevice,
            BufferFlags::SEQUENTIAL_WRITABLE,
            MemoryModel::Discrete,
        );
        assert!(upload.is_host_visible);
        assert!(!upload.is_host_cached);

        let mappable_device = MemoryProperties::derive(
            BufferUsage::PreferDevice,
            BufferFlags::SEQUENTIAL_WRITABLE,
            MemoryModel::Discrete,
        );
        assert!(mappable_device.is_device_local && mappable_device.is_host_visible);
    }

    #[test]
    fn test_unified_memory_is_device_local() {
        let props = MemoryProperties::derive(
            BufferUsage::HostOnly,
            BufferFlags::NONE,
            MemoryModel::Unified,
        );
        assert!(props.is_device_local && props.is_host_visible);
    }

    #[test]
    fn test_flags() {
        let flags = BufferFlags::SEQUENTIAL_WRITABLE | BufferFlags::RANDOM_ACCESSIBLE;
        assert!(flags.contains(BufferFlags::RANDOM_ACCESSIBLE));
        assert!(!BufferFlags::NONE.contains(BufferFlags::RANDOM_ACCESSIBLE));
        assert!(BufferFlags::NONE.is_empty());
        assert_eq!(format!("{:?}", BufferFlags::RANDOM_ACCESSIBLE), "{\"RANDOM_ACCESSIBLE\"}");
    }
}
