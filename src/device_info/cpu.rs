//! Capability snapshot of the host CPU.

use crate::error::Result;
use crate::memory::MemoryHeapInfo;
use std::fmt;
use std::path::Path;

/// Fixed, conservative allocation cap of the CPU device.
pub const CPU_MAX_ALLOCATION_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Buffers a CPU kernel may take.
pub const CPU_MAX_NUM_OF_BUFFERS: usize = 256;

pub struct CpuDeviceInfo {
    name: String,
    vendor_name: String,
    num_threads: usize,
    heap_info_list: Vec<MemoryHeapInfo>,
}

impl CpuDeviceInfo {
    /// Query the host and populate every field.
    pub fn new(num_threads: usize) -> Self {
        let (name, vendor_name) = read_cpu_identity();
        let (total, available) = system_memory();

        let info = Self {
            name,
            vendor_name,
            num_threads,
            heap_info_list: vec![MemoryHeapInfo::new(total, available, true)],
        };
        tracing::debug!(name = %info.name, num_threads, total, "fetched cpu device info");
        info
    }

    /// Refresh the memory statistics in place.
    pub fn fetch(&self) {
        let (total, available) = system_memory();
        for heap in &self.heap_info_list {
            heap.set_total_size(total);
            heap.set_available_size(available);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn heap_info_list(&self) -> &[MemoryHeapInfo] {
        &self.heap_info_list
    }

    pub fn max_allocation_size(&self) -> u64 {
        CPU_MAX_ALLOCATION_SIZE
    }

    pub fn max_num_of_buffers_per_kernel(&self) -> usize {
        CPU_MAX_NUM_OF_BUFFERS
    }

    pub fn max_work_group_count(&self) -> [u32; 3] {
        [u32::MAX; 3]
    }

    pub fn work_group_size(&self) -> u32 {
        1
    }
}

impl fmt::Debug for CpuDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuDeviceInfo")
            .field("name", &self.name)
            .field("vendor_name", &self.vendor_name)
            .field("num_threads", &self.num_threads)
            .field("heap_info_list", &self.heap_info_list)
            .finish()
    }
}

fn read_cpu_identity() -> (String, String) {
    let fallback = || {
        (
            format!("{} CPU", std::env::consts::ARCH),
            "unknown".to_string(),
        )
    };

    let cpuinfo = match read_key_values(Path::new("/proc/cpuinfo")) {
        Ok(cpuinfo) => cpuinfo,
        Err(e) => {
            tracing::debug!(error = %e, "cpu identity unavailable");
            return fallback();
        }
    };

    let field = |key: &str| {
        cpuinfo
            .iter()
            .find_map(|(k, v)| (k == key).then(|| v.clone()))
    };

    let (default_name, default_vendor) = fallback();
    (
        field("model name").unwrap_or(default_name),
        field("vendor_id").unwrap_or(default_vendor),
    )
}

/// `key: value` lines of a text file, both sides trimmed.
fn read_key_values(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect())
}

/// Total and available host memory in bytes.
#[cfg(target_os = "linux")]
pub(crate) fn system_memory() -> (u64, u64) {
    unsafe {
        let mut info: libc::sysinfo = std::mem::zeroed();
        if libc::sysinfo(&mut info) == 0 {
            let unit = info.mem_unit.max(1) as u64;
            let total = info.totalram as u64 * unit;
            let available = (info.freeram as u64 + info.bufferram as u64) * unit;
            return (total, available.min(total));
        }
    }
    (CPU_MAX_ALLOCATION_SIZE, CPU_MAX_ALLOCATION_SIZE)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn system_memory() -> (u64, u64) {
    (CPU_MAX_ALLOCATION_SIZE, CPU_MAX_ALLOCATION_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_cpu_info_has_one_host_heap() {
        let info = CpuDeviceInfo::new(4);
        assert!(!info.name().is_empty());
        assert_eq!(info.num_threads(), 4);
        assert_eq!(info.heap_info_list().len(), 1);

        let heap = &info.heap_info_list()[0];
        assert!(heap.total_size() > 0);
        assert!(heap.available_size() <= heap.total_size());
    }

    #[test]
    fn test_fixed_limits() {
        let info = CpuDeviceInfo::new(1);
        assert_eq!(info.max_allocation_size(), 8 << 30);
        assert_eq!(info.max_num_of_buffers_per_kernel(), 256);
        assert_eq!(info.work_group_size(), 1);
    }

    #[test]
    fn test_fetch_keeps_usage_counter() {
        let info = CpuDeviceInfo::new(1);
        let counter = info.heap_info_list()[0].used_size_for_buffer().clone();
        counter.add(42);

        info.fetch();
        info.fetch();
        assert_eq!(info.heap_info_list()[0].used_size_for_buffer().current(), 42);
    }

    #[test]
    fn test_read_key_values_missing_file() {
        let path = std::env::temp_dir().join("zivc-rs-no-such-cpuinfo");
        assert!(matches!(read_key_values(&path), Err(Error::Io(_))));
    }

    #[test]
    fn test_read_key_values_trims_fields() {
        let path = std::env::temp_dir().join(format!("zivc-rs-cpuinfo-{}", std::process::id()));
        std::fs::write(&path, "vendor_id\t: GenuineTest\nmodel name : Test CPU @ 1GHz\nflags\n").unwrap();
        let fields = read_key_values(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], ("vendor_id".to_string(), "GenuineTest".to_string()));
        assert_eq!(fields[1], ("model name".to_string(), "Test CPU @ 1GHz".to_string()));
    }
}
