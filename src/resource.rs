use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{ProcessesToUpdate, System};

/// Point-in-time resource reading. Disk counters are per-process deltas
/// since the previous snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub ram_bytes: u64,
    pub ram_percent: f64,
    pub process_memory_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
}

/// Shared CPU/RAM/disk sensor. sysinfo computes CPU usage from the delta
/// between refreshes, so the sensor keeps one `System` alive behind a mutex
/// instead of rebuilding it per call.
pub struct ResourceSensor {
    sys: Mutex<System>,
}

impl Default for ResourceSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSensor {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
        }
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu_percent = sys.global_cpu_usage() as f64;
        let total = sys.total_memory();
        let used = sys.used_memory();
        let ram_percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let mut process_memory_bytes = 0;
        let mut disk_read_bytes = 0;
        let mut disk_write_bytes = 0;
        if let Ok(pid) = sysinfo::get_current_pid() {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = sys.process(pid) {
                process_memory_bytes = process.memory();
                let disk = process.disk_usage();
                disk_read_bytes = disk.read_bytes;
                disk_write_bytes = disk.written_bytes;
            }
        }

        ResourceSnapshot {
            cpu_percent,
            ram_bytes: used,
            ram_percent,
            process_memory_bytes,
            disk_read_bytes,
            disk_write_bytes,
        }
    }
}
