use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Static description of the machine running the comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub cpu_count: usize,
    pub total_memory_gb: f64,
}

impl HostInfo {
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os: System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
            cpu_count: system.cpus().len(),
            total_memory_gb: system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
        }
    }
}
