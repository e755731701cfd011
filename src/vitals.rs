//! Host vitals
//!
//! A point-in-time snapshot of the machine serving the dashboard. Collected
//! fresh on every telemetry request; nothing here touches the database.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;

/// Gap between the two CPU samples needed for a usage reading
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuVitals {
    pub cores: usize,
    /// Busy percentage across all cores, 0..=100
    pub usage: u64,
    /// 1, 5 and 15 minute load averages
    pub load: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryVitals {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    /// Used share of total, 0..=100
    pub percent: u64,
}

impl MemoryVitals {
    pub fn from_totals(total: u64, free: u64) -> Self {
        let used = total.saturating_sub(free);
        let percent = if total == 0 {
            0
        } else {
            ((used as f64 / total as f64) * 100.0).round() as u64
        };
        Self {
            total,
            free,
            used,
            percent,
        }
    }
}

/// Host vitals snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub cpu: CpuVitals,
    pub memory: MemoryVitals,
    /// Seconds since boot
    pub uptime: u64,
    pub platform: String,
    pub hostname: String,
}

impl Vitals {
    /// Sample the host
    ///
    /// Waits briefly between two CPU refreshes so usage reflects actual
    /// activity rather than the zero of a first reading.
    pub async fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();
        tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
        sys.refresh_cpu();

        let per_core: Vec<f32> = sys.cpus().iter().map(|c| c.cpu_usage()).collect();
        let load = System::load_average();

        Self {
            cpu: CpuVitals {
                cores: per_core.len(),
                usage: busy_percent(&per_core),
                load: [load.one, load.five, load.fifteen],
            },
            memory: MemoryVitals::from_totals(sys.total_memory(), sys.available_memory()),
            uptime: System::uptime(),
            platform: std::env::consts::OS.to_string(),
            hostname: host_name(),
        }
    }
}

/// Mean of per-core usage percentages, rounded and clamped to 0..=100
pub fn busy_percent(per_core: &[f32]) -> u64 {
    if per_core.is_empty() {
        return 0;
    }
    let sum: f64 = per_core.iter().map(|&u| f64::from(u)).sum();
    let mean = sum / per_core.len() as f64;
    mean.clamp(0.0, 100.0).round() as u64
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .or_else(System::host_name)
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_percent() {
        assert_eq!(busy_percent(&[]), 0);
        assert_eq!(busy_percent(&[10.0, 20.0]), 15);
        assert_eq!(busy_percent(&[33.4, 33.4, 33.4]), 33);
        assert_eq!(busy_percent(&[150.0]), 100);
    }

    #[test]
    fn test_memory_from_totals() {
        let memory = MemoryVitals::from_totals(1000, 250);
        assert_eq!(memory.used, 750);
        assert_eq!(memory.percent, 75);

        let empty = MemoryVitals::from_totals(0, 0);
        assert_eq!(empty.percent, 0);

        let odd = MemoryVitals::from_totals(100, 200);
        assert_eq!(odd.used, 0);
    }

    #[tokio::test]
    async fn test_collect_shape() {
        let vitals = Vitals::collect().await;
        assert!(vitals.cpu.usage <= 100);
        assert!(vitals.memory.percent <= 100);
        assert_eq!(vitals.platform, std::env::consts::OS);
        assert!(!vitals.hostname.is_empty());

        let json = serde_json::to_value(&vitals).unwrap();
        assert_eq!(json["cpu"]["load"].as_array().unwrap().len(), 3);
        assert!(json["memory"].get("free").is_some());
    }
}
