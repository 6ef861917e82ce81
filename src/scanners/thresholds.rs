//! Threshold policies for resource checks.
//!
//! The full scan and the quick health check grade the same metrics with
//! different cut-offs. Both are kept as named policies; every comparison is
//! strictly greater-than.

use super::Severity;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    pub name: &'static str,
    pub disk_critical: f64,
    pub disk_warning: f64,
    pub memory_critical: f64,
    pub memory_warning: f64,
    /// Multiples of the CPU count
    pub load_critical_factor: f64,
    pub load_warning_factor: f64,
}

impl ThresholdPolicy {
    /// Cut-offs used by the probe catalog
    pub const fn full_scan() -> Self {
        Self {
            name: "full_scan",
            disk_critical: 90.0,
            disk_warning: 80.0,
            memory_critical: 90.0,
            memory_warning: 80.0,
            load_critical_factor: 2.0,
            load_warning_factor: 1.0,
        }
    }

    /// Cut-offs used by the quick health check
    pub const fn quick_health() -> Self {
        Self {
            name: "quick_health",
            disk_critical: 95.0,
            disk_warning: 85.0,
            memory_critical: 90.0,
            memory_warning: 80.0,
            load_critical_factor: 1.5,
            load_warning_factor: 1.0,
        }
    }

    pub fn disk(&self, usage_percent: f64) -> Option<Severity> {
        grade(usage_percent, self.disk_critical, self.disk_warning)
    }

    pub fn memory(&self, usage_percent: f64) -> Option<Severity> {
        grade(usage_percent, self.memory_critical, self.memory_warning)
    }

    pub fn load(&self, load_average: f64, cpu_count: usize) -> Option<Severity> {
        let cpus = cpu_count.max(1) as f64;
        grade(
            load_average,
            cpus * self.load_critical_factor,
            cpus * self.load_warning_factor,
        )
    }
}

fn grade(value: f64, critical: f64, warning: f64) -> Option<Severity> {
    if value > critical {
        Some(Severity::Critical)
    } else if value > warning {
        Some(Severity::Warning)
    } else {
        None
    }
}
