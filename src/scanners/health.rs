//! Quick health check.
//!
//! A handful of readings with a traffic-light status each, graded with the
//! more lenient [`ThresholdPolicy::quick_health`] cut-offs. Unlike the probe
//! catalog this never produces issues and never feeds remediation.

use super::resources::{cpu_count, load_average, memory_usage_percent, ProcSources};
use super::services::{query_service_state, ServiceState};
use super::thresholds::ThresholdPolicy;
use super::Severity;
use crate::core::command::CommandRunner;
use crate::core::fs::FileSystem;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const HEALTH_SERVICES: [&str; 3] = ["nginx", "ssh", "sshd"];
const PING_TARGET: &str = "8.8.8.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
    Critical,
}

impl HealthStatus {
    fn from_severity(severity: Option<Severity>) -> Self {
        match severity {
            Some(Severity::Critical) => HealthStatus::Critical,
            Some(_) => HealthStatus::Warning,
            None => HealthStatus::Ok,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReading {
    pub check: &'static str,
    pub status: HealthStatus,
    pub message: String,
}

impl HealthReading {
    fn new(check: &'static str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            check,
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub readings: Vec<HealthReading>,
}

impl HealthReport {
    /// Worst status across all readings
    pub fn overall(&self) -> HealthStatus {
        self.readings
            .iter()
            .map(|reading| reading.status)
            .max()
            .unwrap_or(HealthStatus::Ok)
    }
}

pub struct HealthCheck {
    sources: ProcSources,
    root_mount: PathBuf,
    cpu_count: usize,
    policy: ThresholdPolicy,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            sources: ProcSources::default(),
            root_mount: PathBuf::from("/"),
            cpu_count: cpu_count(),
            policy: ThresholdPolicy::quick_health(),
        }
    }

    pub fn with_sources(mut self, sources: ProcSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_root_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_mount = path.into();
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count.max(1);
        self
    }

    pub fn run(
        &self,
        runner: &dyn CommandRunner,
        fs: &dyn FileSystem,
        timeout: Duration,
    ) -> HealthReport {
        let readings = vec![
            self.check_load(fs),
            self.check_memory(fs),
            self.check_disk(fs),
            self.check_services(runner, timeout),
            self.check_network(runner, timeout),
        ];

        for reading in &readings {
            tracing::debug!(check = reading.check, status = %reading.status, "{}", reading.message);
        }

        HealthReport { readings }
    }

    fn check_load(&self, fs: &dyn FileSystem) -> HealthReading {
        let load = match load_average(fs, &self.sources.loadavg) {
            Ok(load) => load,
            Err(e) => {
                return HealthReading::new(
                    "System Load",
                    HealthStatus::Error,
                    format!("Could not check load: {}", e),
                )
            }
        };

        let status = HealthStatus::from_severity(self.policy.load(load, self.cpu_count));
        let label = match status {
            HealthStatus::Critical => "very high",
            HealthStatus::Warning => "high",
            _ => "normal",
        };
        HealthReading::new(
            "System Load",
            status,
            format!("Load: {:.2} ({} for {} CPUs)", load, label, self.cpu_count),
        )
    }

    fn check_memory(&self, fs: &dyn FileSystem) -> HealthReading {
        match memory_usage_percent(fs, &self.sources.meminfo) {
            Ok(percent) => {
                let status = HealthStatus::from_severity(self.policy.memory(percent));
                HealthReading::new(
                    "Memory Usage",
                    status,
                    format!("Memory: {:.1}% used ({})", percent, usage_label(status)),
                )
            }
            Err(e) => HealthReading::new(
                "Memory Usage",
                HealthStatus::Error,
                format!("Could not check memory: {}", e),
            ),
        }
    }

    fn check_disk(&self, fs: &dyn FileSystem) -> HealthReading {
        match fs.disk_usage(&self.root_mount) {
            Ok(usage) => {
                let percent = usage.percent();
                let status = HealthStatus::from_severity(self.policy.disk(percent));
                HealthReading::new(
                    "Disk Space",
                    status,
                    format!("Disk: {:.1}% used ({})", percent, usage_label(status)),
                )
            }
            Err(e) => HealthReading::new(
                "Disk Space",
                HealthStatus::Error,
                format!("Could not check disk: {}", e),
            ),
        }
    }

    fn check_services(&self, runner: &dyn CommandRunner, timeout: Duration) -> HealthReading {
        let failed: Vec<&str> = HEALTH_SERVICES
            .iter()
            .copied()
            .filter(|service| {
                matches!(
                    query_service_state(runner, service, timeout),
                    Ok(ServiceState::Failed)
                )
            })
            .collect();

        if failed.is_empty() {
            HealthReading::new(
                "Critical Services",
                HealthStatus::Ok,
                "All critical services running",
            )
        } else {
            HealthReading::new(
                "Critical Services",
                HealthStatus::Critical,
                format!("Failed services: {}", failed.join(", ")),
            )
        }
    }

    fn check_network(&self, runner: &dyn CommandRunner, timeout: Duration) -> HealthReading {
        match runner.run("ping", &["-c", "1", PING_TARGET], timeout) {
            Ok(output) if output.success() => HealthReading::new(
                "Network Connectivity",
                HealthStatus::Ok,
                "Network connectivity normal",
            ),
            Ok(_) => HealthReading::new(
                "Network Connectivity",
                HealthStatus::Warning,
                "Network connectivity issues",
            ),
            Err(e) => {
                tracing::debug!("ping failed: {}", e);
                HealthReading::new(
                    "Network Connectivity",
                    HealthStatus::Error,
                    "Could not check network",
                )
            }
        }
    }
}

fn usage_label(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Critical => "critical",
        HealthStatus::Warning => "high",
        _ => "normal",
    }
}
