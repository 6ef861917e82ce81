use super::thresholds::ThresholdPolicy;
use super::{Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use crate::core::fs::FileSystem;
use std::path::{Path, PathBuf};

/// Kernel files memory and load are read from
#[derive(Debug, Clone)]
pub struct ProcSources {
    pub meminfo: PathBuf,
    pub loadavg: PathBuf,
}

impl Default for ProcSources {
    fn default() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
            loadavg: PathBuf::from("/proc/loadavg"),
        }
    }
}

pub struct ResourcesProbe {
    sources: ProcSources,
    cpu_count: usize,
    policy: ThresholdPolicy,
}

impl Default for ResourcesProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourcesProbe {
    pub fn new() -> Self {
        Self {
            sources: ProcSources::default(),
            cpu_count: cpu_count(),
            policy: ThresholdPolicy::full_scan(),
        }
    }

    pub fn with_sources(mut self, sources: ProcSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: usize) -> Self {
        self.cpu_count = cpu_count.max(1);
        self
    }

    fn check_memory(&self, fs: &dyn FileSystem) -> Result<Option<Issue>, ProbeError> {
        let percent = memory_usage_percent(fs, &self.sources.meminfo)?;
        let Some(severity) = self.policy.memory(percent) else {
            return Ok(None);
        };

        let suggestion = match severity {
            Severity::Critical => "Investigate high memory usage processes",
            _ => "Monitor memory usage",
        };

        Ok(Some(
            Issue::new(
                IssueType::HighMemory,
                severity,
                "system",
                format!("Memory usage at {:.1}%", percent),
            )
            .with_suggestion(suggestion),
        ))
    }

    fn check_load(&self, fs: &dyn FileSystem) -> Result<Option<Issue>, ProbeError> {
        let load = load_average(fs, &self.sources.loadavg)?;
        let Some(severity) = self.policy.load(load, self.cpu_count) else {
            return Ok(None);
        };

        let (message, suggestion) = match severity {
            Severity::Critical => (
                format!(
                    "Load average {:.2} is very high (CPUs: {})",
                    load, self.cpu_count
                ),
                "Investigate high CPU usage processes",
            ),
            _ => (
                format!("Load average {:.2} is high (CPUs: {})", load, self.cpu_count),
                "Monitor CPU usage",
            ),
        };

        Ok(Some(
            Issue::new(IssueType::HighLoad, severity, "system", message)
                .with_suggestion(suggestion),
        ))
    }
}

impl Probe for ResourcesProbe {
    fn key(&self) -> &'static str {
        "resources"
    }

    fn title(&self) -> &'static str {
        "Checking resources..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let mut issues = Vec::new();

        ctx.step(0.0, "Checking memory usage...");
        match self.check_memory(ctx.fs) {
            Ok(issue) => issues.extend(issue),
            Err(e) => issues.push(Issue::local_failure(
                IssueType::ScanError,
                self.sources.meminfo.display().to_string(),
                format!("Could not check memory: {}", e),
                "Check /proc availability",
            )),
        }

        ctx.step(0.5, "Checking CPU load...");
        match self.check_load(ctx.fs) {
            Ok(issue) => issues.extend(issue),
            Err(e) => issues.push(Issue::local_failure(
                IssueType::ScanError,
                self.sources.loadavg.display().to_string(),
                format!("Could not check load: {}", e),
                "Check /proc availability",
            )),
        }

        Ok(issues)
    }
}

/// Online CPUs, at least one
pub(crate) fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// `(MemTotal - MemAvailable) / MemTotal * 100`
pub(crate) fn memory_usage_percent(fs: &dyn FileSystem, meminfo: &Path) -> Result<f64, ProbeError> {
    let content = fs.read_to_string(meminfo)?;
    parse_meminfo(&content)
}

/// 1-minute load average
pub(crate) fn load_average(fs: &dyn FileSystem, loadavg: &Path) -> Result<f64, ProbeError> {
    let content = fs.read_to_string(loadavg)?;
    parse_loadavg(&content)
}

fn parse_meminfo(content: &str) -> Result<f64, ProbeError> {
    let field = |name: &str| -> Result<u64, ProbeError> {
        content
            .lines()
            .find_map(|line| {
                let rest = line.strip_prefix(name)?.strip_prefix(':')?;
                rest.split_whitespace().next()?.parse::<u64>().ok()
            })
            .ok_or_else(|| ProbeError::Parse(format!("{} not found in meminfo", name)))
    };

    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total == 0 {
        return Err(ProbeError::Parse("MemTotal is zero".to_string()));
    }

    Ok(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}

fn parse_loadavg(content: &str) -> Result<f64, ProbeError> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ProbeError::Parse("loadavg is empty".to_string()))?;
    first
        .parse::<f64>()
        .map_err(|e| ProbeError::Parse(format!("Invalid load average '{}': {}", first, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFileSystem, ProbeHarness};

    const MEMINFO_85: &str =
        "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    150 kB\n";

    fn fake_proc(meminfo: &str, loadavg: &str) -> FakeFileSystem {
        FakeFileSystem::new()
            .with_file("/proc/meminfo", meminfo)
            .with_file("/proc/loadavg", loadavg)
    }

    #[test]
    fn test_meminfo_parsing() {
        let percent = parse_meminfo(MEMINFO_85).unwrap();
        assert!((percent - 85.0).abs() < 1e-9);
        assert!(parse_meminfo("MemTotal: 10 kB\n").is_err());
    }

    #[test]
    fn test_loadavg_parsing() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap(), 0.52);
        assert!(parse_loadavg("").is_err());
    }

    #[test]
    fn test_high_memory_and_critical_load() {
        let harness = ProbeHarness::new()
            .with_file_system(fake_proc(MEMINFO_85, "9.00 1.0 1.0 1/1 1\n"));
        let probe = ResourcesProbe::new().with_cpu_count(4);
        let issues = harness.run(&probe).unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].issue_type, IssueType::HighMemory);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].message, "Memory usage at 85.0%");
        assert_eq!(issues[1].issue_type, IssueType::HighLoad);
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[1].message, "Load average 9.00 is very high (CPUs: 4)");
    }

    #[test]
    fn test_load_equal_to_cpu_count_is_fine() {
        let meminfo = "MemTotal: 1000 kB\nMemAvailable: 900 kB\n";
        let harness = ProbeHarness::new().with_file_system(fake_proc(meminfo, "4.00 1 1 1/1 1\n"));
        let probe = ResourcesProbe::new().with_cpu_count(4);
        assert!(harness.run(&probe).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_proc_becomes_scan_error() {
        let harness = ProbeHarness::new().with_file_system(FakeFileSystem::new());
        let issues = harness.run(&ResourcesProbe::new()).unwrap();

        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|issue| issue.issue_type == IssueType::ScanError));
    }
}
