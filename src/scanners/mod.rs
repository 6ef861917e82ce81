pub mod configuration;
pub mod filesystem;
pub mod health;
pub mod logs;
pub mod manager;
pub mod permissions;
pub mod progress;
pub mod resources;
pub mod security;
pub mod services;
pub mod thresholds;
pub mod validator;

use crate::core::command::{CommandError, CommandRunner};
use crate::core::config::ScannerConfig;
use crate::core::fs::FileSystem;
use progress::ProbeProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A single check in the catalog - every probe implements this
pub trait Probe: Send + Sync {
    /// Stable registry key, also used to attribute issues
    fn key(&self) -> &'static str;

    /// Progress label shown while the probe runs
    fn title(&self) -> &'static str;

    /// Inspect the host. Conditions the probe can attribute to a path or
    /// service come back as issues; only unexpected failures are `Err`.
    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError>;
}

/// Everything a probe may touch while it runs
pub struct ProbeContext<'a> {
    pub scan_directories: &'a [PathBuf],
    pub settings: &'a ScannerConfig,
    pub runner: &'a dyn CommandRunner,
    pub fs: &'a dyn FileSystem,
    pub progress: ProbeProgress<'a>,
}

impl ProbeContext<'_> {
    pub fn command_timeout(&self) -> Duration {
        self.settings.command_timeout()
    }

    /// Report intra-probe progress, `fraction` in `0.0..=1.0`
    pub fn step(&self, fraction: f64, detail: impl Into<String>) {
        self.progress.step(fraction, detail.into());
    }
}

/// Normalized finding emitted by every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub location: String,
    pub message: String,
    /// Display text only. Fixers read `fix`, never this.
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixPayload>,
    #[serde(default)]
    pub probe: String,
}

impl Issue {
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let location = non_empty(location.into(), "system");
        let message = non_empty(message.into(), issue_type.as_str());

        Self {
            issue_type,
            severity,
            location,
            message,
            suggestion: String::new(),
            fix: None,
            probe: String::new(),
        }
    }

    /// Warning-level issue describing a probe-local failure
    pub fn local_failure(
        issue_type: IssueType,
        location: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::new(issue_type, Severity::Warning, location, message).with_suggestion(suggestion)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_fix(mut self, fix: FixPayload) -> Self {
        self.fix = Some(fix);
        self
    }

    pub(crate) fn attributed_to(mut self, probe: &str) -> Self {
        self.probe = probe.to_string();
        self
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Machine-actionable fix data, filled in by the probe that saw the problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixPayload {
    StartService { service: String },
    SetMode { path: PathBuf, mode: u32 },
    CreateDirectory { path: PathBuf },
}

/// Finding severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    DiskSpace,
    ServiceFailed,
    ServiceInactive,
    WrongPermissions,
    MissingDirectory,
    MissingFile,
    MissingEnv,
    ConfigSyntax,
    MissingSecurityHeader,
    MissingConfig,
    InsecureConfig,
    AuthenticationFailure,
    SystemError,
    CriticalError,
    SegmentationFault,
    SecurityFirewall,
    HighMemory,
    HighLoad,
    MissingVenv,
    ScanError,
    ConfigError,
    PermissionError,
}

impl IssueType {
    pub const ALL: [IssueType; 22] = [
        IssueType::DiskSpace,
        IssueType::ServiceFailed,
        IssueType::ServiceInactive,
        IssueType::WrongPermissions,
        IssueType::MissingDirectory,
        IssueType::MissingFile,
        IssueType::MissingEnv,
        IssueType::ConfigSyntax,
        IssueType::MissingSecurityHeader,
        IssueType::MissingConfig,
        IssueType::InsecureConfig,
        IssueType::AuthenticationFailure,
        IssueType::SystemError,
        IssueType::CriticalError,
        IssueType::SegmentationFault,
        IssueType::SecurityFirewall,
        IssueType::HighMemory,
        IssueType::HighLoad,
        IssueType::MissingVenv,
        IssueType::ScanError,
        IssueType::ConfigError,
        IssueType::PermissionError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::DiskSpace => "disk_space",
            IssueType::ServiceFailed => "service_failed",
            IssueType::ServiceInactive => "service_inactive",
            IssueType::WrongPermissions => "wrong_permissions",
            IssueType::MissingDirectory => "missing_directory",
            IssueType::MissingFile => "missing_file",
            IssueType::MissingEnv => "missing_env",
            IssueType::ConfigSyntax => "config_syntax",
            IssueType::MissingSecurityHeader => "missing_security_header",
            IssueType::MissingConfig => "missing_config",
            IssueType::InsecureConfig => "insecure_config",
            IssueType::AuthenticationFailure => "authentication_failure",
            IssueType::SystemError => "system_error",
            IssueType::CriticalError => "critical_error",
            IssueType::SegmentationFault => "segmentation_fault",
            IssueType::SecurityFirewall => "security_firewall",
            IssueType::HighMemory => "high_memory",
            IssueType::HighLoad => "high_load",
            IssueType::MissingVenv => "missing_venv",
            IssueType::ScanError => "scan_error",
            IssueType::ConfigError => "config_error",
            IssueType::PermissionError => "permission_error",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe errors
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Command execution failed: {0}")]
    Command(#[from] CommandError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
