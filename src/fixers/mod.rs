use crate::classifier::fix_action;
use crate::core::command::{CommandError, CommandRunner};
use crate::core::errors::SysmendError;
use crate::core::fs::FileSystem;
use crate::scanners::{Issue, IssueType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod backup;
pub mod directory_creator;
pub mod manager;
pub mod permission_fixer;
pub mod service_starter;

/// Fixer trait - each fixable issue type has exactly one implementation
pub trait Fixer: Send + Sync {
    fn name(&self) -> &'static str;

    /// The issue type this fixer is routed
    fn handles(&self) -> IssueType;

    /// Command-like description of what `fix` would do, without doing it
    fn describe(&self, issue: &Issue) -> Result<String, FixError>;

    fn fix(&self, issue: &Issue, ctx: &FixContext<'_>) -> Result<FixOutcome, FixError>;
}

/// Host access and settings for one fix
pub struct FixContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fs: &'a dyn FileSystem,
    pub command_timeout: Duration,
    /// Set when mode changes must be backed up first
    pub backup_dir: Option<&'a Path>,
}

/// What a successful fixer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub action: String,
    pub backup: Option<PathBuf>,
}

impl FixOutcome {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: PathBuf) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Result of one remediation attempt
#[derive(Debug, Clone, Serialize)]
pub struct FixResult {
    pub issue: Issue,
    pub applied: bool,
    pub error: Option<String>,
    pub fixer: String,
    pub action: String,
    pub backup_created: Option<PathBuf>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl FixResult {
    fn new(issue: &Issue, fixer: &str) -> Self {
        Self {
            issue: issue.clone(),
            applied: false,
            error: None,
            fixer: fixer.to_string(),
            action: fix_action(issue.issue_type).to_string(),
            backup_created: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn applied(issue: &Issue, fixer: &str, outcome: FixOutcome, started: Instant) -> Self {
        let mut result = Self::new(issue, fixer).set_duration(started);
        result.applied = true;
        result.action = outcome.action;
        result.backup_created = outcome.backup;
        result
    }

    pub fn failed(issue: &Issue, fixer: &str, error: &FixError, started: Instant) -> Self {
        let mut result = Self::new(issue, fixer).set_duration(started);
        result.error = Some(error.to_string());
        result
    }

    fn set_duration(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }
}

/// Fix errors
#[derive(Debug, Error)]
pub enum FixError {
    #[error("unsupported: no fixer for {0} issues")]
    Unsupported(IssueType),
    #[error("Automatic fixing is disabled")]
    AutoFixDisabled,
    #[error("Issue at {0} carries no fix data")]
    MissingPayload(String),
    #[error("Fix data does not match a {0} issue")]
    PayloadMismatch(IssueType),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Backup failed: {}", .0.chain())]
    Backup(#[source] SysmendError),
    #[error("Confirmation failed: {0}")]
    Confirmation(String),
}

/// One line of the plan shown before a batch is approved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFix {
    pub issue_type: IssueType,
    pub location: String,
    pub action: &'static str,
    pub command: String,
}

/// Operator approval, asked once per batch
pub trait Confirm {
    fn confirm(&self, plan: &[PlannedFix]) -> Result<bool, FixError>;
}

/// Approves every batch (`fix --yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn confirm(&self, _plan: &[PlannedFix]) -> Result<bool, FixError> {
        Ok(true)
    }
}

/// Prints the plan and reads a y/N answer from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&self, plan: &[PlannedFix]) -> Result<bool, FixError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();

        writeln!(out, "Fix plan ({} fixes):", plan.len())
            .map_err(|e| FixError::Confirmation(e.to_string()))?;
        for item in plan {
            writeln!(out, "  {} {}", item.action, item.location)
                .map_err(|e| FixError::Confirmation(e.to_string()))?;
            writeln!(out, "     $ {}", item.command)
                .map_err(|e| FixError::Confirmation(e.to_string()))?;
        }
        write!(out, "\nDo you want to proceed? [y/N]: ")
            .and_then(|_| out.flush())
            .map_err(|e| FixError::Confirmation(e.to_string()))?;

        let mut input = String::new();
        io::stdin()
            .lock()
            .read_line(&mut input)
            .map_err(|e| FixError::Confirmation(e.to_string()))?;

        Ok(is_yes(&input))
    }
}

fn is_yes(input: &str) -> bool {
    let response = input.trim().to_lowercase();
    response == "y" || response == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanners::Severity;

    #[test]
    fn test_yes_parsing() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("nope"));
    }

    #[test]
    fn test_failed_result_keeps_error_text() {
        let issue = Issue::new(IssueType::MissingFile, Severity::Info, "/srv/README.md", "missing");
        let result = FixResult::failed(
            &issue,
            "none",
            &FixError::Unsupported(IssueType::MissingFile),
            Instant::now(),
        );

        assert!(!result.applied);
        assert_eq!(result.action, "Manual fix required");
        assert_eq!(
            result.error.as_deref(),
            Some("unsupported: no fixer for missing_file issues")
        );
    }

    #[test]
    fn test_auto_approve() {
        assert!(AutoApprove.confirm(&[]).unwrap());
    }
}
