use super::directory_creator::DirectoryCreator;
use super::permission_fixer::PermissionFixer;
use super::service_starter::ServiceStarter;
use super::{FixContext, FixError, FixResult, Fixer, PlannedFix};
use crate::classifier::{fix_action, is_fixable_type, Classifier};
use crate::core::cancel::CancelToken;
use crate::core::command::CommandRunner;
use crate::core::config::Config;
use crate::core::errors::{log_error, SysmendError};
use crate::core::fs::FileSystem;
use crate::core::sink::EventSink;
use crate::scanners::Issue;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Host access for one remediation pass
pub struct FixEnvironment<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fs: &'a dyn FileSystem,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemediationReport {
    pub results: Vec<FixResult>,
    pub attempted: usize,
    pub applied: usize,
    /// Cancelled before every candidate was attempted
    pub interrupted: bool,
}

impl RemediationReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.applied
    }
}

/// Routes each fixable issue to its fixer and reports per-issue results
pub struct Remediator {
    fixers: Vec<Box<dyn Fixer>>,
    classifier: Classifier,
    fix_timeout: Duration,
    backup_dir: Option<PathBuf>,
}

impl Remediator {
    pub fn new(config: &Config) -> Self {
        let fixers: Vec<Box<dyn Fixer>> = vec![
            Box::new(ServiceStarter),
            Box::new(PermissionFixer),
            Box::new(DirectoryCreator),
        ];

        let backup_dir = if config.fixer.backup_before_fix {
            Some(PathBuf::from(&config.fixer.backup_dir))
        } else {
            None
        };

        Self {
            fixers,
            classifier: Classifier::from_config(&config.fixer),
            fix_timeout: config.scanner.fix_command_timeout(),
            backup_dir,
        }
    }

    fn fixer_for(&self, issue: &Issue) -> Result<&dyn Fixer, FixError> {
        if !is_fixable_type(issue.issue_type) {
            return Err(FixError::Unsupported(issue.issue_type));
        }
        if !self.classifier.auto_fix_safe() {
            return Err(FixError::AutoFixDisabled);
        }

        self.fixers
            .iter()
            .find(|fixer| fixer.handles() == issue.issue_type)
            .map(|fixer| fixer.as_ref())
            .ok_or(FixError::Unsupported(issue.issue_type))
    }

    /// What each fix in `batch` would run, for the confirmation prompt
    pub fn plan(&self, batch: &[Issue]) -> Vec<PlannedFix> {
        batch
            .iter()
            .map(|issue| PlannedFix {
                issue_type: issue.issue_type,
                location: issue.location.clone(),
                action: fix_action(issue.issue_type),
                command: self
                    .fixer_for(issue)
                    .and_then(|fixer| fixer.describe(issue))
                    .unwrap_or_else(|e| format!("(skipped: {})", e)),
            })
            .collect()
    }

    /// Apply the fix for one issue. Ineligible issues fail without running
    /// anything.
    pub fn remediate(&self, issue: &Issue, env: &FixEnvironment<'_>) -> FixResult {
        let started = Instant::now();

        let fixer = match self.fixer_for(issue) {
            Ok(fixer) => fixer,
            Err(e) => {
                tracing::warn!("Not fixing {} at {}: {}", issue.issue_type, issue.location, e);
                return FixResult::failed(issue, "none", &e, started);
            }
        };

        let ctx = FixContext {
            runner: env.runner,
            fs: env.fs,
            command_timeout: self.fix_timeout,
            backup_dir: self.backup_dir.as_deref(),
        };

        match fixer.fix(issue, &ctx) {
            Ok(outcome) => {
                tracing::info!(
                    fixer = fixer.name(),
                    issue_type = %issue.issue_type,
                    location = %issue.location,
                    "{}",
                    outcome.action
                );
                FixResult::applied(issue, fixer.name(), outcome, started)
            }
            Err(e) => {
                log_error(&SysmendError::fixer(
                    fixer.name(),
                    format!("{} at {}: {}", issue.issue_type, issue.location, e),
                ));
                FixResult::failed(issue, fixer.name(), &e, started)
            }
        }
    }

    /// Sequentially fix `batch`; one failure never stops later fixes
    pub fn remediate_batch(
        &self,
        batch: &[Issue],
        env: &FixEnvironment<'_>,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> RemediationReport {
        let mut report = RemediationReport::default();

        for issue in batch {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Remediation interrupted, {} fixes not attempted",
                    batch.len() - report.attempted
                );
                report.interrupted = true;
                break;
            }

            let result = self.remediate(issue, env);
            report.attempted += 1;

            if result.applied {
                report.applied += 1;
                sink.record_event(
                    "fix_applied",
                    &json!({
                        "type": issue.issue_type,
                        "location": issue.location,
                        "message": issue.message,
                        "fixer": result.fixer,
                        "action": result.action,
                    }),
                );
            } else {
                sink.record_error(
                    "fix_failed",
                    &json!({
                        "type": issue.issue_type,
                        "location": issue.location,
                        "message": issue.message,
                        "error": result.error,
                    }),
                );
            }

            report.results.push(result);
        }

        sink.record_event(
            "remediation_completed",
            &json!({
                "attempted": report.attempted,
                "fixes_applied_count": report.applied,
                "interrupted": report.interrupted,
            }),
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::OsFileSystem;
    use crate::scanners::{FixPayload, IssueType, Severity};
    use crate::testing::{MemorySink, MockCommandRunner};

    fn config(backup_dir: Option<&std::path::Path>) -> Config {
        let mut config = Config::default_config();
        match backup_dir {
            Some(dir) => config.fixer.backup_dir = dir.display().to_string(),
            None => config.fixer.backup_before_fix = false,
        }
        config
    }

    fn missing_dir(path: PathBuf) -> Issue {
        Issue::new(
            IssueType::MissingDirectory,
            Severity::Warning,
            path.display().to_string(),
            "Missing directory",
        )
        .with_fix(FixPayload::CreateDirectory { path })
    }

    fn inactive(service: &str) -> Issue {
        Issue::new(IssueType::ServiceInactive, Severity::Warning, service, "not running").with_fix(
            FixPayload::StartService {
                service: service.to_string(),
            },
        )
    }

    #[test]
    fn test_unsupported_type_is_never_executed() {
        let runner = MockCommandRunner::new();
        let env = FixEnvironment {
            runner: &runner,
            fs: &OsFileSystem,
        };
        let issue = Issue::new(IssueType::MissingFile, Severity::Info, "/srv/README.md", "missing");

        let result = Remediator::new(&config(None)).remediate(&issue, &env);

        assert!(!result.applied);
        assert!(result.error.unwrap().starts_with("unsupported"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_auto_fix_disabled_refuses() {
        let mut config = config(None);
        config.fixer.auto_fix_safe = false;
        let runner = MockCommandRunner::new();
        let env = FixEnvironment {
            runner: &runner,
            fs: &OsFileSystem,
        };

        let result = Remediator::new(&config).remediate(&inactive("nginx"), &env);
        assert!(!result.applied);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_batch_continues_after_failure_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            MockCommandRunner::new().with_response("systemctl start nginx", 1, "", "failed\n");
        let env = FixEnvironment {
            runner: &runner,
            fs: &OsFileSystem,
        };
        let sink = MemorySink::new();
        let batch = vec![
            inactive("nginx"),
            missing_dir(dir.path().join("sites-enabled")),
            inactive("docker"),
        ];

        let report = Remediator::new(&config(None)).remediate_batch(
            &batch,
            &env,
            &sink,
            &CancelToken::new(),
        );

        assert_eq!(report.attempted, 3);
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.results[0].applied);
        assert!(dir.path().join("sites-enabled").is_dir());
        assert_eq!(
            runner.calls(),
            vec!["systemctl start nginx".to_string(), "systemctl start docker".to_string()]
        );

        assert_eq!(sink.event_names(), vec!["fix_applied", "fix_applied", "remediation_completed"]);
        assert_eq!(sink.error_names(), vec!["fix_failed"]);
        let applied = sink.last_event("fix_applied").unwrap();
        assert_eq!(applied["location"], "docker");
        assert_eq!(applied["message"], "not running");
        let completed = sink.last_event("remediation_completed").unwrap();
        assert_eq!(completed["fixes_applied_count"], 2);
        assert_eq!(completed["attempted"], 3);
    }

    #[test]
    fn test_cancel_between_fixes_keeps_completed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::new();
        let env = FixEnvironment {
            runner: &runner,
            fs: &OsFileSystem,
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = Remediator::new(&config(None)).remediate_batch(
            &[missing_dir(dir.path().join("a"))],
            &env,
            &MemorySink::new(),
            &cancel,
        );

        assert!(report.interrupted);
        assert_eq!(report.attempted, 0);
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_plan_describes_commands() {
        let plan = Remediator::new(&config(None)).plan(&[
            inactive("ssh"),
            Issue::new(IssueType::HighLoad, Severity::Warning, "system", "busy"),
        ]);

        assert_eq!(plan[0].command, "systemctl start ssh");
        assert_eq!(plan[0].action, "Start service");
        assert!(plan[1].command.starts_with("(skipped"));
    }

    #[test]
    fn test_permission_fix_writes_backup_when_enabled() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sshd_config");
        std::fs::write(&file, "").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600)).unwrap();
        let backups = dir.path().join("backups");

        let runner = MockCommandRunner::new();
        let env = FixEnvironment {
            runner: &runner,
            fs: &OsFileSystem,
        };
        let issue = Issue::new(
            IssueType::WrongPermissions,
            Severity::Warning,
            file.display().to_string(),
            "Incorrect permissions",
        )
        .with_fix(FixPayload::SetMode {
            path: file.clone(),
            mode: 0o644,
        });

        let result = Remediator::new(&config(Some(backups.as_path()))).remediate(&issue, &env);

        assert!(result.applied);
        assert_eq!(result.fixer, "permission_fixer");
        assert!(result.backup_created.unwrap().starts_with(&backups));
    }
}
