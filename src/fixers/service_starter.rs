use super::{FixContext, FixError, FixOutcome, Fixer};
use crate::scanners::{FixPayload, Issue, IssueType};

/// Starts an inactive systemd unit
pub struct ServiceStarter;

impl ServiceStarter {
    fn service_name(issue: &Issue) -> Result<&str, FixError> {
        match &issue.fix {
            Some(FixPayload::StartService { service }) => Ok(service),
            Some(_) => Err(FixError::PayloadMismatch(issue.issue_type)),
            None => Err(FixError::MissingPayload(issue.location.clone())),
        }
    }
}

impl Fixer for ServiceStarter {
    fn name(&self) -> &'static str {
        "service_starter"
    }

    fn handles(&self) -> IssueType {
        IssueType::ServiceInactive
    }

    fn describe(&self, issue: &Issue) -> Result<String, FixError> {
        Ok(format!("systemctl start {}", Self::service_name(issue)?))
    }

    fn fix(&self, issue: &Issue, ctx: &FixContext<'_>) -> Result<FixOutcome, FixError> {
        let service = Self::service_name(issue)?;

        tracing::info!("Starting service: {}", service);
        let output = ctx
            .runner
            .run("systemctl", &["start", service], ctx.command_timeout)?;

        if !output.success() {
            return Err(FixError::CommandFailed {
                command: format!("systemctl start {}", service),
                status: output
                    .status
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(FixOutcome::new(format!("Started service {}", service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::OsFileSystem;
    use crate::scanners::Severity;
    use crate::testing::MockCommandRunner;
    use std::time::Duration;

    fn inactive(service: &str) -> Issue {
        Issue::new(IssueType::ServiceInactive, Severity::Warning, service, "not running").with_fix(
            FixPayload::StartService {
                service: service.to_string(),
            },
        )
    }

    fn context(runner: &MockCommandRunner) -> FixContext<'_> {
        FixContext {
            runner,
            fs: &OsFileSystem,
            command_timeout: Duration::from_secs(30),
            backup_dir: None,
        }
    }

    #[test]
    fn test_start_succeeds_on_zero_exit() {
        let runner = MockCommandRunner::new();
        let outcome = ServiceStarter.fix(&inactive("nginx"), &context(&runner)).unwrap();

        assert_eq!(outcome.action, "Started service nginx");
        assert_eq!(runner.calls(), vec!["systemctl start nginx".to_string()]);
        assert_eq!(runner.timeouts(), vec![Duration::from_secs(30)]);
    }

    #[test]
    fn test_non_zero_exit_fails() {
        let runner = MockCommandRunner::new().with_response(
            "systemctl start docker",
            5,
            "",
            "Unit docker.service not found.\n",
        );
        let err = ServiceStarter
            .fix(&inactive("docker"), &context(&runner))
            .unwrap_err();

        assert!(matches!(err, FixError::CommandFailed { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_timeout_fails() {
        let runner = MockCommandRunner::new().with_timeout("systemctl start ssh");
        let err = ServiceStarter.fix(&inactive("ssh"), &context(&runner)).unwrap_err();
        assert!(matches!(err, FixError::Command(_)));
    }

    #[test]
    fn test_missing_payload_never_runs() {
        let runner = MockCommandRunner::new();
        let issue =
            Issue::new(IssueType::ServiceInactive, Severity::Warning, "nginx", "not running");

        assert!(ServiceStarter.fix(&issue, &context(&runner)).is_err());
        assert!(runner.calls().is_empty());
    }
}
