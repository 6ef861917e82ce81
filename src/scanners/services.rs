use super::progress::fraction;
use super::{FixPayload, Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use crate::core::command::{CommandError, CommandRunner};
use std::time::Duration;

/// Services whose state is checked on every scan
pub const CRITICAL_SERVICES: [&str; 11] = [
    "nginx",
    "apache2",
    "docker",
    "postgresql",
    "mysql",
    "redis",
    "postfix",
    "dovecot",
    "ssh",
    "sshd",
    "fail2ban",
];

/// Inactive services in this subset are reported
pub const ESSENTIAL_SERVICES: [&str; 4] = ["nginx", "docker", "ssh", "sshd"];

/// Unit state as reported by `systemctl is-active`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Other(String),
}

impl ServiceState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "active" => ServiceState::Active,
            "inactive" => ServiceState::Inactive,
            "failed" => ServiceState::Failed,
            other => ServiceState::Other(other.to_string()),
        }
    }
}

pub(crate) fn query_service_state(
    runner: &dyn CommandRunner,
    service: &str,
    timeout: Duration,
) -> Result<ServiceState, CommandError> {
    let output = runner.run("systemctl", &["is-active", service], timeout)?;
    Ok(ServiceState::parse(&output.stdout))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceManager {
    Systemd,
    Unavailable,
}

pub struct ServicesProbe {
    manager: ServiceManager,
}

impl ServicesProbe {
    /// Pick the service manager once, at construction
    pub fn detect(runner: &dyn CommandRunner) -> Self {
        let manager = if runner.is_available("systemctl") {
            ServiceManager::Systemd
        } else {
            tracing::info!("systemctl not found, service checks will be skipped");
            ServiceManager::Unavailable
        };
        Self { manager }
    }

    pub fn systemd() -> Self {
        Self {
            manager: ServiceManager::Systemd,
        }
    }
}

impl Probe for ServicesProbe {
    fn key(&self) -> &'static str {
        "services"
    }

    fn title(&self) -> &'static str {
        "Checking services..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let mut issues = Vec::new();

        if self.manager == ServiceManager::Unavailable {
            return Ok(issues);
        }

        for (i, service) in CRITICAL_SERVICES.iter().enumerate() {
            ctx.step(
                fraction(i, CRITICAL_SERVICES.len()),
                format!("Checking {}...", service),
            );

            let state = match query_service_state(ctx.runner, service, ctx.command_timeout()) {
                Ok(state) => state,
                Err(e) if e.is_timeout() => {
                    issues.push(Issue::local_failure(
                        IssueType::ScanError,
                        *service,
                        format!("Timed out querying service {}: {}", service, e),
                        "Check the service manager manually",
                    ));
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Could not query {}: {}", service, e);
                    continue;
                }
            };

            match state {
                ServiceState::Failed => issues.push(
                    Issue::new(
                        IssueType::ServiceFailed,
                        Severity::Critical,
                        *service,
                        format!("Service {} has failed", service),
                    )
                    .with_suggestion(format!("Restart service: systemctl restart {}", service)),
                ),
                ServiceState::Inactive if ESSENTIAL_SERVICES.contains(service) => issues.push(
                    Issue::new(
                        IssueType::ServiceInactive,
                        Severity::Warning,
                        *service,
                        format!("Essential service {} is not running", service),
                    )
                    .with_suggestion(format!("Start service: systemctl start {}", service))
                    .with_fix(FixPayload::StartService {
                        service: service.to_string(),
                    }),
                ),
                _ => {}
            }
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCommandRunner, ProbeHarness};

    #[test]
    fn test_state_parsing() {
        assert_eq!(ServiceState::parse("active\n"), ServiceState::Active);
        assert_eq!(ServiceState::parse("inactive"), ServiceState::Inactive);
        assert_eq!(ServiceState::parse("failed"), ServiceState::Failed);
        assert_eq!(
            ServiceState::parse("activating"),
            ServiceState::Other("activating".to_string())
        );
    }

    #[test]
    fn test_failed_and_inactive_services() {
        let runner = MockCommandRunner::new()
            .with_default_stdout("active\n")
            .with_stdout("systemctl is-active nginx", "inactive\n", 3)
            .with_stdout("systemctl is-active mysql", "failed\n", 3)
            .with_stdout("systemctl is-active redis", "inactive\n", 3);

        let harness = ProbeHarness::new().with_runner(runner);
        let issues = harness.run(&ServicesProbe::systemd()).unwrap();

        assert_eq!(issues.len(), 2);

        assert_eq!(issues[0].issue_type, IssueType::ServiceInactive);
        assert_eq!(issues[0].location, "nginx");
        assert_eq!(
            issues[0].fix,
            Some(FixPayload::StartService {
                service: "nginx".to_string()
            })
        );

        assert_eq!(issues[1].issue_type, IssueType::ServiceFailed);
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[1].location, "mysql");
    }

    #[test]
    fn test_timeout_becomes_scan_error() {
        let runner = MockCommandRunner::new()
            .with_default_stdout("active\n")
            .with_timeout("systemctl is-active docker");

        let harness = ProbeHarness::new().with_runner(runner);
        let issues = harness.run(&ServicesProbe::systemd()).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueType::ScanError);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].location, "docker");
    }

    #[test]
    fn test_without_systemctl_probe_is_silent() {
        let runner = MockCommandRunner::new().with_unavailable("systemctl");
        let probe = ServicesProbe::detect(&runner);

        let harness = ProbeHarness::new().with_runner(runner);
        assert!(harness.run(&probe).unwrap().is_empty());
        assert!(harness.runner().calls().is_empty());
    }
}
