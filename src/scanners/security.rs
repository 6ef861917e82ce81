use super::{Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use crate::core::command::{CommandOutput, CommandRunner};

/// Firewall front-end detected on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallBackend {
    Ufw,
    Firewalld,
    None,
}

pub struct SecurityProbe {
    backend: FirewallBackend,
}

impl SecurityProbe {
    /// Prefer ufw, then firewalld
    pub fn detect(runner: &dyn CommandRunner) -> Self {
        let backend = if runner.is_available("ufw") {
            FirewallBackend::Ufw
        } else if runner.is_available("firewall-cmd") {
            FirewallBackend::Firewalld
        } else {
            tracing::info!("No supported firewall front-end found");
            FirewallBackend::None
        };
        Self::with_backend(backend)
    }

    pub fn with_backend(backend: FirewallBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> FirewallBackend {
        self.backend
    }

    fn check_ufw(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let output = ctx.runner.run("ufw", &["status"], ctx.command_timeout())?;

        if output.stdout.contains("Status: inactive") {
            return Ok(vec![Issue::new(
                IssueType::SecurityFirewall,
                Severity::Warning,
                "ufw",
                "UFW firewall is inactive",
            )
            .with_suggestion("Enable UFW firewall: ufw enable")]);
        }

        if !output.success() {
            return Ok(vec![query_failure("ufw", &output)]);
        }

        Ok(Vec::new())
    }

    fn check_firewalld(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let output = ctx
            .runner
            .run("firewall-cmd", &["--state"], ctx.command_timeout())?;

        if output.stdout.trim() == "running" {
            return Ok(Vec::new());
        }

        // firewall-cmd exits non-zero and prints "not running" when stopped
        let combined = format!("{}{}", output.stdout, output.stderr);
        if combined.contains("not running") {
            return Ok(vec![Issue::new(
                IssueType::SecurityFirewall,
                Severity::Warning,
                "firewalld",
                "firewalld is not running",
            )
            .with_suggestion("Enable firewalld: systemctl enable --now firewalld")]);
        }

        Ok(vec![query_failure("firewalld", &output)])
    }
}

fn query_failure(location: &str, output: &CommandOutput) -> Issue {
    Issue::local_failure(
        IssueType::ScanError,
        location,
        format!("Could not query firewall status: {}", output.stderr.trim()),
        "Check firewall status manually",
    )
}

impl Probe for SecurityProbe {
    fn key(&self) -> &'static str {
        "security"
    }

    fn title(&self) -> &'static str {
        "Checking security..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let (location, outcome) = match self.backend {
            FirewallBackend::Ufw => {
                ctx.step(0.0, "Checking ufw...");
                ("ufw", self.check_ufw(ctx))
            }
            FirewallBackend::Firewalld => {
                ctx.step(0.0, "Checking firewalld...");
                ("firewalld", self.check_firewalld(ctx))
            }
            FirewallBackend::None => return Ok(Vec::new()),
        };

        match outcome {
            Ok(issues) => Ok(issues),
            Err(ProbeError::Command(e)) => Ok(vec![Issue::local_failure(
                IssueType::ScanError,
                location,
                format!("Could not query firewall status: {}", e),
                "Check firewall status manually",
            )]),
            Err(e) => Err(e),
        }
    }
}
