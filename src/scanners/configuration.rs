use super::progress::fraction;
use super::services::{query_service_state, ServiceState};
use super::{FixPayload, Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use crate::core::command::CommandRunner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SECURITY_HEADERS: [&str; 3] = [
    "add_header X-Frame-Options",
    "add_header X-Content-Type-Options",
    "add_header X-XSS-Protection",
];

struct SshRequirement {
    setting: &'static str,
    recommended: &'static str,
    message: &'static str,
}

const SSH_REQUIREMENTS: [SshRequirement; 3] = [
    SshRequirement {
        setting: "PermitRootLogin",
        recommended: "no",
        message: "Root login should be disabled",
    },
    SshRequirement {
        setting: "PasswordAuthentication",
        recommended: "no",
        message: "Password authentication should be disabled",
    },
    SshRequirement {
        setting: "PubkeyAuthentication",
        recommended: "yes",
        message: "Public key authentication should be enabled",
    },
];

/// Config files inspected by [`ConfigurationProbe`]
#[derive(Debug, Clone)]
pub struct ConfigTargets {
    pub nginx_conf: PathBuf,
    pub sshd_config: PathBuf,
    pub fail2ban_jail: PathBuf,
}

impl Default for ConfigTargets {
    fn default() -> Self {
        Self {
            nginx_conf: PathBuf::from("/etc/nginx/nginx.conf"),
            sshd_config: PathBuf::from("/etc/ssh/sshd_config"),
            fail2ban_jail: PathBuf::from("/etc/fail2ban/jail.conf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigCheck {
    Nginx,
    Ssh,
    Fail2ban,
}

pub struct ConfigurationProbe {
    targets: ConfigTargets,
    nginx_syntax_test: bool,
    service_manager: bool,
}

impl ConfigurationProbe {
    /// Decide which external tools are usable once, at construction
    pub fn detect(runner: &dyn CommandRunner) -> Self {
        Self {
            targets: ConfigTargets::default(),
            nginx_syntax_test: runner.is_available("nginx"),
            service_manager: runner.is_available("systemctl"),
        }
    }

    pub fn with_targets(mut self, targets: ConfigTargets) -> Self {
        self.targets = targets;
        self
    }

    fn target(&self, check: ConfigCheck) -> &Path {
        match check {
            ConfigCheck::Nginx => &self.targets.nginx_conf,
            ConfigCheck::Ssh => &self.targets.sshd_config,
            ConfigCheck::Fail2ban => &self.targets.fail2ban_jail,
        }
    }

    fn check_nginx(&self, path: &Path, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let mut issues = Vec::new();
        let location = path.display().to_string();

        // A failed syntax test must not hide the header checks
        if self.nginx_syntax_test {
            match ctx.runner.run("nginx", &["-t"], ctx.command_timeout()) {
                Ok(output) if output.success() => {}
                Ok(_) => issues.push(
                    Issue::new(
                        IssueType::ConfigSyntax,
                        Severity::Critical,
                        location.clone(),
                        "Nginx configuration syntax error",
                    )
                    .with_suggestion("Fix configuration syntax errors and test with 'nginx -t'"),
                ),
                Err(e) => issues.push(Issue::local_failure(
                    IssueType::ConfigError,
                    location.clone(),
                    format!("Could not test Nginx configuration syntax: {}", e),
                    "Run 'nginx -t' manually",
                )),
            }
        }

        let content = ctx.fs.read_to_string(path)?.to_lowercase();
        for header in SECURITY_HEADERS {
            if content.contains(&header.to_lowercase()) {
                continue;
            }
            issues.push(
                Issue::new(
                    IssueType::MissingSecurityHeader,
                    Severity::Info,
                    location.clone(),
                    format!("Missing security header: {}", header),
                )
                .with_suggestion(format!("Add {} to Nginx configuration", header)),
            );
        }

        Ok(issues)
    }

    fn check_ssh(&self, path: &Path, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let content = ctx.fs.read_to_string(path)?;
        let settings = parse_sshd_settings(&content);
        let location = path.display().to_string();
        let mut issues = Vec::new();

        for requirement in &SSH_REQUIREMENTS {
            match settings.get(&requirement.setting.to_lowercase()) {
                None => issues.push(
                    Issue::new(
                        IssueType::MissingConfig,
                        Severity::Warning,
                        location.clone(),
                        format!("Missing SSH setting: {}", requirement.setting),
                    )
                    .with_suggestion(format!(
                        "Add '{} {}' to SSH config",
                        requirement.setting, requirement.recommended
                    )),
                ),
                Some(value) if !value.eq_ignore_ascii_case(requirement.recommended) => issues
                    .push(
                        Issue::new(
                            IssueType::InsecureConfig,
                            Severity::Warning,
                            location.clone(),
                            requirement.message,
                        )
                        .with_suggestion(format!(
                            "Set '{} {}' in SSH config",
                            requirement.setting, requirement.recommended
                        )),
                    ),
                Some(_) => {}
            }
        }

        Ok(issues)
    }

    fn check_fail2ban(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        if !self.service_manager {
            return Ok(Vec::new());
        }

        let state = query_service_state(ctx.runner, "fail2ban", ctx.command_timeout())?;
        if state == ServiceState::Active {
            return Ok(Vec::new());
        }

        Ok(vec![Issue::new(
            IssueType::ServiceInactive,
            Severity::Warning,
            "fail2ban",
            "Fail2ban service is not active",
        )
        .with_suggestion("Start fail2ban service for security protection")
        .with_fix(FixPayload::StartService {
            service: "fail2ban".to_string(),
        })])
    }
}

impl Probe for ConfigurationProbe {
    fn key(&self) -> &'static str {
        "configuration"
    }

    fn title(&self) -> &'static str {
        "Validating configurations..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let checks = [ConfigCheck::Nginx, ConfigCheck::Ssh, ConfigCheck::Fail2ban];
        let mut issues = Vec::new();

        for (i, check) in checks.iter().enumerate() {
            let path = self.target(*check);
            if !ctx.fs.exists(path) {
                continue;
            }

            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            ctx.step(fraction(i, checks.len()), format!("Checking {}...", name));

            let outcome = match check {
                ConfigCheck::Nginx => self.check_nginx(path, ctx),
                ConfigCheck::Ssh => self.check_ssh(path, ctx),
                ConfigCheck::Fail2ban => self.check_fail2ban(ctx),
            };

            match outcome {
                Ok(found) => issues.extend(found),
                Err(e) => issues.push(Issue::local_failure(
                    IssueType::ConfigError,
                    path.display().to_string(),
                    format!("Error checking configuration: {}", e),
                    "Manually review configuration file",
                )),
            }
        }

        Ok(issues)
    }
}

/// Keyword -> value map of an sshd_config, keys lowercased.
///
/// Comments and blank lines are ignored; the first occurrence of a keyword
/// wins, as it does for sshd itself.
fn parse_sshd_settings(content: &str) -> HashMap<String, String> {
    let mut settings = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, |c: char| c.is_whitespace() || c == '=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };

        let value = value.trim_start_matches(|c: char| c.is_whitespace() || c == '=');
        let value = value.split_whitespace().next().unwrap_or_default();
        settings
            .entry(key.to_lowercase())
            .or_insert_with(|| value.to_string());
    }

    settings
}
