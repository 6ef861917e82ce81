use super::progress::fraction;
use super::{FixPayload, Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use std::path::PathBuf;

/// Expected permission bits for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    pub path: PathBuf,
    pub expected_mode: u32,
    pub severity: Severity,
}

impl PermissionRule {
    pub fn new(path: impl Into<PathBuf>, expected_mode: u32, severity: Severity) -> Self {
        Self {
            path: path.into(),
            expected_mode,
            severity,
        }
    }
}

/// Critical system paths and the modes they should carry
pub fn default_rules() -> Vec<PermissionRule> {
    vec![
        PermissionRule::new("/etc/shadow", 0o640, Severity::Critical),
        PermissionRule::new("/etc/passwd", 0o644, Severity::Warning),
        PermissionRule::new("/etc/ssh/sshd_config", 0o644, Severity::Warning),
        PermissionRule::new("/var/log", 0o755, Severity::Info),
        PermissionRule::new("/tmp", 0o1777, Severity::Warning),
    ]
}

pub struct PermissionsProbe {
    rules: Vec<PermissionRule>,
}

impl Default for PermissionsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionsProbe {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn with_rules(rules: Vec<PermissionRule>) -> Self {
        Self { rules }
    }

    fn check_rule(&self, rule: &PermissionRule, ctx: &ProbeContext<'_>) -> Option<Issue> {
        let location = rule.path.display().to_string();

        let actual = match ctx.fs.mode(&rule.path) {
            Ok(mode) => mode,
            Err(e) => {
                return Some(Issue::local_failure(
                    IssueType::PermissionError,
                    location,
                    format!("Could not check permissions: {}", e),
                    "Check file accessibility",
                ));
            }
        };

        if actual == rule.expected_mode {
            return None;
        }

        Some(
            Issue::new(
                IssueType::WrongPermissions,
                rule.severity,
                location.clone(),
                format!(
                    "Incorrect permissions: 0o{:o} (expected 0o{:o})",
                    actual, rule.expected_mode
                ),
            )
            .with_suggestion(format!(
                "Fix permissions: chmod 0o{:o} {}",
                rule.expected_mode, location
            ))
            .with_fix(FixPayload::SetMode {
                path: rule.path.clone(),
                mode: rule.expected_mode,
            }),
        )
    }
}

impl Probe for PermissionsProbe {
    fn key(&self) -> &'static str {
        "permissions"
    }

    fn title(&self) -> &'static str {
        "Checking permissions..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let mut issues = Vec::new();

        for (i, rule) in self.rules.iter().enumerate() {
            if !ctx.fs.exists(&rule.path) {
                continue;
            }

            ctx.step(
                fraction(i, self.rules.len()),
                format!("Checking {}...", rule.path.display()),
            );
            issues.extend(self.check_rule(rule, ctx));
        }

        Ok(issues)
    }
}
