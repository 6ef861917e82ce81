//! Runs each service's own config test command against configs that exist.

use crate::core::command::CommandRunner;
use crate::core::fs::FileSystem;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    /// Test command exited non-zero; holds its stderr
    Invalid(String),
    NotFound,
    CouldNotValidate(String),
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Valid => f.write_str("Configuration valid"),
            ValidationStatus::Invalid(_) => f.write_str("Configuration has errors"),
            ValidationStatus::NotFound => f.write_str("File not found"),
            ValidationStatus::CouldNotValidate(reason) => {
                write!(f, "Could not validate: {}", reason)
            }
        }
    }
}

/// A config file and the command that tests it
#[derive(Debug, Clone)]
pub struct ValidationTarget {
    pub name: &'static str,
    pub path: PathBuf,
    pub program: &'static str,
    pub args: Vec<&'static str>,
}

impl ValidationTarget {
    pub fn new(
        name: &'static str,
        path: impl Into<PathBuf>,
        program: &'static str,
        args: Vec<&'static str>,
    ) -> Self {
        Self {
            name,
            path: path.into(),
            program,
            args,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub name: &'static str,
    pub path: PathBuf,
    pub status: ValidationStatus,
}

pub struct ConfigValidator {
    targets: Vec<ValidationTarget>,
    timeout: Duration,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::with_targets(vec![
            ValidationTarget::new("nginx.conf", "/etc/nginx/nginx.conf", "nginx", vec!["-t"]),
            ValidationTarget::new("sshd_config", "/etc/ssh/sshd_config", "sshd", vec!["-t"]),
            ValidationTarget::new("main.cf", "/etc/postfix/main.cf", "postfix", vec!["check"]),
        ])
    }

    pub fn with_targets(targets: Vec<ValidationTarget>) -> Self {
        Self {
            targets,
            timeout: VALIDATION_TIMEOUT,
        }
    }

    pub fn validate(
        &self,
        runner: &dyn CommandRunner,
        fs: &dyn FileSystem,
    ) -> Vec<ValidationResult> {
        self.targets
            .iter()
            .map(|target| {
                let status = self.validate_target(target, runner, fs);
                tracing::info!(config = target.name, "{}", status);
                ValidationResult {
                    name: target.name,
                    path: target.path.clone(),
                    status,
                }
            })
            .collect()
    }

    fn validate_target(
        &self,
        target: &ValidationTarget,
        runner: &dyn CommandRunner,
        fs: &dyn FileSystem,
    ) -> ValidationStatus {
        if !fs.exists(&target.path) {
            return ValidationStatus::NotFound;
        }

        match runner.run(target.program, &target.args, self.timeout) {
            Ok(output) if output.success() => ValidationStatus::Valid,
            Ok(output) => ValidationStatus::Invalid(output.stderr.trim().to_string()),
            Err(e) => ValidationStatus::CouldNotValidate(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFileSystem, MockCommandRunner};

    #[test]
    fn test_statuses() {
        let fs = FakeFileSystem::new()
            .with_existing("/etc/nginx/nginx.conf")
            .with_existing("/etc/ssh/sshd_config");
        let runner = MockCommandRunner::new()
            .with_response("sshd -t", 255, "", "bad option\n")
            .with_timeout("nginx -t");

        let results = ConfigValidator::new().validate(&runner, &fs);

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].status, ValidationStatus::CouldNotValidate(_)));
        assert_eq!(
            results[1].status,
            ValidationStatus::Invalid("bad option".to_string())
        );
        assert_eq!(results[2].status, ValidationStatus::NotFound);
        assert!(!runner.calls().contains(&"postfix check".to_string()));
    }

    #[test]
    fn test_valid_config() {
        let fs = FakeFileSystem::new().with_existing("/etc/postfix/main.cf");
        let runner = MockCommandRunner::new();

        let results = ConfigValidator::new().validate(&runner, &fs);
        assert_eq!(results[2].status, ValidationStatus::Valid);
        assert_eq!(results[2].status.to_string(), "Configuration valid");
    }

    #[test]
    fn test_runs_with_ten_second_timeout() {
        let fs = FakeFileSystem::new().with_existing("/etc/nginx/nginx.conf");
        let runner = MockCommandRunner::new();
        ConfigValidator::new().validate(&runner, &fs);

        assert_eq!(runner.timeouts(), vec![Duration::from_secs(10)]);
    }
}
