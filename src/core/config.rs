use super::errors::{SysmendError, SysmendResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub fixer: FixerConfig,
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "sysmend".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Scan targets and remediation switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixerConfig {
    pub scan_directories: Vec<String>,
    pub backup_before_fix: bool,
    /// Master switch for automatic remediation of the safe fix set
    pub auto_fix_safe: bool,
    pub backup_dir: String,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            scan_directories: vec![
                "/home".to_string(),
                "/opt".to_string(),
                "/etc/nginx".to_string(),
            ],
            backup_before_fix: true,
            auto_fix_safe: true,
            backup_dir: "/var/backups/sysmend".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Upper bound for every probe-side OS command
    pub command_timeout_secs: u64,
    /// Upper bound for service start commands issued by the remediator
    pub fix_command_timeout_secs: u64,
    pub log_tail_lines: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 5,
            fix_command_timeout_secs: 30,
            log_tail_lines: 100,
        }
    }
}

impl ScannerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn fix_command_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_command_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file; missing keys fall back to defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SysmendResult<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            SysmendError::config(format!(
                "Config file could not be read: {} - Error: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            SysmendError::config_with_source("Config file could not be parsed", e.into())
        })?;

        Ok(config)
    }

    /// Default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> SysmendResult<()> {
        if self.fixer.scan_directories.is_empty() {
            return Err(SysmendError::config("fixer.scan_directories must not be empty"));
        }

        if let Some(blank) = self
            .fixer
            .scan_directories
            .iter()
            .find(|dir| dir.trim().is_empty())
        {
            return Err(SysmendError::config(format!(
                "fixer.scan_directories contains a blank entry: {:?}",
                blank
            )));
        }

        if self.scanner.command_timeout_secs == 0 || self.scanner.fix_command_timeout_secs == 0 {
            return Err(SysmendError::config("command timeouts must be at least one second"));
        }

        if self.scanner.log_tail_lines == 0 {
            return Err(SysmendError::config("scanner.log_tail_lines must be positive"));
        }

        if self.fixer.backup_before_fix && self.fixer.backup_dir.trim().is_empty() {
            return Err(SysmendError::config(
                "fixer.backup_dir is required when backup_before_fix is enabled",
            ));
        }

        Ok(())
    }

    pub fn scan_directories(&self) -> Vec<PathBuf> {
        self.fixer.scan_directories.iter().map(PathBuf::from).collect()
    }

    pub fn to_yaml(&self) -> SysmendResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert!(config.fixer.auto_fix_safe);
        assert!(config.fixer.backup_before_fix);
        assert_eq!(config.scanner.command_timeout_secs, 5);
    }

    #[test]
    fn test_empty_scan_directories_rejected() {
        let mut config = Config::default_config();
        config.fixer.scan_directories.clear();
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_partial_yaml_merges_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fixer:\n  scan_directories: [\"/tmp/test\"]\n  auto_fix_safe: false\n"
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.fixer.scan_directories, vec!["/tmp/test".to_string()]);
        assert!(!config.fixer.auto_fix_safe);
        assert!(config.fixer.backup_before_fix);
        assert_eq!(config.scanner.log_tail_lines, 100);
        assert_eq!(config.app.log_level, "info");
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fixer: [not, a, map").unwrap();

        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, SysmendError::Config { .. }));
    }
}
