//! Pre-change backup records.
//!
//! Only permission bits are changed by the fixers, so a backup is a small JSON
//! record of the previous mode rather than a copy of the file.

use crate::core::errors::{ErrorContext, SysmendResult};
use crate::core::fs::FileSystem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeBackup {
    pub path: PathBuf,
    pub previous_mode: u32,
    pub new_mode: u32,
    pub created_at: DateTime<Utc>,
}

impl ModeBackup {
    pub fn new(path: &Path, previous_mode: u32, new_mode: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            previous_mode,
            new_mode,
            created_at: Utc::now(),
        }
    }

    /// `/etc/ssh/sshd_config` -> `etc_ssh_sshd_config.20240101_120000.<id>.json`
    fn file_name(&self) -> String {
        let flattened: String = self
            .path
            .to_string_lossy()
            .trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        let id = uuid::Uuid::new_v4().simple().to_string();

        format!(
            "{}.{}.{}.json",
            flattened,
            self.created_at.format("%Y%m%d_%H%M%S"),
            &id[..8]
        )
    }
}

/// Write `record` under `backup_dir`, returning the record's path
pub fn write_mode_backup(
    fs: &dyn FileSystem,
    backup_dir: &Path,
    record: &ModeBackup,
) -> SysmendResult<PathBuf> {
    fs.create_dir_all(backup_dir).with_fixer_context("backup", || {
        format!("Could not create backup directory {}", backup_dir.display())
    })?;

    let record_path = backup_dir.join(record.file_name());
    let json = serde_json::to_string_pretty(record)?;
    fs.write(&record_path, &json).with_fixer_context("backup", || {
        format!("Could not write backup record {}", record_path.display())
    })?;

    tracing::info!("Backup created: {}", record_path.display());
    Ok(record_path)
}
