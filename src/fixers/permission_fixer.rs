use super::backup::{write_mode_backup, ModeBackup};
use super::{FixContext, FixError, FixOutcome, Fixer};
use crate::scanners::{FixPayload, Issue, IssueType};
use std::path::Path;

/// Applies the exact mode a permissions issue asks for
pub struct PermissionFixer;

impl PermissionFixer {
    fn target(issue: &Issue) -> Result<(&Path, u32), FixError> {
        match &issue.fix {
            Some(FixPayload::SetMode { path, mode }) => Ok((path.as_path(), *mode)),
            Some(_) => Err(FixError::PayloadMismatch(issue.issue_type)),
            None => Err(FixError::MissingPayload(issue.location.clone())),
        }
    }
}

impl Fixer for PermissionFixer {
    fn name(&self) -> &'static str {
        "permission_fixer"
    }

    fn handles(&self) -> IssueType {
        IssueType::WrongPermissions
    }

    fn describe(&self, issue: &Issue) -> Result<String, FixError> {
        let (path, mode) = Self::target(issue)?;
        Ok(format!("chmod {:o} {}", mode, path.display()))
    }

    fn fix(&self, issue: &Issue, ctx: &FixContext<'_>) -> Result<FixOutcome, FixError> {
        let (path, mode) = Self::target(issue)?;

        // The backup must exist before the path is touched
        let backup = match ctx.backup_dir {
            Some(dir) => {
                let previous = ctx.fs.mode(path)?;
                let record = ModeBackup::new(path, previous, mode);
                Some(write_mode_backup(ctx.fs, dir, &record).map_err(FixError::Backup)?)
            }
            None => None,
        };

        tracing::info!("Setting mode {:o} on {}", mode, path.display());
        ctx.fs.set_mode(path, mode)?;

        let outcome = FixOutcome::new(format!("chmod {:o} {}", mode, path.display()));
        Ok(match backup {
            Some(backup) => outcome.with_backup(backup),
            None => outcome,
        })
    }
}
