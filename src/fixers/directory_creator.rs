use super::{FixContext, FixError, FixOutcome, Fixer};
use crate::scanners::{FixPayload, Issue, IssueType};
use std::path::Path;

/// Creates a missing directory and its parents
pub struct DirectoryCreator;

impl DirectoryCreator {
    fn target(issue: &Issue) -> Result<&Path, FixError> {
        match &issue.fix {
            Some(FixPayload::CreateDirectory { path }) => Ok(path),
            Some(_) => Err(FixError::PayloadMismatch(issue.issue_type)),
            None => Err(FixError::MissingPayload(issue.location.clone())),
        }
    }
}

impl Fixer for DirectoryCreator {
    fn name(&self) -> &'static str {
        "directory_creator"
    }

    fn handles(&self) -> IssueType {
        IssueType::MissingDirectory
    }

    fn describe(&self, issue: &Issue) -> Result<String, FixError> {
        Ok(format!("mkdir -p {}", Self::target(issue)?.display()))
    }

    fn fix(&self, issue: &Issue, ctx: &FixContext<'_>) -> Result<FixOutcome, FixError> {
        let path = Self::target(issue)?;

        tracing::info!("Creating directory {}", path.display());
        ctx.fs.create_dir_all(path)?;

        Ok(FixOutcome::new(format!("Created directory {}", path.display())))
    }
}
