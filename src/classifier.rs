//! Display ordering and auto-fix eligibility for scan issues.

use crate::core::config::FixerConfig;
use crate::scanners::manager::ScanSession;
use crate::scanners::{Issue, IssueType, Severity};
use serde::Serialize;
use std::cmp::Reverse;

/// Only these issue types have a fixer
pub fn is_fixable_type(issue_type: IssueType) -> bool {
    matches!(
        issue_type,
        IssueType::ServiceInactive | IssueType::WrongPermissions | IssueType::MissingDirectory
    )
}

/// What applying a fix would do, for display
pub fn fix_action(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::ServiceInactive => "Start service",
        IssueType::WrongPermissions => "Fix permissions",
        IssueType::MissingDirectory => "Create directory",
        _ => "Manual fix required",
    }
}

/// Critical first, then warning, then info; scan order kept within a tier
pub fn order_for_display(issues: &[Issue]) -> Vec<&Issue> {
    let mut ordered: Vec<&Issue> = issues.iter().collect();
    ordered.sort_by_key(|issue| Reverse(issue.severity));
    ordered
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl IssueSummary {
    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

pub fn summarize(issues: &[Issue]) -> IssueSummary {
    issues
        .iter()
        .fold(IssueSummary::default(), |mut summary, issue| {
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
            summary
        })
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    auto_fix_safe: bool,
}

impl Classifier {
    pub fn new(auto_fix_safe: bool) -> Self {
        Self { auto_fix_safe }
    }

    pub fn from_config(config: &FixerConfig) -> Self {
        Self::new(config.auto_fix_safe)
    }

    pub fn auto_fix_safe(&self) -> bool {
        self.auto_fix_safe
    }

    pub fn is_fixable(&self, issue: &Issue) -> bool {
        self.auto_fix_safe && is_fixable_type(issue.issue_type)
    }

    /// Fix candidates of a session, in scan order
    pub fn fixable_batch(&self, session: &ScanSession) -> Vec<Issue> {
        session
            .issues()
            .iter()
            .filter(|issue| self.is_fixable(issue))
            .cloned()
            .collect()
    }
}
