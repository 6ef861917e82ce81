use super::progress::fraction;
use super::{Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};

/// Logs whose tail is inspected on every scan
pub const DEFAULT_LOG_FILES: [&str; 4] = [
    "/var/log/auth.log",
    "/var/log/syslog",
    "/var/log/nginx/error.log",
    "/var/log/fail2ban.log",
];

const LOG_PATTERNS: [(&str, IssueType, Severity); 4] = [
    ("FAILED", IssueType::AuthenticationFailure, Severity::Warning),
    ("ERROR", IssueType::SystemError, Severity::Warning),
    ("CRITICAL", IssueType::CriticalError, Severity::Critical),
    ("segfault", IssueType::SegmentationFault, Severity::Critical),
];

struct LogPattern {
    name: &'static str,
    regex: Regex,
    issue_type: IssueType,
    severity: Severity,
}

fn compile_patterns() -> Result<Vec<LogPattern>, ProbeError> {
    LOG_PATTERNS
        .iter()
        .map(|(name, issue_type, severity)| {
            let regex = RegexBuilder::new(&regex::escape(name))
                .case_insensitive(true)
                .build()
                .map_err(|e| ProbeError::Internal(format!("Invalid log pattern {}: {}", name, e)))?;
            Ok(LogPattern {
                name,
                regex,
                issue_type: *issue_type,
                severity: *severity,
            })
        })
        .collect()
}

pub struct LogsProbe {
    files: Vec<PathBuf>,
}

impl Default for LogsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LogsProbe {
    pub fn new() -> Self {
        Self::with_files(DEFAULT_LOG_FILES.iter().map(PathBuf::from).collect())
    }

    pub fn with_files(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    fn tail(&self, path: &Path, ctx: &ProbeContext<'_>) -> Result<Option<String>, ProbeError> {
        let lines = ctx.settings.log_tail_lines.to_string();
        let path_arg = path.to_string_lossy();
        let output = ctx
            .runner
            .run("tail", &["-n", &lines, &path_arg], ctx.command_timeout())?;

        if !output.success() {
            tracing::debug!(
                "tail failed for {}: {}",
                path.display(),
                output.stderr.trim()
            );
            return Ok(None);
        }

        Ok(Some(output.stdout))
    }
}

impl Probe for LogsProbe {
    fn key(&self) -> &'static str {
        "logs"
    }

    fn title(&self) -> &'static str {
        "Analyzing logs..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let patterns = compile_patterns()?;
        let mut issues = Vec::new();

        for (i, file) in self.files.iter().enumerate() {
            if !ctx.fs.exists(file) {
                continue;
            }

            ctx.step(
                fraction(i, self.files.len()),
                format!("Analyzing {}...", file.display()),
            );

            let location = file.display().to_string();
            let content = match self.tail(file, ctx) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    issues.push(Issue::local_failure(
                        IssueType::ScanError,
                        location,
                        format!("Could not read log file: {}", e),
                        "Check log file permissions",
                    ));
                    continue;
                }
            };

            issues.extend(match_patterns(&patterns, &content, &location));
        }

        Ok(issues)
    }
}

fn match_patterns(patterns: &[LogPattern], content: &str, location: &str) -> Vec<Issue> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let count = pattern.regex.find_iter(content).count();
            if count == 0 {
                return None;
            }
            Some(
                Issue::new(
                    pattern.issue_type,
                    pattern.severity,
                    location,
                    format!("Found {} {} entries in log", count, pattern.name),
                )
                .with_suggestion(format!("Review {} for details", location)),
            )
        })
        .collect()
}
