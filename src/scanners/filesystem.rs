use super::progress::fraction;
use super::thresholds::ThresholdPolicy;
use super::{FixPayload, Issue, IssueType, Probe, ProbeContext, ProbeError, Severity};
use crate::core::fs::FileSystem;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const NGINX_REQUIRED_DIRS: [&str; 2] = ["sites-available", "sites-enabled"];
const PYTHON_MARKERS: [&str; 2] = ["requirements.txt", "setup.py"];
const VENV_INDICATORS: [&str; 4] = ["venv", ".venv", "env", ".env"];
const RECOMMENDED_PROJECT_FILES: [&str; 2] = [".gitignore", "README.md"];
const COMPOSE_FILES: [&str; 2] = ["docker-compose.yml", "docker-compose.yaml"];

/// Disk usage of the root mount plus project-layout checks under each scan
/// directory.
///
/// Every listing and existence check goes through the injected filesystem;
/// the walk is bounded below every scan root.
pub struct FilesystemProbe {
    root_mount: PathBuf,
    max_depth: usize,
    policy: ThresholdPolicy,
}

impl Default for FilesystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemProbe {
    pub fn new() -> Self {
        Self {
            root_mount: PathBuf::from("/"),
            max_depth: 3,
            policy: ThresholdPolicy::full_scan(),
        }
    }

    /// Treat `path` as the root filesystem for the disk-usage check
    pub fn with_root_mount(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_mount = path.into();
        self
    }

    fn check_disk_usage(&self, dir: &Path, ctx: &ProbeContext<'_>) -> Option<Issue> {
        let usage = match ctx.fs.disk_usage(dir) {
            Ok(usage) => usage,
            Err(e) => {
                return Some(Issue::local_failure(
                    IssueType::ScanError,
                    dir.display().to_string(),
                    format!("Could not read disk usage: {}", e),
                    "Check filesystem accessibility",
                ));
            }
        };

        let percent = usage.percent();
        let severity = self.policy.disk(percent)?;
        let (message, suggestion) = match severity {
            Severity::Critical => (
                format!("Disk usage at {:.1}% - critically high", percent),
                "Clean up unnecessary files or extend disk space",
            ),
            _ => (
                format!("Disk usage at {:.1}% - getting high", percent),
                "Consider cleaning up files",
            ),
        };

        Some(
            Issue::new(IssueType::DiskSpace, severity, dir.display().to_string(), message)
                .with_suggestion(suggestion),
        )
    }

    fn scan_directory_structure(&self, root: &Path, fs: &dyn FileSystem) -> Vec<Issue> {
        let mut issues = Vec::new();

        if let Err(e) = fs.list_dir(root) {
            issues.push(Issue::local_failure(
                IssueType::ScanError,
                root.display().to_string(),
                format!("Could not scan directory: {}", e),
                "Check directory permissions",
            ));
            return issues;
        }

        // Unreadable subtrees are skipped
        for dir in fs.walk_dirs(root, self.max_depth) {
            let Ok(names) = fs.list_dir(&dir) else {
                continue;
            };
            let names: HashSet<String> = names.into_iter().collect();

            if is_nginx_dir(&dir) {
                check_nginx_structure(&dir, fs, &mut issues);
            }

            if PYTHON_MARKERS.iter().any(|marker| names.contains(*marker)) {
                check_python_project(&dir, &names, fs, &mut issues);
            }

            if COMPOSE_FILES.iter().any(|compose| names.contains(*compose)) {
                check_docker_project(&dir, &names, &mut issues);
            }
        }

        issues
    }
}

impl Probe for FilesystemProbe {
    fn key(&self) -> &'static str {
        "filesystem"
    }

    fn title(&self) -> &'static str {
        "Scanning file systems..."
    }

    fn run(&self, ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        let mut issues = Vec::new();
        let total = ctx.scan_directories.len();

        for (i, dir) in ctx.scan_directories.iter().enumerate() {
            if !ctx.fs.exists(dir) {
                tracing::debug!("Scan directory {} does not exist, skipping", dir.display());
                continue;
            }

            ctx.step(fraction(i, total), format!("Scanning {}...", dir.display()));

            if dir == &self.root_mount {
                issues.extend(self.check_disk_usage(dir, ctx));
            }

            issues.extend(self.scan_directory_structure(dir, ctx.fs));
        }

        Ok(issues)
    }
}

fn is_nginx_dir(dir: &Path) -> bool {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().contains("nginx"))
        .unwrap_or(false)
}

fn check_nginx_structure(nginx_dir: &Path, fs: &dyn FileSystem, issues: &mut Vec<Issue>) {
    for required in NGINX_REQUIRED_DIRS {
        let dir_path = nginx_dir.join(required);
        if fs.exists(&dir_path) {
            continue;
        }

        let location = dir_path.display().to_string();
        issues.push(
            Issue::new(
                IssueType::MissingDirectory,
                Severity::Warning,
                location.clone(),
                format!("Missing Nginx directory: {}", required),
            )
            .with_suggestion(format!("Create directory: mkdir -p {}", location))
            .with_fix(FixPayload::CreateDirectory { path: dir_path }),
        );
    }
}

fn check_python_project(
    project_dir: &Path,
    names: &HashSet<String>,
    fs: &dyn FileSystem,
    issues: &mut Vec<Issue>,
) {
    let has_venv = VENV_INDICATORS
        .iter()
        .any(|venv| fs.exists(&project_dir.join(venv)));

    if !has_venv && names.contains("requirements.txt") {
        issues.push(
            Issue::new(
                IssueType::MissingVenv,
                Severity::Info,
                project_dir.display().to_string(),
                "Python project without virtual environment",
            )
            .with_suggestion("Consider creating a virtual environment: python -m venv venv"),
        );
    }

    for recommended in RECOMMENDED_PROJECT_FILES {
        if names.contains(recommended) {
            continue;
        }
        issues.push(
            Issue::new(
                IssueType::MissingFile,
                Severity::Info,
                project_dir.join(recommended).display().to_string(),
                format!("Missing recommended file: {}", recommended),
            )
            .with_suggestion(format!("Consider creating {}", recommended)),
        );
    }
}

fn check_docker_project(project_dir: &Path, names: &HashSet<String>, issues: &mut Vec<Issue>) {
    if names.contains(".env") {
        return;
    }

    issues.push(
        Issue::new(
            IssueType::MissingEnv,
            Severity::Info,
            project_dir.join(".env").display().to_string(),
            "Docker Compose project without .env file",
        )
        .with_suggestion("Consider creating .env file for environment variables"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::DiskUsage;
    use crate::testing::{FakeFileSystem, ProbeHarness};
    use std::fs;

    fn types_of(issues: &[Issue]) -> Vec<IssueType> {
        issues.iter().map(|issue| issue.issue_type).collect()
    }

    #[test]
    fn test_python_project_without_venv_or_gitignore() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("app");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("requirements.txt"), "flask\n").unwrap();
        fs::write(project.join("README.md"), "# app\n").unwrap();

        let harness = ProbeHarness::new().with_scan_directories(vec![root.path().to_path_buf()]);
        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(
            types_of(&issues),
            vec![IssueType::MissingVenv, IssueType::MissingFile]
        );
        assert_eq!(issues[0].severity, Severity::Info);
        assert!(issues[1].location.ends_with(".gitignore"));
    }

    #[test]
    fn test_python_project_with_venv_is_quiet() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("requirements.txt"), "").unwrap();
        fs::write(root.path().join(".gitignore"), "").unwrap();
        fs::write(root.path().join("README.md"), "").unwrap();
        fs::create_dir(root.path().join(".venv")).unwrap();

        let harness = ProbeHarness::new().with_scan_directories(vec![root.path().to_path_buf()]);
        assert!(harness.run(&FilesystemProbe::new()).unwrap().is_empty());
    }

    #[test]
    fn test_nginx_dir_missing_sites_enabled() {
        let root = tempfile::tempdir().unwrap();
        let nginx = root.path().join("nginx");
        fs::create_dir_all(nginx.join("sites-available")).unwrap();

        let harness = ProbeHarness::new().with_scan_directories(vec![root.path().to_path_buf()]);
        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.issue_type, IssueType::MissingDirectory);
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(
            issue.fix,
            Some(FixPayload::CreateDirectory {
                path: nginx.join("sites-enabled")
            })
        );
    }

    #[test]
    fn test_compose_project_without_env() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("docker-compose.yml"), "services: {}\n").unwrap();

        let harness = ProbeHarness::new().with_scan_directories(vec![root.path().to_path_buf()]);
        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(types_of(&issues), vec![IssueType::MissingEnv]);
    }

    #[test]
    fn test_walk_is_bounded_to_three_levels() {
        let root = tempfile::tempdir().unwrap();
        let shallow = root.path().join("a/b/c");
        let deep = root.path().join("a/b/c/d");
        fs::create_dir_all(&deep).unwrap();
        fs::write(shallow.join("docker-compose.yml"), "").unwrap();
        fs::write(deep.join("docker-compose.yml"), "").unwrap();

        let harness = ProbeHarness::new().with_scan_directories(vec![root.path().to_path_buf()]);
        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(issues.len(), 1);
        assert!(issues[0].location.starts_with(&shallow.display().to_string()));
        assert!(!issues[0].location.contains("/d/"));
    }

    #[test]
    fn test_missing_scan_directory_is_skipped() {
        let harness = ProbeHarness::new()
            .with_scan_directories(vec![PathBuf::from("/definitely/not/here")]);
        assert!(harness.run(&FilesystemProbe::new()).unwrap().is_empty());
    }

    #[test]
    fn test_layout_checks_use_injected_file_system() {
        let fake = FakeFileSystem::new()
            .with_file("/srv/app/requirements.txt", "flask\n")
            .with_file("/srv/app/README.md", "# app\n")
            .with_dir("/srv/nginx/sites-available");
        let harness = ProbeHarness::new()
            .with_file_system(fake)
            .with_scan_directories(vec![PathBuf::from("/srv")]);

        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(
            types_of(&issues),
            vec![
                IssueType::MissingVenv,
                IssueType::MissingFile,
                IssueType::MissingDirectory
            ]
        );
        assert_eq!(issues[0].location, "/srv/app");
        assert_eq!(issues[1].location, "/srv/app/.gitignore");
        assert_eq!(
            issues[2].fix,
            Some(FixPayload::CreateDirectory {
                path: PathBuf::from("/srv/nginx/sites-enabled")
            })
        );
    }

    #[test]
    fn test_injected_venv_directory_silences_warning() {
        let fake = FakeFileSystem::new()
            .with_file("/srv/app/requirements.txt", "")
            .with_file("/srv/app/.gitignore", "")
            .with_file("/srv/app/README.md", "")
            .with_dir("/srv/app/venv");
        let harness = ProbeHarness::new()
            .with_file_system(fake)
            .with_scan_directories(vec![PathBuf::from("/srv/app")]);

        assert!(harness.run(&FilesystemProbe::new()).unwrap().is_empty());
    }

    #[test]
    fn test_unlistable_scan_root_reports_scan_error() {
        let fake = FakeFileSystem::new().with_existing("/srv/locked");
        let harness = ProbeHarness::new()
            .with_file_system(fake)
            .with_scan_directories(vec![PathBuf::from("/srv/locked")]);

        let issues = harness.run(&FilesystemProbe::new()).unwrap();

        assert_eq!(types_of(&issues), vec![IssueType::ScanError]);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].message.starts_with("Could not scan directory"));
    }

    fn disk_issues(used: u64) -> Vec<Issue> {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeFileSystem::new()
            .with_dir(root.path())
            .with_disk_usage(root.path(), DiskUsage { total: 100, used });

        let harness = ProbeHarness::new()
            .with_file_system(fake)
            .with_scan_directories(vec![root.path().to_path_buf()]);
        let probe = FilesystemProbe::new().with_root_mount(root.path());
        harness
            .run(&probe)
            .unwrap()
            .into_iter()
            .filter(|issue| issue.issue_type == IssueType::DiskSpace)
            .collect()
    }

    #[test]
    fn test_disk_usage_thresholds_on_root_mount() {
        let critical = disk_issues(91);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, Severity::Critical);

        let warning = disk_issues(81);
        assert_eq!(warning.len(), 1);
        assert_eq!(warning[0].severity, Severity::Warning);

        assert!(disk_issues(80).is_empty());
    }
}
