use super::configuration::ConfigurationProbe;
use super::filesystem::FilesystemProbe;
use super::logs::LogsProbe;
use super::permissions::PermissionsProbe;
use super::progress::{fraction, NoProgress, ProbeProgress, ProgressEvent, ProgressSink};
use super::resources::ResourcesProbe;
use super::security::SecurityProbe;
use super::services::ServicesProbe;
use super::{Issue, IssueType, Probe, ProbeContext};
use crate::core::cancel::CancelToken;
use crate::core::command::CommandRunner;
use crate::core::config::ScannerConfig;
use crate::core::errors::{log_error, SysmendError, SysmendResult};
use crate::core::fs::FileSystem;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

type ProbeFactory = Box<dyn Fn(&dyn CommandRunner) -> Box<dyn Probe> + Send + Sync>;

/// Explicit key -> factory table the scanner is built from.
///
/// Factories receive the command runner so probes can pick their strategy
/// (firewall front-end, service manager) once, at construction.
pub struct ProbeRegistry {
    entries: Vec<(&'static str, ProbeFactory)>,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProbeRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The full probe catalog, in scan order
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.add("filesystem", |_| Box::new(FilesystemProbe::new()));
        registry.add("services", |runner| Box::new(ServicesProbe::detect(runner)));
        registry.add("configuration", |runner| {
            Box::new(ConfigurationProbe::detect(runner))
        });
        registry.add("permissions", |_| Box::new(PermissionsProbe::new()));
        registry.add("logs", |_| Box::new(LogsProbe::new()));
        registry.add("security", |runner| Box::new(SecurityProbe::detect(runner)));
        registry.add("resources", |_| Box::new(ResourcesProbe::new()));
        registry
    }

    fn add<F>(&mut self, key: &'static str, factory: F)
    where
        F: Fn(&dyn CommandRunner) -> Box<dyn Probe> + Send + Sync + 'static,
    {
        self.entries.push((key, Box::new(factory)));
    }

    /// Append a probe; keys must be unique
    pub fn register<F>(&mut self, key: &'static str, factory: F) -> SysmendResult<()>
    where
        F: Fn(&dyn CommandRunner) -> Box<dyn Probe> + Send + Sync + 'static,
    {
        if self.contains(key) {
            return Err(SysmendError::config(format!(
                "Probe '{}' is already registered",
                key
            )));
        }
        self.add(key, factory);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(&self, runner: &dyn CommandRunner) -> Vec<Box<dyn Probe>> {
        self.entries
            .iter()
            .map(|(_, factory)| factory(runner))
            .collect()
    }
}

/// Host access handed to every probe of one scan
pub struct ScanEnvironment<'a> {
    pub scan_directories: &'a [PathBuf],
    pub settings: &'a ScannerConfig,
    pub runner: &'a dyn CommandRunner,
    pub fs: &'a dyn FileSystem,
}

/// How one probe went
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub key: String,
    pub issues: usize,
    /// Set when the probe returned an error or panicked
    pub failure: Option<String>,
    pub duration_ms: u64,
}

/// Issues and per-probe outcomes of one scanner invocation.
///
/// Append-only while the scan runs; the next scan produces a new session
/// instead of mutating this one.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    issues: Vec<Issue>,
    outcomes: Vec<ProbeOutcome>,
    interrupted: bool,
}

impl ScanSession {
    fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            issues: Vec::new(),
            outcomes: Vec::new(),
            interrupted: false,
        }
    }

    /// Session built from already-known issues, outside any scan
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let mut session = Self::begin();
        session.issues = issues;
        session.finished_at = Some(session.started_at);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }

    /// Cancelled before every probe ran
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Runs probes in catalog order, each exactly once
pub struct Scanner {
    probes: Vec<Box<dyn Probe>>,
}

impl Scanner {
    pub fn new(probes: Vec<Box<dyn Probe>>) -> Self {
        Self { probes }
    }

    pub fn from_registry(registry: &ProbeRegistry, runner: &dyn CommandRunner) -> Self {
        Self::new(registry.build(runner))
    }

    pub fn probe_keys(&self) -> Vec<&'static str> {
        self.probes.iter().map(|probe| probe.key()).collect()
    }

    pub fn run_quiet(&self, env: &ScanEnvironment<'_>) -> ScanSession {
        self.run(env, &NoProgress, &CancelToken::new())
    }

    pub fn run(
        &self,
        env: &ScanEnvironment<'_>,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> ScanSession {
        let mut session = ScanSession::begin();
        let total = self.probes.len();

        tracing::info!(session = %session.id, probes = total, "Starting scan");

        for (index, probe) in self.probes.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!("Scan interrupted before {}", probe.key());
                session.interrupted = true;
                break;
            }

            let key = probe.key();
            progress.report(ProgressEvent::ProbeStarted {
                key,
                title: probe.title(),
                index,
                total,
            });

            let ctx = ProbeContext {
                scan_directories: env.scan_directories,
                settings: env.settings,
                runner: env.runner,
                fs: env.fs,
                progress: ProbeProgress::new(progress, key),
            };

            let started = Instant::now();
            let (issues, failure) = run_isolated(probe.as_ref(), &ctx);
            let count = issues.len();

            tracing::info!("{} completed: {} issues", key, count);
            for issue in &issues {
                tracing::debug!(
                    probe = key,
                    issue_type = %issue.issue_type,
                    severity = %issue.severity,
                    location = %issue.location,
                    "{}",
                    issue.message
                );
            }

            session
                .issues
                .extend(issues.into_iter().map(|issue| issue.attributed_to(key)));
            session.outcomes.push(ProbeOutcome {
                key: key.to_string(),
                issues: count,
                failure: failure.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            });

            progress.report(ProgressEvent::ProbeFinished {
                key,
                issues: count,
                failed: failure.is_some(),
                overall: fraction(index + 1, total),
            });
        }

        session.finished_at = Some(Utc::now());
        progress.report(ProgressEvent::ScanFinished {
            issues: session.issues.len(),
            interrupted: session.interrupted,
        });

        tracing::info!(
            session = %session.id,
            issues = session.issues.len(),
            interrupted = session.interrupted,
            "Scan finished"
        );

        session
    }
}

/// Run one probe, folding an error or panic into a single `scan_error`
fn run_isolated(probe: &dyn Probe, ctx: &ProbeContext<'_>) -> (Vec<Issue>, Option<String>) {
    let key = probe.key();

    let failure = match catch_unwind(AssertUnwindSafe(|| probe.run(ctx))) {
        Ok(Ok(issues)) => return (issues, None),
        Ok(Err(e)) => SysmendError::probe(key, e.to_string()),
        Err(payload) => {
            SysmendError::probe(key, format!("panicked: {}", panic_message(payload.as_ref())))
        }
    };

    log_error(&failure);
    let message = failure.to_string();
    let issue = Issue::local_failure(
        IssueType::ScanError,
        key,
        message.clone(),
        "Check the logs and rerun the scan",
    );
    (vec![issue], Some(message))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::OsFileSystem;
    use crate::scanners::Severity;
    use crate::testing::{
        FailingProbe, MockCommandRunner, PanickingProbe, RecordingProgress, StaticProbe,
    };

    fn sample_issue(location: &str) -> Issue {
        Issue::new(IssueType::MissingFile, Severity::Info, location, "Missing recommended file")
    }

    fn run_scanner(
        scanner: &Scanner,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> ScanSession {
        let settings = ScannerConfig::default();
        let runner = MockCommandRunner::new();
        let env = ScanEnvironment {
            scan_directories: &[],
            settings: &settings,
            runner: &runner,
            fs: &OsFileSystem,
        };
        scanner.run(&env, progress, cancel)
    }

    #[test]
    fn test_standard_registry_order() {
        let registry = ProbeRegistry::standard();
        assert_eq!(
            registry.keys(),
            vec![
                "filesystem",
                "services",
                "configuration",
                "permissions",
                "logs",
                "security",
                "resources"
            ]
        );

        let scanner = Scanner::from_registry(&registry, &MockCommandRunner::new());
        assert_eq!(scanner.probe_keys(), registry.keys());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ProbeRegistry::standard();
        let result = registry.register("logs", |_| Box::new(StaticProbe::new("logs", Vec::new())));
        assert!(result.is_err());
        assert_eq!(registry.len(), 7);

        registry
            .register("extra", |_| Box::new(StaticProbe::new("extra", Vec::new())))
            .unwrap();
        assert!(registry.contains("extra"));
    }

    #[test]
    fn test_failing_and_panicking_probes_are_isolated() {
        let scanner = Scanner::new(vec![
            Box::new(StaticProbe::new("first", vec![sample_issue("/a")])),
            Box::new(FailingProbe::new("broken")),
            Box::new(PanickingProbe::new("explodes")),
            Box::new(StaticProbe::new("last", vec![sample_issue("/b")])),
        ]);

        let session = run_scanner(&scanner, &NoProgress, &CancelToken::new());

        assert_eq!(session.len(), 4);
        let probes: Vec<_> = session.issues().iter().map(|i| i.probe.as_str()).collect();
        assert_eq!(probes, vec!["first", "broken", "explodes", "last"]);

        let failures: Vec<_> = session
            .issues()
            .iter()
            .filter(|issue| issue.issue_type == IssueType::ScanError)
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|issue| issue.severity == Severity::Warning));
        assert!(session.outcomes()[2].failure.as_deref().unwrap_or_default().contains("panicked"));
        assert!(!session.interrupted());
    }

    #[test]
    fn test_progress_events() {
        let scanner = Scanner::new(vec![
            Box::new(StaticProbe::new("one", vec![sample_issue("/a")])),
            Box::new(StaticProbe::new("two", Vec::new())),
        ]);
        let progress = RecordingProgress::new();

        run_scanner(&scanner, &progress, &CancelToken::new());

        let events = progress.events();
        assert_eq!(events.len(), 5);
        assert!(matches!(
            events[0],
            ProgressEvent::ProbeStarted { key: "one", index: 0, total: 2, .. }
        ));
        assert!(matches!(
            events[1],
            ProgressEvent::ProbeFinished { key: "one", issues: 1, failed: false, .. }
        ));
        assert_eq!(
            events[4],
            ProgressEvent::ScanFinished {
                issues: 1,
                interrupted: false
            }
        );
    }

    #[test]
    fn test_cancelled_scan_keeps_completed_issues() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let progress = move |event: ProgressEvent| {
            if let ProgressEvent::ProbeFinished { key: "one", .. } = event {
                trigger.cancel();
            }
        };
        let scanner = Scanner::new(vec![
            Box::new(StaticProbe::new("one", vec![sample_issue("/a")])),
            Box::new(StaticProbe::new("two", vec![sample_issue("/b")])),
        ]);

        let session = run_scanner(&scanner, &progress, &cancel);

        assert!(session.interrupted());
        assert_eq!(session.len(), 1);
        assert_eq!(session.outcomes().len(), 1);
    }

    #[test]
    fn test_each_run_is_a_fresh_session() {
        let scanner =
            Scanner::new(vec![Box::new(StaticProbe::new("one", vec![sample_issue("/a")]))]);
        let first = run_scanner(&scanner, &NoProgress, &CancelToken::new());
        let second = run_scanner(&scanner, &NoProgress, &CancelToken::new());

        assert_ne!(first.id(), second.id());
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
