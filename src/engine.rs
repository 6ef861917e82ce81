//! Scan / classify / remediate lifecycle.
//!
//! ```text
//! Idle -> Scanning -> Classified -> AwaitingConfirmation -> Remediating -> Idle
//!                          \-> finish() -> Idle
//! ```
//!
//! Remediation is only reachable from `Classified`, i.e. from a scan that ran
//! every probe. An interrupted scan keeps its session for display but returns
//! the engine to `Idle`.

use crate::classifier::{summarize, Classifier};
use crate::core::cancel::CancelToken;
use crate::core::command::CommandRunner;
use crate::core::config::Config;
use crate::core::errors::{SysmendError, SysmendResult};
use crate::core::fs::FileSystem;
use crate::core::sink::EventSink;
use crate::fixers::manager::{FixEnvironment, RemediationReport, Remediator};
use crate::fixers::Confirm;
use crate::scanners::health::{HealthCheck, HealthReport};
use crate::scanners::manager::{ProbeRegistry, ScanEnvironment, ScanSession, Scanner};
use crate::scanners::progress::ProgressSink;
use crate::scanners::validator::{ConfigValidator, ValidationResult};
use crate::scanners::Issue;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Scanning,
    Classified,
    AwaitingConfirmation,
    Remediating,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Scanning => "scanning",
            EngineState::Classified => "classified",
            EngineState::AwaitingConfirmation => "awaiting confirmation",
            EngineState::Remediating => "remediating",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum RemediationOutcome {
    /// The session had no fix candidates
    NothingToFix,
    /// The operator declined the batch
    Declined,
    Completed(RemediationReport),
}

pub struct Engine {
    config: Config,
    scan_directories: Vec<PathBuf>,
    scanner: Scanner,
    classifier: Classifier,
    remediator: Remediator,
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    sink: Arc<dyn EventSink>,
    state: EngineState,
    session: Option<ScanSession>,
}

impl Engine {
    /// Build an engine over the standard probe catalog. Invalid configuration
    /// is rejected here, before any scan.
    pub fn new(
        config: Config,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn EventSink>,
    ) -> SysmendResult<Self> {
        Self::with_registry(config, &ProbeRegistry::standard(), runner, fs, sink)
    }

    pub fn with_registry(
        config: Config,
        registry: &ProbeRegistry,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn EventSink>,
    ) -> SysmendResult<Self> {
        config.validate()?;

        let scanner = Scanner::from_registry(registry, runner.as_ref());
        tracing::debug!("Probes: {}", scanner.probe_keys().join(", "));

        Ok(Self {
            scan_directories: config.scan_directories(),
            classifier: Classifier::from_config(&config.fixer),
            remediator: Remediator::new(&config),
            scanner,
            config,
            runner,
            fs,
            sink,
            state: EngineState::Idle,
            session: None,
        })
    }

    /// Replace the probe set, e.g. with test doubles
    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Most recent scan, if any
    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Run every probe once. The new session replaces the previous one.
    pub fn scan(
        &mut self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> SysmendResult<&ScanSession> {
        match self.state {
            EngineState::Idle | EngineState::Classified => {}
            other => {
                return Err(SysmendError::state(format!("cannot scan while {}", other)));
            }
        }

        self.state = EngineState::Scanning;
        self.session = None;

        let env = ScanEnvironment {
            scan_directories: &self.scan_directories,
            settings: &self.config.scanner,
            runner: self.runner.as_ref(),
            fs: self.fs.as_ref(),
        };
        let session = self.scanner.run(&env, progress, cancel);

        let summary = summarize(session.issues());
        self.sink.record_event(
            "scan_completed",
            &json!({
                "session": session.id().to_string(),
                "issues_count": session.len(),
                "summary": summary,
                "interrupted": session.interrupted(),
            }),
        );

        self.state = if session.interrupted() {
            EngineState::Idle
        } else {
            EngineState::Classified
        };

        Ok(&*self.session.insert(session))
    }

    /// Fix candidates of the classified session
    pub fn pending_fixes(&self) -> Vec<Issue> {
        match (&self.state, &self.session) {
            (EngineState::Classified, Some(session)) => self.classifier.fixable_batch(session),
            _ => Vec::new(),
        }
    }

    /// Ask `confirm` once for the whole batch, then apply it
    pub fn remediate(
        &mut self,
        confirm: &dyn Confirm,
        cancel: &CancelToken,
    ) -> SysmendResult<RemediationOutcome> {
        if self.state != EngineState::Classified {
            return Err(SysmendError::state(format!(
                "remediation needs a completed scan, engine is {}",
                self.state
            )));
        }

        let batch = self.pending_fixes();
        if batch.is_empty() {
            self.state = EngineState::Idle;
            return Ok(RemediationOutcome::NothingToFix);
        }

        self.state = EngineState::AwaitingConfirmation;
        let plan = self.remediator.plan(&batch);
        let approved = match confirm.confirm(&plan) {
            Ok(approved) => approved,
            Err(e) => {
                self.state = EngineState::Classified;
                return Err(SysmendError::fixer("confirmation", e.to_string()));
            }
        };

        if !approved {
            tracing::info!("Remediation declined");
            self.state = EngineState::Idle;
            return Ok(RemediationOutcome::Declined);
        }

        self.state = EngineState::Remediating;
        let env = FixEnvironment {
            runner: self.runner.as_ref(),
            fs: self.fs.as_ref(),
        };
        let report = self
            .remediator
            .remediate_batch(&batch, &env, self.sink.as_ref(), cancel);

        tracing::info!(
            "Remediation finished: {}/{} fixes applied",
            report.applied,
            report.attempted
        );
        self.state = EngineState::Idle;

        Ok(RemediationOutcome::Completed(report))
    }

    /// Leave a classified scan without remediating
    pub fn finish(&mut self) -> SysmendResult<()> {
        match self.state {
            EngineState::Classified | EngineState::Idle => {
                self.state = EngineState::Idle;
                Ok(())
            }
            other => Err(SysmendError::state(format!("cannot finish while {}", other))),
        }
    }

    pub fn health_check(&self) -> HealthReport {
        HealthCheck::new().run(
            self.runner.as_ref(),
            self.fs.as_ref(),
            self.config.scanner.command_timeout(),
        )
    }

    pub fn validate_configs(&self) -> Vec<ValidationResult> {
        ConfigValidator::new().validate(self.runner.as_ref(), self.fs.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::OsFileSystem;
    use crate::fixers::AutoApprove;
    use crate::scanners::progress::NoProgress;
    use crate::scanners::{FixPayload, IssueType, Severity};
    use crate::testing::{MemorySink, MockCommandRunner, ScriptedConfirm, StaticProbe};

    fn engine_with(issues: Vec<Issue>, sink: Arc<MemorySink>) -> Engine {
        let mut config = Config::default_config();
        config.fixer.backup_before_fix = false;

        Engine::new(
            config,
            Arc::new(MockCommandRunner::new()),
            Arc::new(OsFileSystem),
            sink,
        )
        .unwrap()
        .with_scanner(Scanner::new(vec![Box::new(StaticProbe::new("static", issues))]))
    }

    fn missing_dir(path: PathBuf) -> Issue {
        Issue::new(
            IssueType::MissingDirectory,
            Severity::Warning,
            path.display().to_string(),
            "Missing directory",
        )
        .with_fix(FixPayload::CreateDirectory { path })
    }

    #[test]
    fn test_invalid_config_rejected_before_scan() {
        let mut config = Config::default_config();
        config.fixer.scan_directories.clear();

        let result = Engine::new(
            config,
            Arc::new(MockCommandRunner::new()),
            Arc::new(OsFileSystem),
            Arc::new(MemorySink::new()),
        );
        assert!(matches!(result, Err(SysmendError::Config { .. })));
    }

    #[test]
    fn test_remediate_requires_classified_scan() {
        let mut engine = engine_with(Vec::new(), Arc::new(MemorySink::new()));
        let err = engine
            .remediate(&AutoApprove, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SysmendError::State { .. }));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_full_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sites-enabled");
        let sink = Arc::new(MemorySink::new());
        let mut engine = engine_with(vec![missing_dir(target.clone())], sink.clone());

        let session = engine.scan(&NoProgress, &CancelToken::new()).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(engine.state(), EngineState::Classified);
        assert_eq!(engine.pending_fixes().len(), 1);

        let confirm = ScriptedConfirm::new(true);
        let outcome = engine.remediate(&confirm, &CancelToken::new()).unwrap();

        match outcome {
            RemediationOutcome::Completed(report) => {
                assert_eq!(report.applied, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(confirm.calls(), 1);
        assert!(target.is_dir());
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(
            sink.event_names(),
            vec!["scan_completed", "fix_applied", "remediation_completed"]
        );
    }

    #[test]
    fn test_declined_batch_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sites-available");
        let mut engine =
            engine_with(vec![missing_dir(target.clone())], Arc::new(MemorySink::new()));

        engine.scan(&NoProgress, &CancelToken::new()).unwrap();
        let outcome = engine
            .remediate(&ScriptedConfirm::new(false), &CancelToken::new())
            .unwrap();

        assert!(matches!(outcome, RemediationOutcome::Declined));
        assert!(!target.exists());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_finish_and_rescan_replaces_session() {
        let mut engine = engine_with(
            vec![Issue::new(IssueType::HighLoad, Severity::Warning, "system", "busy")],
            Arc::new(MemorySink::new()),
        );

        let first = engine.scan(&NoProgress, &CancelToken::new()).unwrap().id();
        engine.finish().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.pending_fixes().is_empty());

        let second = engine.scan(&NoProgress, &CancelToken::new()).unwrap().id();
        assert_ne!(first, second);
        assert_eq!(engine.session().map(|s| s.id()), Some(second));
    }

    #[test]
    fn test_interrupted_scan_cannot_be_remediated() {
        let mut engine = engine_with(
            vec![missing_dir(PathBuf::from("/nonexistent/sysmend-test"))],
            Arc::new(MemorySink::new()),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let session = engine.scan(&NoProgress, &cancel).unwrap();
        assert!(session.interrupted());
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.remediate(&AutoApprove, &CancelToken::new()).is_err());
    }

    #[test]
    fn test_nothing_to_fix() {
        let mut engine = engine_with(
            vec![Issue::new(IssueType::MissingFile, Severity::Info, "/srv/README.md", "missing")],
            Arc::new(MemorySink::new()),
        );
        engine.scan(&NoProgress, &CancelToken::new()).unwrap();

        let confirm = ScriptedConfirm::new(true);
        let outcome = engine.remediate(&confirm, &CancelToken::new()).unwrap();
        assert!(matches!(outcome, RemediationOutcome::NothingToFix));
        assert_eq!(confirm.calls(), 0);
    }
}
