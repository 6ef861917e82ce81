//! Test doubles for sysmend
//!
//! Scriptable command runner and filesystem, recording sinks, and probes
//! with fixed behaviour, so probes, the scanner and the remediator can be
//! exercised without touching the host.

use crate::core::command::{CommandError, CommandOutput, CommandRunner};
use crate::core::config::ScannerConfig;
use crate::core::fs::{DiskUsage, FileSystem, OsFileSystem};
use crate::core::sink::EventSink;
use crate::fixers::{Confirm, FixError, PlannedFix};
use crate::scanners::progress::{NoProgress, ProbeProgress, ProgressEvent, ProgressSink};
use crate::scanners::{Issue, Probe, ProbeContext, ProbeError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
enum ScriptedResponse {
    Output(CommandOutput),
    Timeout,
}

/// Command runner answering from a script keyed by the full command line
/// (`"systemctl is-active nginx"`). Unscripted commands succeed with the
/// default stdout.
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    responses: HashMap<String, ScriptedResponse>,
    default_stdout: String,
    unavailable: HashSet<String>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_stdout(mut self, stdout: &str) -> Self {
        self.default_stdout = stdout.to_string();
        self
    }

    pub fn with_stdout(self, command: &str, stdout: &str, status: i32) -> Self {
        self.with_response(command, status, stdout, "")
    }

    pub fn with_response(mut self, command: &str, status: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            ScriptedResponse::Output(CommandOutput {
                status: Some(status),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    pub fn with_timeout(mut self, command: &str) -> Self {
        self.responses
            .insert(command.to_string(), ScriptedResponse::Timeout);
        self
    }

    /// Report `program` as missing from the search path
    pub fn with_unavailable(mut self, program: &str) -> Self {
        self.unavailable.insert(program.to_string());
        self
    }

    /// Every command line run so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(line, _)| line.clone()).collect()
    }

    /// The timeout each call was given
    pub fn timeouts(&self) -> Vec<Duration> {
        lock(&self.calls).iter().map(|(_, timeout)| *timeout).collect()
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        lock(&self.calls).push((line.clone(), timeout));

        if self.unavailable.contains(program) {
            return Err(CommandError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not installed"),
            });
        }

        match self.responses.get(&line) {
            Some(ScriptedResponse::Output(output)) => Ok(output.clone()),
            Some(ScriptedResponse::Timeout) => Err(CommandError::Timeout {
                program: program.to_string(),
                timeout,
            }),
            None => Ok(CommandOutput {
                status: Some(0),
                stdout: self.default_stdout.clone(),
                stderr: String::new(),
            }),
        }
    }

    fn is_available(&self, program: &str) -> bool {
        !self.unavailable.contains(program)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    existing: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
    files: HashMap<PathBuf, String>,
    modes: HashMap<PathBuf, u32>,
    disk_usage: HashMap<PathBuf, DiskUsage>,
    created_dirs: Vec<PathBuf>,
}

impl FakeState {
    fn known(&self) -> impl Iterator<Item = &PathBuf> {
        self.existing
            .iter()
            .chain(&self.dirs)
            .chain(self.files.keys())
            .chain(self.modes.keys())
    }

    /// Explicit directories and every ancestor of a known path
    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
            || self
                .known()
                .any(|known| known.as_path() != path && known.starts_with(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.existing.contains(path)
            || self.files.contains_key(path)
            || self.modes.contains_key(path)
            || self.is_dir(path)
    }

    fn children(&self, path: &Path) -> HashSet<PathBuf> {
        self.known()
            .filter_map(|known| {
                let first = known.strip_prefix(path).ok()?.components().next()?;
                Some(path.join(first))
            })
            .collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

/// In-memory filesystem. A path that exists without recorded contents or
/// mode fails reads and stats with `PermissionDenied`. Directories are the
/// ones added with [`FakeFileSystem::with_dir`] plus every ancestor of a
/// known path.
#[derive(Debug, Default)]
pub struct FakeFileSystem {
    state: Mutex<FakeState>,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, path: impl AsRef<Path>) -> Self {
        lock(&self.state).existing.insert(path.as_ref().to_path_buf());
        self
    }

    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        lock(&self.state).dirs.insert(path.as_ref().to_path_buf());
        self
    }

    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        lock(&self.state)
            .files
            .insert(path.as_ref().to_path_buf(), contents.to_string());
        self
    }

    pub fn with_mode(self, path: impl AsRef<Path>, mode: u32) -> Self {
        lock(&self.state).modes.insert(path.as_ref().to_path_buf(), mode);
        self
    }

    pub fn with_disk_usage(self, path: impl AsRef<Path>, usage: DiskUsage) -> Self {
        lock(&self.state)
            .disk_usage
            .insert(path.as_ref().to_path_buf(), usage);
        self
    }

    pub fn mode_of(&self, path: impl AsRef<Path>) -> Option<u32> {
        lock(&self.state).modes.get(path.as_ref()).copied()
    }

    pub fn contents_of(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.state).files.get(path.as_ref()).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        lock(&self.state).created_dirs.clone()
    }
}

impl FileSystem for FakeFileSystem {
    fn exists(&self, path: &Path) -> bool {
        lock(&self.state).exists(path)
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        let state = lock(&self.state);
        match state.modes.get(path) {
            Some(mode) => Ok(*mode),
            None if state.exists(path) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot stat {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = lock(&self.state);
        if !state.exists(path) {
            return Err(not_found(path));
        }
        state.modes.insert(path.to_path_buf(), mode & 0o7777);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.dirs.insert(path.to_path_buf()) {
            state.created_dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let state = lock(&self.state);
        match state.files.get(path) {
            Some(contents) => Ok(contents.clone()),
            None if state.exists(path) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot read {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let state = lock(&self.state);
        if !state.exists(path) {
            return Err(not_found(path));
        }
        if !state.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot list {}", path.display()),
            ));
        }

        Ok(state
            .children(path)
            .iter()
            .filter_map(|child| child.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect())
    }

    fn walk_dirs(&self, root: &Path, max_depth: usize) -> Vec<PathBuf> {
        let state = lock(&self.state);
        if !state.is_dir(root) {
            return Vec::new();
        }

        let mut dirs = Vec::new();
        let mut pending = vec![(root.to_path_buf(), 0)];
        while let Some((dir, depth)) = pending.pop() {
            if depth < max_depth {
                let mut children: Vec<PathBuf> = state
                    .children(&dir)
                    .into_iter()
                    .filter(|child| state.is_dir(child))
                    .collect();
                children.sort();
                pending.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            }
            dirs.push(dir);
        }
        dirs
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        lock(&self.state)
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        lock(&self.state)
            .disk_usage
            .get(path)
            .copied()
            .ok_or_else(|| not_found(path))
    }
}

/// Event sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, Value)>>,
    errors: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        lock(&self.events).clone()
    }

    pub fn errors(&self) -> Vec<(String, Value)> {
        lock(&self.errors).clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        lock(&self.events).iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn error_names(&self) -> Vec<String> {
        lock(&self.errors).iter().map(|(name, _)| name.clone()).collect()
    }

    /// Details of the most recent event called `name`
    pub fn last_event(&self, name: &str) -> Option<Value> {
        lock(&self.events)
            .iter()
            .rev()
            .find(|(event, _)| event == name)
            .map(|(_, details)| details.clone())
    }
}

impl EventSink for MemorySink {
    fn record_event(&self, name: &str, details: &Value) {
        lock(&self.events).push((name.to_string(), details.clone()));
    }

    fn record_error(&self, name: &str, details: &Value) {
        lock(&self.errors).push((name.to_string(), details.clone()));
    }
}

/// Progress sink that keeps every event
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}

/// Confirmation with a fixed answer that counts how often it was asked
#[derive(Debug)]
pub struct ScriptedConfirm {
    answer: bool,
    calls: AtomicUsize,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _plan: &[PlannedFix]) -> Result<bool, FixError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

/// Probe returning a fixed list of issues
pub struct StaticProbe {
    key: &'static str,
    issues: Vec<Issue>,
}

impl StaticProbe {
    pub fn new(key: &'static str, issues: Vec<Issue>) -> Self {
        Self { key, issues }
    }
}

impl Probe for StaticProbe {
    fn key(&self) -> &'static str {
        self.key
    }

    fn title(&self) -> &'static str {
        "Static probe"
    }

    fn run(&self, _ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        Ok(self.issues.clone())
    }
}

/// Probe that always returns an error
pub struct FailingProbe {
    key: &'static str,
}

impl FailingProbe {
    pub fn new(key: &'static str) -> Self {
        Self { key }
    }
}

impl Probe for FailingProbe {
    fn key(&self) -> &'static str {
        self.key
    }

    fn title(&self) -> &'static str {
        "Failing probe"
    }

    fn run(&self, _ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        Err(ProbeError::Internal("probe failed on purpose".to_string()))
    }
}

/// Probe that always panics
pub struct PanickingProbe {
    key: &'static str,
}

impl PanickingProbe {
    pub fn new(key: &'static str) -> Self {
        Self { key }
    }
}

impl Probe for PanickingProbe {
    fn key(&self) -> &'static str {
        self.key
    }

    fn title(&self) -> &'static str {
        "Panicking probe"
    }

    fn run(&self, _ctx: &ProbeContext<'_>) -> Result<Vec<Issue>, ProbeError> {
        panic!("probe {} panicked on purpose", self.key)
    }
}

/// Runs a single probe against scripted host access
pub struct ProbeHarness {
    runner: MockCommandRunner,
    fs: Box<dyn FileSystem>,
    scan_directories: Vec<PathBuf>,
    settings: ScannerConfig,
}

impl Default for ProbeHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeHarness {
    pub fn new() -> Self {
        Self {
            runner: MockCommandRunner::new(),
            fs: Box::new(OsFileSystem),
            scan_directories: Vec::new(),
            settings: ScannerConfig::default(),
        }
    }

    pub fn with_runner(mut self, runner: MockCommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    pub fn with_scan_directories(mut self, dirs: Vec<PathBuf>) -> Self {
        self.scan_directories = dirs;
        self
    }

    pub fn with_settings(mut self, settings: ScannerConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn runner(&self) -> &MockCommandRunner {
        &self.runner
    }

    pub fn run(&self, probe: &dyn Probe) -> Result<Vec<Issue>, ProbeError> {
        let ctx = ProbeContext {
            scan_directories: &self.scan_directories,
            settings: &self.settings,
            runner: &self.runner,
            fs: self.fs.as_ref(),
            progress: ProbeProgress::new(&NoProgress, probe.key()),
        };
        probe.run(&ctx)
    }
}
