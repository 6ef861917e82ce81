//! sysmend - Linux host diagnostic scanner with safe auto-remediation
//!
//! Probes inspect the host and report normalized issues, the classifier
//! picks the small set that is safe to fix automatically, and the
//! remediator applies those fixes after a single confirmation.

pub mod classifier;
pub mod core;
pub mod engine;
pub mod fixers;
pub mod scanners;
pub mod testing;

pub use crate::core::{CancelToken, Config, SysmendError, SysmendResult};
pub use engine::{Engine, EngineState, RemediationOutcome};
pub use scanners::manager::{ProbeRegistry, ScanSession, Scanner};
pub use scanners::{FixPayload, Issue, IssueType, Probe, ProbeError, Severity};
