//! Scan progress reporting.

use serde::Serialize;

/// Progress notifications emitted while a scan runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ProbeStarted {
        key: &'static str,
        title: &'static str,
        index: usize,
        total: usize,
    },
    ProbeStep {
        key: &'static str,
        fraction: f64,
        detail: String,
    },
    ProbeFinished {
        key: &'static str,
        issues: usize,
        failed: bool,
        /// Completed probes over catalog size
        overall: f64,
    },
    ScanFinished {
        issues: usize,
        interrupted: bool,
    },
}

/// Receives progress from the scanner; display code implements this
pub trait ProgressSink {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress handle scoped to one probe
#[derive(Clone, Copy)]
pub struct ProbeProgress<'a> {
    sink: &'a dyn ProgressSink,
    key: &'static str,
}

impl<'a> ProbeProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink, key: &'static str) -> Self {
        Self { sink, key }
    }

    pub fn step(&self, fraction: f64, detail: String) {
        self.sink.report(ProgressEvent::ProbeStep {
            key: self.key,
            fraction: fraction.clamp(0.0, 1.0),
            detail,
        });
    }
}

/// Fraction of `index` out of `total`, safe for empty lists
pub(crate) fn fraction(index: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        index as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink_and_clamping() {
        let seen = RefCell::new(Vec::new());
        let sink = |event: ProgressEvent| seen.borrow_mut().push(event);

        let progress = ProbeProgress::new(&sink, "logs");
        progress.step(1.7, "tail".to_string());

        let events = seen.borrow();
        assert_eq!(
            events[0],
            ProgressEvent::ProbeStep {
                key: "logs",
                fraction: 1.0,
                detail: "tail".to_string(),
            }
        );
    }

    #[test]
    fn test_fraction_of_empty_list() {
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(1, 4), 0.25);
    }
}
