//! Audit sink for scan and fix summaries.

use serde_json::Value;

/// Where the engine records what it did
pub trait EventSink: Send + Sync {
    fn record_event(&self, name: &str, details: &Value);
    fn record_error(&self, name: &str, details: &Value);
}

/// Forwards audit events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record_event(&self, name: &str, details: &Value) {
        tracing::info!(event = name, details = %details, "audit event");
    }

    fn record_error(&self, name: &str, details: &Value) {
        tracing::error!(event = name, details = %details, "audit error");
    }
}
