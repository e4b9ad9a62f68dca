//! Fire-and-forget usage events.
//!
//! Recording must never affect the primary response path: implementations
//! swallow every failure and callers never await or inspect the outcome.

use std::sync::Mutex;

pub trait EventSink: Send + Sync {
    fn record(&self, event_type: &str, fields: serde_json::Value);
}

/// Default sink: structured log lines under the `studyhive::events` target.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event_type: &str, fields: serde_json::Value) {
        tracing::info!(target: "studyhive::events", event = event_type, %fields);
    }
}

/// Drops everything. For tests and offline runs.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _event_type: &str, _fields: serde_json::Value) {}
}

/// Captures events in memory so tests can assert on them.
#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl EventSink for RecordingEventSink {
    fn record(&self, event_type: &str, fields: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event_type.to_string(), fields));
        }
    }
}

impl RecordingEventSink {
    pub fn types(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|e| e.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }
}
