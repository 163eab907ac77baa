//! Plugin Event Logger
//!
//! Console sink for registry events flagged `log_to_console`. Each emission
//! becomes one structured record on the `plugin_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::redact::redact_value;

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub plugin: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
}

pub struct EventLogger;

impl EventLogger {
    /// Log an emitted event, redacting the serialized payload first.
    /// Returns the entry that was written.
    pub fn log_event(plugin: &str, event: &str, payload: &Value) -> EventLogEntry {
        let entry = EventLogEntry {
            plugin: plugin.into(),
            event: event.into(),
            timestamp: Utc::now(),
            payload: redact_value(payload).to_string(),
        };

        info!(
            target: "plugin_events",
            plugin = %entry.plugin,
            event = %entry.event,
            payload = %entry.payload,
            "Plugin event"
        );
        entry
    }
}
