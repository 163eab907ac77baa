use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::ModuleId;

/// Listener pattern that receives every emitted event.
pub const WILDCARD: &str = "*";

/// Bridge message type used for broadcast events.
pub const PLUGIN_EVENT_MESSAGE: &str = "PluginEvent";

/// Called with the event name and the enriched payload.
pub type EventListener = Arc<dyn Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync>;

/// Options supplied when an event is first registered. Later registrations
/// by other owners keep the original options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOptions {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payload_schema: Option<Value>,
    #[serde(default = "enabled")]
    pub broadcast: bool,
    #[serde(default = "enabled")]
    pub log_to_console: bool,
}

fn enabled() -> bool {
    true
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            description: String::new(),
            payload_schema: None,
            broadcast: true,
            log_to_console: true,
        }
    }
}

impl EventOptions {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.payload_schema = Some(schema);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.log_to_console = false;
        self
    }

    pub fn local(mut self) -> Self {
        self.broadcast = false;
        self
    }
}

/// What happened during one `emit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    /// Listeners that ran without error.
    pub delivered: usize,
    /// Whether a console entry was written.
    pub logged: bool,
    /// Whether a bridge message was sent.
    pub broadcast: bool,
}

/// Point-in-time statistics for one registered event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub name: String,
    pub description: String,
    pub owners: Vec<ModuleId>,
    pub emit_count: u64,
    pub last_emitted: Option<DateTime<Utc>>,
    pub listener_count: usize,
}

/// Identifies one listener. Pass it back to
/// [`crate::EventRegistry::remove_listener`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    pub id: u64,
    pub event: String,
    pub owner: ModuleId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_to_enabled() {
        let opts: EventOptions = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert!(opts.broadcast);
        assert!(opts.log_to_console);
        assert_eq!(opts, EventOptions::described("x"));
        assert!(!EventOptions::default().quiet().local().broadcast);
    }
}
