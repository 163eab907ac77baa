//! Module lifecycle state.
//!
//! A module moves `Registered → Loaded → Started → Stopped`; `enabled` is an
//! orthogonal flag that decides whether the controller may start it.

use serde::{Deserialize, Serialize};
use tether_core::ModuleMetadata;

/// Derived position of a module in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Registered,
    Loaded,
    Started,
    Stopped,
}

/// The three lifecycle flags of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    pub loaded: bool,
    pub started: bool,
    pub enabled: bool,
    /// Set once the module has been stopped at least once.
    #[serde(default)]
    pub stopped_once: bool,
}

impl ModuleState {
    pub fn phase(&self) -> Phase {
        match (self.loaded, self.started, self.stopped_once) {
            (_, true, _) => Phase::Started,
            (true, false, true) => Phase::Stopped,
            (true, false, false) => Phase::Loaded,
            (false, false, _) => Phase::Registered,
        }
    }
}

/// Snapshot of one registered module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub metadata: ModuleMetadata,
    pub state: ModuleState,
}

/// What one `stop` released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub timers: usize,
    pub observers: usize,
    pub listeners: usize,
    pub subscriptions: usize,
    pub hooks: usize,
    pub events: usize,
}

impl ReleaseReport {
    pub fn total(&self) -> usize {
        self.timers + self.observers + self.listeners + self.subscriptions + self.hooks + self.events
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_follows_flags() {
        let mut state = ModuleState::default();
        assert_eq!(state.phase(), Phase::Registered);
        state.loaded = true;
        assert_eq!(state.phase(), Phase::Loaded);
        state.started = true;
        assert_eq!(state.phase(), Phase::Started);
        state.started = false;
        state.stopped_once = true;
        assert_eq!(state.phase(), Phase::Stopped);
    }

    #[test]
    fn test_release_report_total() {
        let report = ReleaseReport {
            timers: 2,
            hooks: 1,
            ..Default::default()
        };
        assert_eq!(report.total(), 3);
        assert!(ReleaseReport::default().is_empty());
    }
}
