//! Per-module logger handle.
//!
//! Every module gets one of these at registration. Records carry the module
//! id as a structured field so output can be filtered per module.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ModuleLogger {
    module: Arc<str>,
}

impl ModuleLogger {
    pub fn new(module: impl AsRef<str>) -> Self {
        Self {
            module: Arc::from(module.as_ref()),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn debug(&self, message: impl Display) {
        debug!(module = %self.module, "{}", message);
    }

    pub fn info(&self, message: impl Display) {
        info!(module = %self.module, "{}", message);
    }

    pub fn warn(&self, message: impl Display) {
        warn!(module = %self.module, "{}", message);
    }

    pub fn error(&self, message: impl Display) {
        error!(module = %self.module, "{}", message);
    }

    /// A child logger for a sub-component, e.g. `AutoTag/settings`.
    pub fn child(&self, component: &str) -> Self {
        Self::new(format!("{}/{}", self.module, component))
    }
}
