//! Structured logging for the Tether runtime.
//!
//! Handles subscriber setup, per-module logger handles, redaction, and the
//! console sink used by the event registry.

pub mod event_logger;
pub mod logger;
pub mod module_logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger};
pub use logger::{LOG_FILE_PREFIX, init_logger};
pub use module_logger::ModuleLogger;
pub use redact::{redact_sensitive_data, redact_value};
