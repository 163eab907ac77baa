//! Event registry: named events, their owning modules, listeners, and
//! emission statistics.

pub mod registry;
pub mod types;

pub use registry::EventRegistry;
pub use types::{
    EmitOutcome, EventListener, EventOptions, EventStats, ListenerHandle, PLUGIN_EVENT_MESSAGE,
    WILDCARD,
};
