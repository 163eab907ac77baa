//! Host event targets.
//!
//! An event target is any host object that accepts named listeners
//! (`add_listener` / `remove_listener`). Modules register against targets
//! through their resource tracker so every listener is removed on stop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Handler invoked with the dispatched event detail.
pub type TargetHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Flags accepted alongside a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    /// Remove the listener after its first dispatch.
    pub once: bool,
    pub passive: bool,
}

pub trait EventTarget: Send + Sync {
    /// Stable name used to group listeners per target.
    fn name(&self) -> &str;

    /// Attach `handler`, returning an id that reverses the registration.
    fn add_listener(
        &self,
        event: &str,
        handler: TargetHandler,
        options: ListenerOptions,
    ) -> anyhow::Result<u64>;

    fn remove_listener(&self, event: &str, id: u64) -> anyhow::Result<()>;
}

struct Registered {
    id: u64,
    event: String,
    handler: TargetHandler,
    once: bool,
}

/// In-process event target a host can expose directly.
pub struct HostTarget {
    name: String,
    listeners: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
}

impl HostTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Invoke every listener for `event`. Returns how many ran.
    pub fn dispatch(&self, event: &str, detail: &Value) -> usize {
        let handlers: Vec<TargetHandler> = {
            let mut listeners = self.listeners.lock();
            let matching: Vec<TargetHandler> = listeners
                .iter()
                .filter(|l| l.event == event)
                .map(|l| l.handler.clone())
                .collect();
            listeners.retain(|l| !(l.once && l.event == event));
            matching
        };
        for handler in &handlers {
            handler(detail);
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.event == event)
            .count()
    }
}

impl EventTarget for HostTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_listener(
        &self,
        event: &str,
        handler: TargetHandler,
        options: ListenerOptions,
    ) -> anyhow::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(Registered {
            id,
            event: event.to_string(),
            handler,
            once: options.once,
        });
        Ok(id)
    }

    fn remove_listener(&self, event: &str, id: u64) -> anyhow::Result<()> {
        self.listeners
            .lock()
            .retain(|l| !(l.id == id && l.event == event));
        Ok(())
    }
}
