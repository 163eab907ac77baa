//! Per-module resource tracking.
//!
//! Everything a module allocates while running is recorded here so that
//! `stop` can release it in one pass. Draining empties every store, so a
//! second cleanup releases nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{
    EventTarget, ListenerOptions, ModuleId, RuntimeError, TargetHandler, Unsubscribe,
};
use tether_hooks::{HookEngine, HookHandle};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lifecycle::ReleaseReport;

/// Anything that must be disconnected when its module stops.
pub trait Observer: Send + Sync {
    fn disconnect(&self);
}

/// Observer backed by a one-shot closure.
pub struct DisconnectFn(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl DisconnectFn {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Mutex::new(Some(Box::new(f))))
    }
}

impl Observer for DisconnectFn {
    fn disconnect(&self) {
        if let Some(f) = self.0.lock().take() {
            f();
        }
    }
}

struct TargetListener {
    target: Arc<dyn EventTarget>,
    event: String,
    id: u64,
}

#[derive(Default)]
struct ResourceSet {
    timers: Vec<JoinHandle<()>>,
    observers: Vec<Box<dyn Observer>>,
    /// Keyed by target name.
    listeners: BTreeMap<String, Vec<TargetListener>>,
    subscriptions: Vec<Unsubscribe>,
    hooks: Vec<HookHandle>,
}

/// Resource slot of one module.
pub struct ResourceTracker {
    owner: ModuleId,
    set: Mutex<ResourceSet>,
}

impl ResourceTracker {
    pub fn new(owner: ModuleId) -> Self {
        Self {
            owner,
            set: Mutex::new(ResourceSet::default()),
        }
    }

    pub fn owner(&self) -> &ModuleId {
        &self.owner
    }

    pub fn register_timer(&self, handle: JoinHandle<()>) {
        self.set.lock().timers.push(handle);
    }

    pub fn register_observer(&self, observer: impl Observer + 'static) {
        self.set.lock().observers.push(Box::new(observer));
    }

    /// Attach `handler` to `target` now and remember how to detach it.
    pub fn register_listener(
        &self,
        target: Arc<dyn EventTarget>,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
        options: ListenerOptions,
    ) -> anyhow::Result<()> {
        let handler: TargetHandler = Arc::new(handler);
        let id = target.add_listener(event, handler, options)?;
        self.set
            .lock()
            .listeners
            .entry(target.name().to_string())
            .or_default()
            .push(TargetListener {
                target,
                event: event.to_string(),
                id,
            });
        Ok(())
    }

    pub fn register_subscription(&self, unsubscribe: Unsubscribe) {
        self.set.lock().subscriptions.push(unsubscribe);
    }

    pub fn register_hook(&self, handle: HookHandle) {
        self.set.lock().hooks.push(handle);
    }

    /// Number of resources currently held.
    pub fn len(&self) -> usize {
        let set = self.set.lock();
        set.timers.len()
            + set.observers.len()
            + set.listeners.values().map(Vec::len).sum::<usize>()
            + set.subscriptions.len()
            + set.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything. Failing unsubscribes are logged and skipped.
    ///
    /// `events` in the returned report is always zero; event ownership is
    /// held by the registry, not the tracker.
    pub fn cleanup(&self, hooks: &HookEngine) -> ReleaseReport {
        let drained = std::mem::take(&mut *self.set.lock());
        let mut report = ReleaseReport::default();

        for timer in drained.timers {
            timer.abort();
            report.timers += 1;
        }

        for observer in drained.observers {
            observer.disconnect();
            report.observers += 1;
        }

        for (target_name, entries) in drained.listeners {
            for entry in entries {
                if let Err(e) = entry.target.remove_listener(&entry.event, entry.id) {
                    warn!(
                        module = %self.owner,
                        target = %target_name,
                        event = %entry.event,
                        error = %e,
                        "Failed to remove listener"
                    );
                }
                report.listeners += 1;
            }
        }

        for unsubscribe in drained.subscriptions {
            if let Err(e) = unsubscribe() {
                let err = RuntimeError::Unsubscribe {
                    owner: self.owner.to_string(),
                    message: e.to_string(),
                };
                warn!("{err}");
            }
            report.subscriptions += 1;
        }

        report.hooks = drained
            .hooks
            .iter()
            .filter(|handle| hooks.unregister(handle))
            .count();

        if !report.is_empty() {
            debug!(module = %self.owner, released = report.total(), "Resources released");
        }
        report
    }
}
