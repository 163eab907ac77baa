//! Event Registry
//!
//! Global table of named events. A record lives as long as at least one
//! module claims it; listeners are kept separately so a module can listen
//! for an event before anyone registers it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use logging::EventLogger;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tether_core::{ModuleId, NativeBridge, NullBridge, RuntimeError, Unsubscribe};
use tracing::{debug, info, warn};

use crate::types::{
    EmitOutcome, EventListener, EventOptions, EventStats, ListenerHandle, PLUGIN_EVENT_MESSAGE,
    WILDCARD,
};

struct EventRecord {
    registered_by: BTreeSet<ModuleId>,
    options: EventOptions,
    emit_count: u64,
    last_emitted: Option<DateTime<Utc>>,
}

struct ListenerEntry {
    id: u64,
    owner: ModuleId,
    callback: EventListener,
}

#[derive(Default)]
struct Tables {
    records: BTreeMap<String, EventRecord>,
    listeners: BTreeMap<String, Vec<ListenerEntry>>,
}

struct RegistryInner {
    tables: RwLock<Tables>,
    bridge: Arc<dyn NativeBridge>,
    next_id: AtomicU64,
}

/// Pub/sub table shared by every module. Cheap to clone.
#[derive(Clone)]
pub struct EventRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NullBridge))
    }
}

impl EventRegistry {
    pub fn new(bridge: Arc<dyn NativeBridge>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tables: RwLock::new(Tables::default()),
                bridge,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    /// Claim `name` for `owner`. The first claim creates the record with
    /// `options`; later claims only add the owner.
    pub fn register(&self, owner: &ModuleId, name: &str, options: EventOptions) {
        let mut tables = self.inner.tables.write();
        match tables.records.get_mut(name) {
            Some(record) => {
                if record.registered_by.insert(owner.clone()) {
                    info!(event = %name, owner = %owner, "Additional owner registered for event");
                }
            }
            None => {
                tables.records.insert(
                    name.to_string(),
                    EventRecord {
                        registered_by: BTreeSet::from([owner.clone()]),
                        options,
                        emit_count: 0,
                        last_emitted: None,
                    },
                );
                info!(event = %name, owner = %owner, "Event registered");
            }
        }
    }

    /// Drop `owner` from one record. Returns true if the owner held it.
    pub fn unregister(&self, owner: &ModuleId, name: &str) -> bool {
        let mut tables = self.inner.tables.write();
        let Some(record) = tables.records.get_mut(name) else {
            return false;
        };
        let removed = record.registered_by.remove(owner);
        if record.registered_by.is_empty() {
            tables.records.remove(name);
            debug!(event = %name, "Event record removed (no owners left)");
        }
        removed
    }

    /// Remove `owner` from every record and drop all of its listeners.
    /// Returns `(events released, listeners removed)`.
    pub fn unregister_all(&self, owner: &ModuleId) -> (usize, usize) {
        let mut tables = self.inner.tables.write();

        let mut released = 0;
        tables.records.retain(|_, record| {
            if record.registered_by.remove(owner) {
                released += 1;
            }
            !record.registered_by.is_empty()
        });

        let mut removed = 0;
        tables.listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| &e.owner != owner);
            removed += before - entries.len();
            !entries.is_empty()
        });

        if released + removed > 0 {
            debug!(owner = %owner, released, removed, "Event ownership cleared");
        }
        (released, removed)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Listen for `name`, or for every event when `name` is [`WILDCARD`].
    pub fn add_listener<F>(&self, owner: &ModuleId, name: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .tables
            .write()
            .listeners
            .entry(name.to_string())
            .or_default()
            .push(ListenerEntry {
                id,
                owner: owner.clone(),
                callback: Arc::new(callback),
            });
        ListenerHandle {
            id,
            event: name.to_string(),
            owner: owner.clone(),
        }
    }

    pub fn remove_listener(&self, handle: &ListenerHandle) -> bool {
        let mut tables = self.inner.tables.write();
        let Some(entries) = tables.listeners.get_mut(&handle.event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            tables.listeners.remove(&handle.event);
        }
        removed
    }

    /// An unsubscribe closure for `handle`, suitable for a resource tracker.
    pub fn unsubscriber(&self, handle: ListenerHandle) -> Unsubscribe {
        let registry = self.clone();
        Box::new(move || {
            registry.remove_listener(&handle);
            Ok(())
        })
    }

    /// Direct listeners for `name`. Wildcard listeners count under `"*"`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .tables
            .read()
            .listeners
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Emit `name` on behalf of `owner`.
    ///
    /// An unregistered name is logged and returns the default outcome
    /// without touching any counter.
    pub fn emit(&self, owner: &ModuleId, name: &str, payload: Value) -> EmitOutcome {
        let (options, listeners) = {
            let mut tables = self.inner.tables.write();
            let Some(record) = tables.records.get_mut(name) else {
                warn!(event = %name, owner = %owner, "Emit of unregistered event ignored");
                return EmitOutcome::default();
            };
            record.emit_count += 1;
            record.last_emitted = Some(Utc::now());
            let options = record.options.clone();

            let listeners: Vec<(ModuleId, EventListener)> = [name, WILDCARD]
                .iter()
                .filter(|key| name != WILDCARD || **key == WILDCARD)
                .filter_map(|key| tables.listeners.get(*key))
                .flatten()
                .map(|e| (e.owner.clone(), e.callback.clone()))
                .collect();
            (options, listeners)
        };

        let mut outcome = EmitOutcome::default();

        if options.log_to_console {
            EventLogger::log_event(owner.as_str(), name, &payload);
            outcome.logged = true;
        }

        let enriched = enrich(payload, owner);
        if options.broadcast {
            let message = json!({
                "event": name,
                "plugin": owner.as_str(),
                "payload": &enriched,
            });
            match self
                .inner
                .bridge
                .send(PLUGIN_EVENT_MESSAGE, &message.to_string())
            {
                Ok(()) => outcome.broadcast = true,
                Err(e) => warn!(event = %name, error = %e, "Bridge broadcast failed"),
            }
        }

        for (listener_owner, callback) in listeners {
            match callback(name, &enriched) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    let err = RuntimeError::Listener {
                        event: name.to_string(),
                        owner: listener_owner.to_string(),
                        message: e.to_string(),
                    };
                    warn!("{err}");
                }
            }
        }

        outcome
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.tables.read().records.contains_key(name)
    }

    pub fn event_names(&self) -> Vec<String> {
        self.inner.tables.read().records.keys().cloned().collect()
    }

    /// Events currently claimed by `owner`.
    pub fn owned_by(&self, owner: &ModuleId) -> Vec<String> {
        self.inner
            .tables
            .read()
            .records
            .iter()
            .filter(|(_, r)| r.registered_by.contains(owner))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn record(&self, name: &str) -> Option<EventStats> {
        let tables = self.inner.tables.read();
        tables.records.get(name).map(|r| stats_for(&tables, name, r))
    }

    pub fn stats(&self) -> Vec<EventStats> {
        let tables = self.inner.tables.read();
        tables
            .records
            .iter()
            .map(|(name, r)| stats_for(&tables, name, r))
            .collect()
    }
}

fn stats_for(tables: &Tables, name: &str, record: &EventRecord) -> EventStats {
    EventStats {
        name: name.to_string(),
        description: record.options.description.clone(),
        owners: record.registered_by.iter().cloned().collect(),
        emit_count: record.emit_count,
        last_emitted: record.last_emitted,
        listener_count: tables.listeners.get(name).map(Vec::len).unwrap_or(0),
    }
}

/// Tag the payload with the emitting module.
fn enrich(payload: Value, owner: &ModuleId) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("plugin".into(), Value::String(owner.to_string()));
            Value::Object(map)
        }
        other => json!({ "value": other, "plugin": owner.as_str() }),
    }
}
