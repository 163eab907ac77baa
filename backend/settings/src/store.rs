//! Observable settings object.
//!
//! A [`SettingsStore`] owns a JSON object and hands out dotted-path reads
//! and writes. Writes are clamped against the store's definitions, skipped
//! when unchanged, and announced to global listeners (every change) and
//! path listeners (changes to exactly that path).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tether_core::Unsubscribe;
use tracing::{debug, warn};

use crate::definition::SettingsDefinitions;

/// A change notification.
#[derive(Debug)]
pub struct SettingChange<'a> {
    /// Dotted path that was written.
    pub path: &'a str,
    /// The stored value (after clamping).
    pub value: &'a Value,
    /// The whole backing object after the write.
    pub root: &'a Value,
}

pub type SettingsListener = Arc<dyn Fn(&SettingChange<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Computes a value for a path that has never been written.
pub type DefaultResolver = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

#[derive(Default)]
struct Listeners {
    global: Vec<(u64, SettingsListener)>,
    by_path: HashMap<String, Vec<(u64, SettingsListener)>>,
}

struct StoreInner {
    name: String,
    backing: RwLock<Value>,
    definitions: SettingsDefinitions,
    resolver: RwLock<Option<DefaultResolver>>,
    listeners: Mutex<Listeners>,
    next_id: AtomicU64,
}

/// Reactive JSON object with dotted-path access. Cheap to clone.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

impl SettingsStore {
    /// `backing` should be a JSON object; anything else starts empty.
    pub fn new(name: impl Into<String>, backing: Value, definitions: SettingsDefinitions) -> Self {
        let backing = match backing {
            Value::Object(_) => backing,
            _ => Value::Object(Map::new()),
        };
        Self {
            inner: Arc::new(StoreInner {
                name: name.into(),
                backing: RwLock::new(backing),
                definitions,
                resolver: RwLock::new(None),
                listeners: Mutex::new(Listeners::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn definitions(&self) -> &SettingsDefinitions {
        &self.inner.definitions
    }

    pub fn set_default_resolver<F>(&self, resolver: F)
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        *self.inner.resolver.write() = Some(Arc::new(resolver));
    }

    /// Read `path`. A missing value is resolved through the default
    /// resolver, memoised into the backing object, and announced to global
    /// listeners only.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Some(value) = lookup(&self.inner.backing.read(), path) {
            return Some(value.clone());
        }

        let resolver = self.inner.resolver.read().clone()?;
        let value = resolver(path)?;
        let root = {
            let mut backing = self.inner.backing.write();
            // Another reader may have memoised it in the meantime.
            if let Some(existing) = lookup(&backing, path) {
                return Some(existing.clone());
            }
            insert(&mut backing, path, value.clone());
            backing.clone()
        };
        debug!(store = %self.inner.name, path = %path, "Default memoised");
        self.notify(path, &value, &root, false);
        Some(value)
    }

    /// Write `path`, clamping bounded numbers. Returns `false` when the
    /// stored value did not change.
    pub fn set(&self, path: &str, value: Value) -> bool {
        let value = match self.inner.definitions.get(path).and_then(|d| d.clamp(&value)) {
            Some(clamped) => {
                warn!(
                    store = %self.inner.name,
                    path = %path,
                    requested = %value,
                    stored = %clamped,
                    "Setting out of range; clamped"
                );
                clamped
            }
            None => value,
        };

        let root = {
            let mut backing = self.inner.backing.write();
            if lookup(&backing, path) == Some(&value) {
                return false;
            }
            insert(&mut backing, path, value.clone());
            backing.clone()
        };
        self.notify(path, &value, &root, true);
        true
    }

    /// Remove `path` without notifying. The next read re-resolves its default.
    pub fn remove(&self, path: &str) -> Option<Value> {
        remove(&mut self.inner.backing.write(), path)
    }

    /// Copy of the whole backing object.
    pub fn snapshot(&self) -> Value {
        self.inner.backing.read().clone()
    }

    /// Listen to writes of `path`, or to every change when `path` is `None`.
    pub fn subscribe<F>(&self, path: Option<&str>, callback: F) -> Subscription
    where
        F: Fn(&SettingChange<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: SettingsListener = Arc::new(callback);
        let mut listeners = self.inner.listeners.lock();
        match path {
            Some(p) => listeners
                .by_path
                .entry(p.to_string())
                .or_default()
                .push((id, callback)),
            None => listeners.global.push((id, callback)),
        }
        Subscription {
            store: self.clone(),
            id,
            path: path.map(str::to_string),
        }
    }

    pub fn listener_count(&self) -> usize {
        let listeners = self.inner.listeners.lock();
        listeners.global.len() + listeners.by_path.values().map(Vec::len).sum::<usize>()
    }

    fn remove_listener(&self, id: u64, path: Option<&str>) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let list = match path {
            Some(p) => match listeners.by_path.get_mut(p) {
                Some(list) => list,
                None => return false,
            },
            None => &mut listeners.global,
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    fn notify(&self, path: &str, value: &Value, root: &Value, include_path: bool) {
        let targets: Vec<SettingsListener> = {
            let listeners = self.inner.listeners.lock();
            let by_path = include_path
                .then(|| listeners.by_path.get(path))
                .flatten()
                .into_iter()
                .flatten();
            listeners
                .global
                .iter()
                .chain(by_path)
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        let change = SettingChange { path, value, root };
        for cb in targets {
            if let Err(e) = cb(&change) {
                warn!(store = %self.inner.name, path = %path, error = %e, "Settings listener failed");
            }
        }
    }
}

/// Handle returned by [`SettingsStore::subscribe`]. Dropping it keeps the
/// listener; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    store: SettingsStore,
    id: u64,
    path: Option<String>,
}

impl Subscription {
    pub fn unsubscribe(self) -> bool {
        self.store.remove_listener(self.id, self.path.as_deref())
    }

    /// Convert into a closure a resource tracker can hold.
    pub fn into_unsubscribe(self) -> Unsubscribe {
        Box::new(move || {
            self.unsubscribe();
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Dotted-path helpers
// ---------------------------------------------------------------------------

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, seg| node.as_object()?.get(seg))
}

fn insert(root: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut node = root;
    while let Some(seg) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        node = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };
    let mut node = root;
    if let Some(parent) = parent {
        for seg in parent.split('.') {
            node = node.as_object_mut()?.get_mut(seg)?;
        }
    }
    node.as_object_mut()?.remove(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::SettingDefinition;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn bounded_store() -> SettingsStore {
        let mut defs = SettingsDefinitions::new();
        defs.insert("volume".into(), SettingDefinition::number(0.5).min(0.0).max(1.0));
        SettingsStore::new("test", json!({}), defs)
    }

    #[test]
    fn test_clamped_write_notifies_once_with_clamped_value() {
        let store = bounded_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        store.subscribe(Some("volume"), move |change| {
            s.lock().push(change.value.clone());
            Ok(())
        });

        assert!(store.set("volume", json!(5)));
        assert_eq!(store.get("volume"), Some(json!(1)));
        assert_eq!(*seen.lock(), vec![json!(1)]);

        // Same clamped value again: no-op.
        assert!(!store.set("volume", json!(7)));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_deep_paths_are_reactive() {
        let store = SettingsStore::new("deep", json!({"ui": {"theme": "dark"}}), Default::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        store.subscribe(Some("ui.theme"), move |change| {
            assert_eq!(change.value, &json!("light"));
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store.set("ui.theme", json!("light"));
        store.set("ui.scale", json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot(), json!({"ui": {"theme": "light", "scale": 2}}));
    }

    #[test]
    fn test_global_listener_sees_root_and_path() {
        let store = bounded_store();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let p = paths.clone();
        store.subscribe(None, move |change| {
            p.lock().push((change.path.to_string(), change.root.clone()));
            Ok(())
        });
        store.set("a.b", json!(true));
        assert_eq!(*paths.lock(), vec![("a.b".to_string(), json!({"a": {"b": true}}))]);
    }

    #[test]
    fn test_default_memoised_notifies_global_only() {
        let store = bounded_store();
        store.set_default_resolver(|path| (path == "volume").then(|| json!(0.5)));
        let global = Arc::new(AtomicUsize::new(0));
        let by_path = Arc::new(AtomicUsize::new(0));
        let g = global.clone();
        store.subscribe(None, move |_| {
            g.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let b = by_path.clone();
        store.subscribe(Some("volume"), move |_| {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(store.get("volume"), Some(json!(0.5)));
        assert_eq!(store.get("volume"), Some(json!(0.5)));
        assert_eq!(store.get("missing"), None);
        assert_eq!(global.load(Ordering::SeqCst), 1);
        assert_eq!(by_path.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_and_failing_listener() {
        let store = bounded_store();
        store.subscribe(None, |_| anyhow::bail!("listener failure is logged"));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = store.subscribe(Some("x"), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store.set("x", json!(1));
        assert!(sub.unsubscribe());
        store.set("x", json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn test_remove_path() {
        let store = SettingsStore::new("rm", json!({"a": {"b": 1, "c": 2}}), Default::default());
        assert_eq!(store.remove("a.b"), Some(json!(1)));
        assert_eq!(store.remove("a.zz"), None);
        assert_eq!(store.snapshot(), json!({"a": {"c": 2}}));
    }
}
