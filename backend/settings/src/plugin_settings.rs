//! Module-scoped settings wired to persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tether_core::ModuleId;
use tracing::debug;

use crate::definition::{SettingDefinition, SettingsDefinitions};
use crate::persist::KeyValueStore;
use crate::store::SettingsStore;

const GENERAL_CATEGORY: &str = "general";

/// Persisted key for one setting: `"<root>.<moduleId>.<key>"`.
pub fn namespaced_key(root: &str, owner: &ModuleId, key: &str) -> String {
    format!("{root}.{owner}.{key}")
}

/// Build a module's settings namespace.
///
/// Previously persisted values are loaded from `backend`; everything else
/// falls back to its declared default on first read. Every change to a
/// top-level key is written back to `backend`.
pub fn define_plugin_settings(
    backend: Arc<dyn KeyValueStore>,
    root: &str,
    owner: &ModuleId,
    definitions: SettingsDefinitions,
) -> PluginSettings {
    let mut initial = Map::new();
    for key in definitions.keys() {
        if let Some(value) = backend.get(&namespaced_key(root, owner, key)) {
            initial.insert(key.clone(), value);
        }
    }
    debug!(module = %owner, loaded = initial.len(), "Loaded persisted settings");

    let store = SettingsStore::new(owner.as_str(), Value::Object(initial), definitions);

    let defaults: BTreeMap<String, Value> = store
        .definitions()
        .iter()
        .map(|(k, d)| (k.clone(), d.default.clone()))
        .collect();
    store.set_default_resolver(move |path| defaults.get(path).cloned());

    let prefix = format!("{root}.{owner}");
    let persist_backend = backend.clone();
    let persist_owner = owner.clone();
    // Lives as long as the store; never unsubscribed.
    let _persist = store.subscribe(None, move |change| {
        let top = change.path.split('.').next().unwrap_or(change.path);
        let Some(value) = change.root.get(top) else {
            return Ok(());
        };
        persist_backend
            .set(&format!("{prefix}.{top}"), value.clone())
            .with_context(|| format!("persisting '{top}' for module '{persist_owner}'"))
    });

    PluginSettings {
        owner: owner.clone(),
        root: root.to_string(),
        store,
        backend,
    }
}

/// A module's settings: typed definitions over a reactive store.
#[derive(Clone)]
pub struct PluginSettings {
    owner: ModuleId,
    root: String,
    store: SettingsStore,
    backend: Arc<dyn KeyValueStore>,
}

impl PluginSettings {
    pub fn owner(&self) -> &ModuleId {
        &self.owner
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn definitions(&self) -> &SettingsDefinitions {
        self.store.definitions()
    }

    pub fn definition(&self, key: &str) -> Option<&SettingDefinition> {
        self.store.definitions().get(key)
    }

    /// Current value, or `Value::Null` for an undeclared, unset key.
    pub fn get(&self, key: &str) -> Value {
        self.store.get(key).unwrap_or(Value::Null)
    }

    pub fn set(&self, key: &str, value: Value) -> bool {
        self.store.set(key, value)
    }

    /// Re-apply the declared default for `key`. Returns false if the key is
    /// undeclared or already at its default.
    pub fn reset(&self, key: &str) -> bool {
        let Some(def) = self.definition(key) else {
            return false;
        };
        if self.store.get(key).as_ref() == Some(&def.default) {
            return false;
        }
        self.store.set(key, def.default.clone())
    }

    /// Re-apply every declared default. Returns how many values changed.
    pub fn reset_all(&self) -> usize {
        let keys: Vec<String> = self.definitions().keys().cloned().collect();
        keys.iter().filter(|k| self.reset(k)).count()
    }

    pub fn visible_settings(&self) -> Vec<String> {
        self.keys_where(|d| !d.hidden)
    }

    pub fn hidden_settings(&self) -> Vec<String> {
        self.keys_where(|d| d.hidden)
    }

    /// Visible keys grouped by category; uncategorised keys go under `"general"`.
    pub fn by_category(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, def) in self.definitions().iter().filter(|(_, d)| !d.hidden) {
            let category = def.category.as_deref().unwrap_or(GENERAL_CATEGORY);
            groups.entry(category.to_string()).or_default().push(key.clone());
        }
        groups
    }

    pub fn namespaced_key(&self, key: &str) -> String {
        namespaced_key(&self.root, &self.owner, key)
    }

    /// Delete every persisted value of this module.
    pub fn clear_persisted(&self) -> anyhow::Result<usize> {
        let prefix = format!("{}.{}.", self.root, self.owner);
        let keys = self.backend.keys_with_prefix(&prefix);
        for key in &keys {
            self.backend.remove(key)?;
        }
        Ok(keys.len())
    }

    fn keys_where(&self, pred: impl Fn(&SettingDefinition) -> bool) -> Vec<String> {
        self.definitions()
            .iter()
            .filter(|(_, d)| pred(d))
            .map(|(k, _)| k.clone())
            .collect()
    }
}
