use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tether_core::ModuleId;
use tracing::info;

use crate::definition::SettingsDefinitions;
use crate::persist::KeyValueStore;
use crate::plugin_settings::{PluginSettings, define_plugin_settings};

/// One settings namespace per module, all persisted into the same backend.
pub struct SettingsRegistry {
    root: String,
    backend: Arc<dyn KeyValueStore>,
    namespaces: RwLock<HashMap<ModuleId, PluginSettings>>,
}

impl SettingsRegistry {
    pub fn new(root: impl Into<String>, backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            root: root.into(),
            backend,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Define (or redefine) the namespace for `owner`.
    pub fn define(&self, owner: &ModuleId, definitions: SettingsDefinitions) -> PluginSettings {
        let settings =
            define_plugin_settings(self.backend.clone(), &self.root, owner, definitions);
        if self
            .namespaces
            .write()
            .insert(owner.clone(), settings.clone())
            .is_some()
        {
            info!(module = %owner, "Settings namespace redefined");
        }
        settings
    }

    pub fn get(&self, owner: &ModuleId) -> Option<PluginSettings> {
        self.namespaces.read().get(owner).cloned()
    }

    /// Forget the namespace. Persisted values stay in the backend.
    pub fn remove(&self, owner: &ModuleId) -> Option<PluginSettings> {
        self.namespaces.write().remove(owner)
    }

    pub fn len(&self) -> usize {
        self.namespaces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.read().is_empty()
    }
}
