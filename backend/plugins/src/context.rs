//! The runtime context: every shared engine, constructed once and passed
//! by reference to whatever needs it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tether_config::{settings_file_path, RuntimeConfig};
use tether_core::{HostRoot, NativeBridge, NullBridge, SubscriptionPool};
use tether_events::EventRegistry;
use tether_hooks::{HookEngine, WrapPolicy};
use tether_settings::{JsonFileStore, KeyValueStore, MemoryStore, SettingsRegistry};
use tracing::info;

use crate::controller::ModuleController;

/// Shared engines every module context reaches through.
#[derive(Clone)]
pub struct Services {
    pub host: Arc<HostRoot>,
    pub bridge: Arc<dyn NativeBridge>,
    pub hooks: HookEngine,
    pub events: EventRegistry,
    pub settings: Arc<SettingsRegistry>,
    pub subscriptions: SubscriptionPool,
}

pub struct RuntimeContext {
    config: RuntimeConfig,
    services: Services,
    controller: Arc<ModuleController>,
}

impl RuntimeContext {
    pub fn new(
        config: RuntimeConfig,
        host: Arc<HostRoot>,
        bridge: Arc<dyn NativeBridge>,
        store: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let hook_settings = config.hook_settings();
        let policy = WrapPolicy {
            base_delay_ms: hook_settings.base_delay_ms,
            backoff_factor: hook_settings.backoff_factor,
            max_delay_ms: hook_settings.max_delay_ms,
            max_attempts: hook_settings.max_attempts,
        };

        let services = Services {
            hooks: HookEngine::with_policy(host.clone(), policy),
            events: EventRegistry::new(bridge.clone()),
            settings: Arc::new(SettingsRegistry::new(config.settings_root(), store)),
            subscriptions: SubscriptionPool::new(),
            host,
            bridge,
        };
        let controller = Arc::new(ModuleController::new(
            services.clone(),
            config.loader_settings().dependency_timeout,
        ));

        info!(settings_root = %config.settings_root(), "Runtime context ready");
        Arc::new(Self {
            config,
            services,
            controller,
        })
    }

    /// Install the global subscriber from the `logging` section of `config`.
    pub fn init_logging(config: &RuntimeConfig) -> bool {
        let dir = config.log_dir();
        logging::init_logger(dir.as_deref(), config.log_level())
    }

    /// Context backed by an in-memory settings store and no native side.
    pub fn in_memory(config: RuntimeConfig) -> Arc<Self> {
        Self::new(
            config,
            Arc::new(HostRoot::new()),
            Arc::new(NullBridge),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Context persisting settings to `settings.json` under `config_dir`.
    pub fn with_config_dir(
        config: RuntimeConfig,
        host: Arc<HostRoot>,
        bridge: Arc<dyn NativeBridge>,
        config_dir: &Path,
    ) -> Result<Arc<Self>> {
        let store = JsonFileStore::open(settings_file_path(config_dir))?;
        Ok(Self::new(config, host, bridge, Arc::new(store)))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn host(&self) -> &Arc<HostRoot> {
        &self.services.host
    }

    pub fn bridge(&self) -> &Arc<dyn NativeBridge> {
        &self.services.bridge
    }

    pub fn hooks(&self) -> &HookEngine {
        &self.services.hooks
    }

    pub fn events(&self) -> &EventRegistry {
        &self.services.events
    }

    pub fn settings(&self) -> &Arc<SettingsRegistry> {
        &self.services.settings
    }

    pub fn subscriptions(&self) -> &SubscriptionPool {
        &self.services.subscriptions
    }

    pub fn controller(&self) -> &Arc<ModuleController> {
        &self.controller
    }

    /// Forward the host's login signal to the controller.
    pub async fn trigger_login(&self, user: Value) -> bool {
        self.controller.trigger_login(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::HooksConfig;

    #[test]
    fn test_policy_comes_from_config() {
        let config = RuntimeConfig {
            hooks: Some(HooksConfig {
                max_attempts: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let ctx = RuntimeContext::in_memory(config);
        assert_eq!(ctx.hooks().policy().max_attempts, 2);
        assert_eq!(ctx.settings().root(), "tether");
    }

    #[test]
    fn test_settings_file_under_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::with_config_dir(
            RuntimeConfig::default(),
            Arc::new(HostRoot::new()),
            Arc::new(NullBridge),
            dir.path(),
        )
        .unwrap();
        assert!(ctx.controller().is_empty());
    }
}
