//! Module SDK
//!
//! The [`Plugin`] trait every module implements and the [`ModuleContext`]
//! handed to each lifecycle call. All registrations made through the context
//! are recorded against the module so `stop` can undo them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logging::ModuleLogger;
use serde_json::Value;
use tether_core::{
    ChangeCallback, EventTarget, HostRoot, Invocation, ListenerOptions, ModuleId, ModuleMetadata,
    ReactiveContainer, RuntimeResult, Unsubscribe,
};
use tether_events::{EmitOutcome, EventOptions, ListenerHandle};
use tether_hooks::{HookHandle, Next};
use tether_settings::{PluginSettings, SettingsDefinitions};

use crate::context::Services;
use crate::resources::{Observer, ResourceTracker};

/// A unit of extension code with a `load → start → on_login → stop` lifecycle.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> ModuleMetadata;

    /// Prepare internal state. Must not touch the host.
    async fn load(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before the context's resources are released.
    async fn stop(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_login(&self, _ctx: &ModuleContext, _user: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Per-module view of the runtime.
#[derive(Clone)]
pub struct ModuleContext {
    id: ModuleId,
    logger: ModuleLogger,
    resources: Arc<ResourceTracker>,
    services: Services,
}

impl ModuleContext {
    pub(crate) fn new(id: ModuleId, services: Services) -> Self {
        Self {
            logger: ModuleLogger::new(id.as_str()),
            resources: Arc::new(ResourceTracker::new(id.clone())),
            id,
            services,
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }

    pub fn resources(&self) -> &Arc<ResourceTracker> {
        &self.resources
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn host(&self) -> &Arc<HostRoot> {
        &self.services.host
    }

    /// Call a host function by dotted path.
    pub fn call(&self, path: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        self.services.host.call(path, Value::Null, args)
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    pub fn pre_hook<F>(&self, path: &str, callback: F) -> HookHandle
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = self.services.hooks.register_pre_hook(path, &self.id, callback);
        self.resources.register_hook(handle.clone());
        handle
    }

    pub fn post_hook<F>(&self, path: &str, callback: F) -> HookHandle
    where
        F: Fn(&Value, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = self.services.hooks.register_post_hook(path, &self.id, callback);
        self.resources.register_hook(handle.clone());
        handle
    }

    pub fn void_hook<F>(&self, path: &str, callback: F) -> HookHandle
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handle = self.services.hooks.register_void_hook(path, &self.id, callback);
        self.resources.register_hook(handle.clone());
        handle
    }

    pub fn replace_hook<F>(&self, path: &str, callback: F) -> HookHandle
    where
        F: Fn(&Invocation, &Next<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handle = self
            .services
            .hooks
            .register_replace_hook(path, &self.id, callback);
        self.resources.register_hook(handle.clone());
        handle
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn register_event(&self, name: &str, options: EventOptions) {
        self.services.events.register(&self.id, name, options);
    }

    pub fn emit(&self, name: &str, payload: Value) -> EmitOutcome {
        self.services.events.emit(&self.id, name, payload)
    }

    /// Listen on the event registry. Released with the module's other
    /// registry ownership on stop.
    pub fn listen<F>(&self, name: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.services.events.add_listener(&self.id, name, callback)
    }

    // -----------------------------------------------------------------------
    // Tracked resources
    // -----------------------------------------------------------------------

    /// Run `task` once after `delay`. Aborted if the module stops first.
    pub fn spawn_timer<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        self.resources.register_timer(handle);
    }

    /// Run `tick` every `period` until the module stops.
    pub fn spawn_interval<F>(&self, period: Duration, tick: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                tick();
            }
        });
        self.resources.register_timer(handle);
    }

    pub fn observe(&self, observer: impl Observer + 'static) {
        self.resources.register_observer(observer);
    }

    pub fn listen_target(
        &self,
        target: Arc<dyn EventTarget>,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
        options: ListenerOptions,
    ) -> anyhow::Result<()> {
        self.resources
            .register_listener(target, event, handler, options)
    }

    /// Watch a host container through the shared subscription for `kind`.
    pub fn subscribe_store(
        &self,
        kind: &str,
        container: &dyn ReactiveContainer,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) {
        let callback: ChangeCallback = Arc::new(callback);
        let unsubscribe = self
            .services
            .subscriptions
            .subscribe(kind, container, callback);
        self.resources.register_subscription(unsubscribe);
    }

    pub fn track_subscription(&self, unsubscribe: Unsubscribe) {
        self.resources.register_subscription(unsubscribe);
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn settings(&self) -> Option<PluginSettings> {
        self.services.settings.get(&self.id)
    }

    pub fn define_settings(&self, definitions: SettingsDefinitions) -> PluginSettings {
        self.services.settings.define(&self.id, definitions)
    }
}
