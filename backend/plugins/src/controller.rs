//! Module Lifecycle Controller
//!
//! Owns the module registry and drives `load → start → on_login → stop`.
//! Dependency waits are woken by a publish on every registration and load,
//! so a waiting module starts as soon as its dependency reports loaded.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tether_core::{ModuleId, ModuleMetadata, RuntimeError, RuntimeResult};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::context::Services;
use crate::lifecycle::{ModuleInfo, ModuleState, ReleaseReport};
use crate::sdk::{ModuleContext, Plugin};

/// Callback queued until the host signals login.
pub type LoginCallback = Box<dyn FnOnce(&Value) -> anyhow::Result<()> + Send>;

struct ModuleEntry {
    plugin: Arc<dyn Plugin>,
    metadata: ModuleMetadata,
    state: Mutex<ModuleState>,
    context: ModuleContext,
    /// Serialises start/stop of this one module.
    transition: tokio::sync::Mutex<()>,
}

impl ModuleEntry {
    fn id(&self) -> &ModuleId {
        &self.metadata.id
    }

    fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            metadata: self.metadata.clone(),
            state: self.state(),
        }
    }
}

#[derive(Default)]
struct LoginState {
    triggered: bool,
    user: Value,
    queued: Vec<LoginCallback>,
}

/// Outcome of [`ModuleController::start_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartSummary {
    pub started: Vec<ModuleId>,
    pub failed: Vec<ModuleId>,
}

pub struct ModuleController {
    services: Services,
    dependency_timeout: Duration,
    /// Registration order.
    modules: RwLock<Vec<Arc<ModuleEntry>>>,
    login: Mutex<LoginState>,
    changes: watch::Sender<u64>,
}

impl ModuleController {
    pub fn new(services: Services, dependency_timeout: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            services,
            dependency_timeout,
            modules: RwLock::new(Vec::new()),
            login: Mutex::new(LoginState::default()),
            changes,
        }
    }

    pub fn dependency_timeout(&self) -> Duration {
        self.dependency_timeout
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register a module under the id from its own metadata.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> RuntimeResult<ModuleId> {
        let metadata = plugin.metadata();
        self.register_as(metadata, plugin)
    }

    /// Register a module under externally supplied metadata.
    pub fn register_as(
        &self,
        metadata: ModuleMetadata,
        plugin: Arc<dyn Plugin>,
    ) -> RuntimeResult<ModuleId> {
        let id = metadata.id.clone();
        {
            let mut modules = self.modules.write();
            if modules.iter().any(|m| m.id() == &id) {
                let err = RuntimeError::Registration(id.to_string());
                warn!("{err}");
                return Err(err);
            }
            modules.push(Arc::new(ModuleEntry {
                context: ModuleContext::new(id.clone(), self.services.clone()),
                plugin,
                metadata,
                state: Mutex::new(ModuleState {
                    enabled: true,
                    ..Default::default()
                }),
                transition: tokio::sync::Mutex::new(()),
            }));
        }
        info!(module = %id, "Module registered");
        self.publish();
        Ok(id)
    }

    /// Stop a module, drop it from the registry and forget its settings
    /// namespace. Persisted values stay in the backend.
    pub async fn unload(&self, id: &ModuleId) -> RuntimeResult<ReleaseReport> {
        let report = self.stop(id).await?;
        self.modules.write().retain(|m| m.id() != id);
        self.services.settings.remove(id);
        info!(module = %id, "Module unloaded");
        Ok(report)
    }

    pub fn get(&self, id: &ModuleId) -> Option<ModuleInfo> {
        self.find(id).map(|m| m.info())
    }

    pub fn list(&self) -> Vec<ModuleInfo> {
        self.modules.read().iter().map(|m| m.info()).collect()
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.read().iter().map(|m| m.id().clone()).collect()
    }

    pub fn state(&self, id: &ModuleId) -> Option<ModuleState> {
        self.find(id).map(|m| m.state())
    }

    pub fn context(&self, id: &ModuleId) -> Option<ModuleContext> {
        self.find(id).map(|m| m.context.clone())
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    fn find(&self, id: &ModuleId) -> Option<Arc<ModuleEntry>> {
        self.modules.read().iter().find(|m| m.id() == id).cloned()
    }

    fn entry(&self, id: &ModuleId) -> RuntimeResult<Arc<ModuleEntry>> {
        self.find(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("module '{id}'")))
    }

    fn publish(&self) {
        self.changes.send_modify(|n| *n += 1);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub async fn load(&self, id: &ModuleId) -> RuntimeResult<()> {
        let entry = self.entry(id)?;
        let _guard = entry.transition.lock().await;
        if entry.state().loaded {
            return Ok(());
        }
        entry.plugin.load(&entry.context).await.map_err(|e| {
            error!(module = %id, error = %e, "Module failed to load");
            RuntimeError::Other(e)
        })?;
        entry.state.lock().loaded = true;
        debug!(module = %id, "Module loaded");
        self.publish();
        Ok(())
    }

    /// Load every registered module concurrently. Returns how many are loaded.
    pub async fn load_all(&self) -> usize {
        let ids = self.ids();
        let results = join_all(ids.iter().map(|id| self.load(id))).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    /// Start one module after its required dependencies have loaded.
    pub async fn start(&self, id: &ModuleId) -> RuntimeResult<()> {
        let entry = self.entry(id)?;
        let state = entry.state();
        if !state.enabled {
            return Err(RuntimeError::invalid_state(id.as_str(), "module is disabled"));
        }
        if !state.loaded {
            return Err(RuntimeError::invalid_state(id.as_str(), "module is not loaded"));
        }
        if state.started {
            return Ok(());
        }

        for dependency in &entry.metadata.required_dependencies {
            if !self.wait_for_loaded(dependency, self.dependency_timeout).await {
                let err = RuntimeError::DependencyTimeout {
                    module: id.to_string(),
                    dependency: dependency.to_string(),
                };
                error!("{err}");
                return Err(err);
            }
        }
        for dependency in &entry.metadata.optional_dependencies {
            if !self.wait_for_loaded(dependency, self.dependency_timeout).await {
                warn!(module = %id, dependency = %dependency, "Optional dependency unavailable");
            }
        }

        let _guard = entry.transition.lock().await;
        let state = entry.state();
        if state.started || !state.enabled {
            return Ok(());
        }
        if let Err(e) = entry.plugin.start(&entry.context).await {
            error!(module = %id, error = %e, "Module failed to start");
            self.release(&entry);
            return Err(RuntimeError::Other(e));
        }
        entry.state.lock().started = true;
        info!(module = %id, "Module started");
        Ok(())
    }

    /// Start every enabled, loaded module. Modules without dependencies
    /// start first, concurrently; the rest then start concurrently, each
    /// waiting on its own dependencies in order.
    pub async fn start_all(&self) -> StartSummary {
        let candidates: Vec<Arc<ModuleEntry>> = self
            .modules
            .read()
            .iter()
            .filter(|m| {
                let state = m.state();
                state.enabled && state.loaded && !state.started
            })
            .cloned()
            .collect();
        let (independent, dependent): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|m| !m.metadata.has_dependencies());

        let mut summary = StartSummary::default();
        for group in [independent, dependent] {
            let results = join_all(group.iter().map(|m| async move {
                (m.id().clone(), self.start(m.id()).await)
            }))
            .await;
            for (id, result) in results {
                match result {
                    Ok(()) => summary.started.push(id),
                    Err(_) => summary.failed.push(id),
                }
            }
        }
        summary
    }

    /// Stop a module and release everything it owns. Safe to repeat; a
    /// second call releases nothing.
    pub async fn stop(&self, id: &ModuleId) -> RuntimeResult<ReleaseReport> {
        let entry = self.entry(id)?;
        let _guard = entry.transition.lock().await;
        let was_started = entry.state().started;
        if was_started {
            if let Err(e) = entry.plugin.stop(&entry.context).await {
                warn!(module = %id, error = %e, "Module stop hook failed");
            }
        }

        let report = self.release(&entry);
        {
            let mut state = entry.state.lock();
            state.started = false;
            state.stopped_once |= was_started;
        }
        if was_started {
            info!(module = %id, released = report.total(), "Module stopped");
        }
        Ok(report)
    }

    fn release(&self, entry: &ModuleEntry) -> ReleaseReport {
        let id = entry.id();
        let mut report = entry.context.resources().cleanup(&self.services.hooks);
        report.hooks += self.services.hooks.unregister_all(id);
        let (events, listeners) = self.services.events.unregister_all(id);
        report.events += events;
        report.listeners += listeners;
        report
    }

    pub async fn enable(&self, id: &ModuleId) -> RuntimeResult<()> {
        let entry = self.entry(id)?;
        let should_start = {
            let mut state = entry.state.lock();
            if state.enabled {
                return Err(RuntimeError::invalid_state(id.as_str(), "already enabled"));
            }
            state.enabled = true;
            state.loaded && !state.started
        };
        info!(module = %id, "Module enabled");
        if should_start {
            self.start(id).await?;
        }
        Ok(())
    }

    pub async fn disable(&self, id: &ModuleId) -> RuntimeResult<()> {
        let entry = self.entry(id)?;
        let should_stop = {
            let mut state = entry.state.lock();
            if !state.enabled {
                return Err(RuntimeError::invalid_state(id.as_str(), "already disabled"));
            }
            state.enabled = false;
            state.started
        };
        info!(module = %id, "Module disabled");
        if should_stop {
            self.stop(id).await?;
        }
        Ok(())
    }

    /// Flip the enabled flag. Returns the new value.
    pub async fn toggle(&self, id: &ModuleId) -> RuntimeResult<bool> {
        let enabled = self.entry(id)?.state().enabled;
        if enabled {
            self.disable(id).await?;
        } else {
            self.enable(id).await?;
        }
        Ok(!enabled)
    }

    /// Wait until `id` is registered and loaded, or `timeout` passes.
    pub async fn wait_for_loaded(&self, id: &ModuleId, timeout: Duration) -> bool {
        let mut changes = self.changes.subscribe();
        let wait = async {
            loop {
                if self.find(id).is_some_and(|m| m.state().loaded) {
                    return true;
                }
                if changes.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    /// Run `callback` with the login payload, now if login already fired.
    pub fn on_login<F>(&self, callback: F)
    where
        F: FnOnce(&Value) -> anyhow::Result<()> + Send + 'static,
    {
        let user = {
            let mut login = self.login.lock();
            if !login.triggered {
                login.queued.push(Box::new(callback));
                return;
            }
            login.user.clone()
        };
        if let Err(e) = callback(&user) {
            warn!(error = %e, "Login callback failed");
        }
    }

    /// Deliver the host login signal. Fires at most once; returns `false`
    /// on every later call.
    pub async fn trigger_login(&self, user: Value) -> bool {
        let queued = {
            let mut login = self.login.lock();
            if login.triggered {
                debug!("Login already delivered");
                return false;
            }
            login.triggered = true;
            login.user = user.clone();
            std::mem::take(&mut login.queued)
        };

        for callback in queued {
            if let Err(e) = callback(&user) {
                warn!(error = %e, "Login callback failed");
            }
        }

        let enabled: Vec<Arc<ModuleEntry>> = self
            .modules
            .read()
            .iter()
            .filter(|m| m.state().enabled)
            .cloned()
            .collect();
        for entry in enabled {
            if let Err(e) = entry.plugin.on_login(&entry.context, &user).await {
                error!(module = %entry.id(), error = %e, "Module login handler failed");
            }
        }
        info!("Login delivered");
        true
    }

    pub fn has_triggered_login(&self) -> bool {
        self.login.lock().triggered
    }
}
