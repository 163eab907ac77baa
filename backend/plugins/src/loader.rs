//! Remote Loader
//!
//! Fetches module sources by URL, executes them in a load scope behind a
//! single execution lock, and detects which module registered itself by
//! diffing the registry around the execution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use logging::ModuleLogger;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tether_config::{update_config, LoaderSettings, ModuleToggles};
use tether_core::{ModuleId, ModuleMetadata, RuntimeError, RuntimeResult};
use tether_settings::{PluginSettings, SettingType, SettingsDefinitions, SettingsRegistry};
use tracing::{debug, error, info, warn};

use crate::context::RuntimeContext;
use crate::controller::ModuleController;
use crate::lifecycle::ReleaseReport;
use crate::manifest::{Catalog, ModuleManifest};
use crate::sdk::Plugin;

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::Client,
    cache_bust: bool,
}

impl HttpFetcher {
    pub fn new(cache_bust: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_bust,
        }
    }
}

/// Append `_t=<millis>` so intermediaries cannot serve a stale copy.
pub fn cache_busted(url: &str, millis: i64) -> Result<String> {
    let mut parsed =
        url::Url::parse(url).with_context(|| format!("Invalid module URL: {url}"))?;
    parsed
        .query_pairs_mut()
        .append_pair("_t", &millis.to_string());
    Ok(parsed.into())
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let target = if self.cache_bust {
            cache_busted(url, chrono::Utc::now().timestamp_millis())?
        } else {
            url.to_string()
        };
        let response = self
            .client
            .get(&target)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Bad status from {url}"))?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// The names a module source can reach while it executes.
pub struct LoadScope<'a> {
    url: &'a str,
    logger: ModuleLogger,
    controller: &'a ModuleController,
    settings: &'a SettingsRegistry,
}

impl LoadScope<'_> {
    pub fn url(&self) -> &str {
        self.url
    }

    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }

    /// Self-registration. The module URL is filled in when the metadata
    /// does not carry one.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> RuntimeResult<ModuleId> {
        let metadata = plugin.metadata();
        self.register_as(metadata, plugin)
    }

    pub fn register_as(
        &self,
        mut metadata: ModuleMetadata,
        plugin: Arc<dyn Plugin>,
    ) -> RuntimeResult<ModuleId> {
        if metadata.url.is_none() {
            metadata.url = Some(self.url.to_string());
        }
        self.controller.register_as(metadata, plugin)
    }

    pub fn define_settings(
        &self,
        owner: &ModuleId,
        definitions: SettingsDefinitions,
    ) -> PluginSettings {
        self.settings.define(owner, definitions)
    }

    /// Look up a setting type by its lowercase name.
    pub fn setting_type(&self, name: &str) -> Option<SettingType> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

/// Turns fetched source text into registered modules.
pub trait ScriptEngine: Send + Sync {
    fn execute(&self, source: &str, scope: &LoadScope<'_>) -> Result<()>;
}

/// Builds a module from its manifest-derived metadata.
pub type ModuleFactory =
    Arc<dyn Fn(ModuleMetadata) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Factories keyed by manifest `entry`.
#[derive(Clone, Default)]
pub struct FactoryTable {
    factories: Arc<RwLock<HashMap<String, ModuleFactory>>>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&self, entry: impl Into<String>, factory: F)
    where
        F: Fn(ModuleMetadata) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(entry.into(), Arc::new(factory));
    }

    pub fn get(&self, entry: &str) -> Option<ModuleFactory> {
        self.factories.read().get(entry).cloned()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.read().contains_key(entry)
    }
}

/// Reads the fetched text as a [`ModuleManifest`] and builds the module
/// through the factory named by its `entry`.
#[derive(Clone, Default)]
pub struct ManifestEngine {
    factories: FactoryTable,
}

impl ManifestEngine {
    pub fn new(factories: FactoryTable) -> Self {
        Self { factories }
    }

    pub fn factories(&self) -> &FactoryTable {
        &self.factories
    }
}

impl ScriptEngine for ManifestEngine {
    fn execute(&self, source: &str, scope: &LoadScope<'_>) -> Result<()> {
        let mut manifest = ModuleManifest::parse(source)
            .with_context(|| format!("Invalid module manifest at {}", scope.url()))?;
        let factory = self
            .factories
            .get(&manifest.entry)
            .with_context(|| format!("No module factory for entry '{}'", manifest.entry))?;

        let settings = std::mem::take(&mut manifest.settings);
        let metadata = manifest.into_metadata(scope.url());
        let plugin = factory(metadata.clone())?;
        let id = scope.register_as(metadata, plugin)?;
        if !settings.is_empty() {
            scope.define_settings(&id, settings);
        }
        scope.logger().debug(format!("Executed manifest for '{id}'"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Outcome of [`Loader::load_all_modules`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    pub started: Vec<ModuleId>,
    pub start_failed: Vec<ModuleId>,
}

#[derive(Default)]
struct LoaderState {
    loaded_urls: BTreeSet<String>,
    failed_urls: BTreeSet<String>,
    /// URL → the module its execution registered.
    artifacts: BTreeMap<String, ModuleId>,
    toggles: ModuleToggles,
}

pub struct Loader {
    ctx: Arc<RuntimeContext>,
    fetcher: Arc<dyn SourceFetcher>,
    engine: Arc<dyn ScriptEngine>,
    settings: LoaderSettings,
    /// Serialises execute-and-detect across concurrent loads.
    exec_lock: tokio::sync::Mutex<()>,
    state: Mutex<LoaderState>,
}

impl Loader {
    pub fn new(
        ctx: Arc<RuntimeContext>,
        fetcher: Arc<dyn SourceFetcher>,
        engine: Arc<dyn ScriptEngine>,
    ) -> Self {
        let settings = ctx.config().loader_settings();
        let state = LoaderState {
            toggles: ctx.config().modules.clone(),
            ..Default::default()
        };
        Self {
            ctx,
            fetcher,
            engine,
            settings,
            exec_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(state),
        }
    }

    /// HTTP fetching plus manifest execution.
    pub fn http(ctx: Arc<RuntimeContext>, factories: FactoryTable) -> Self {
        let cache_bust = ctx.config().loader_settings().cache_bust;
        Self::new(
            ctx,
            Arc::new(HttpFetcher::new(cache_bust)),
            Arc::new(ManifestEngine::new(factories)),
        )
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Fetch and execute `url`, retrying with linear backoff. Returns the id
    /// of the module that registered itself.
    pub async fn load_from_url(&self, url: &str) -> RuntimeResult<ModuleId> {
        if let Some(id) = self.loaded_module(url) {
            debug!(url = %url, module = %id, "Already loaded");
            return Ok(id);
        }

        let attempts = self.settings.max_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.fetch_and_execute(url).await {
                Ok(id) => {
                    let mut state = self.state.lock();
                    state.loaded_urls.insert(url.to_string());
                    state.failed_urls.remove(url);
                    state.artifacts.insert(url.to_string(), id.clone());
                    info!(url = %url, module = %id, attempt, "Module source loaded");
                    return Ok(id);
                }
                Err(e) => {
                    if let Some(RuntimeError::Registration(id)) = e.downcast_ref::<RuntimeError>()
                    {
                        self.state.lock().failed_urls.insert(url.to_string());
                        return Err(RuntimeError::Registration(id.clone()));
                    }
                    warn!(url = %url, attempt, max = attempts, error = %e, "Module load attempt failed");
                    last_error = format!("{e:#}");
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay * attempt).await;
                    }
                }
            }
        }

        self.state.lock().failed_urls.insert(url.to_string());
        let err = RuntimeError::Load {
            url: url.to_string(),
            message: last_error,
        };
        error!("{err}");
        Err(err)
    }

    fn loaded_module(&self, url: &str) -> Option<ModuleId> {
        let state = self.state.lock();
        state
            .loaded_urls
            .contains(url)
            .then(|| state.artifacts.get(url).cloned())
            .flatten()
    }

    async fn fetch_and_execute(&self, url: &str) -> Result<ModuleId> {
        let source = self.fetcher.fetch(url).await?;

        let _guard = self.exec_lock.lock().await;
        let controller = self.ctx.controller();
        let before: BTreeSet<ModuleId> = controller.ids().into_iter().collect();

        let executed = {
            let scope = LoadScope {
                url,
                logger: ModuleLogger::new("loader"),
                controller,
                settings: self.ctx.settings(),
            };
            self.engine.execute(&source, &scope)
        };

        let registered: Vec<ModuleId> = controller
            .ids()
            .into_iter()
            .filter(|id| !before.contains(id))
            .collect();

        if let Err(e) = executed {
            // A failed attempt leaves nothing registered.
            for orphan in registered {
                match controller.unload(&orphan).await {
                    Ok(_) => warn!(url = %url, module = %orphan, "Evicted module from failed load"),
                    Err(err) => warn!(url = %url, module = %orphan, error = %err, "Failed to evict module"),
                }
            }
            return Err(e);
        }

        let mut registered = registered.into_iter();
        let id = registered
            .next()
            .with_context(|| format!("No module registered itself from {url}"))?;
        if let Some(extra) = registered.next() {
            warn!(url = %url, module = %id, extra = %extra, "Source registered more than one module");
        }
        Ok(id)
    }

    /// Fetch a catalog and seed toggles for entries not configured yet.
    pub async fn load_catalog(&self, url: &str) -> RuntimeResult<Catalog> {
        let to_load_error = |e: anyhow::Error| RuntimeError::Load {
            url: url.to_string(),
            message: format!("{e:#}"),
        };
        let source = self.fetcher.fetch(url).await.map_err(to_load_error)?;
        let catalog = Catalog::parse(&source).map_err(to_load_error)?;

        let mut state = self.state.lock();
        let seeded = catalog
            .modules
            .iter()
            .filter(|entry| state.toggles.seed(&entry.url, entry.enabled_by_default))
            .count();
        info!(catalog = %catalog.name, modules = catalog.modules.len(), seeded, "Catalog loaded");
        Ok(catalog)
    }

    /// Load every configured catalog, fetch every enabled URL, then load and
    /// start the resulting modules.
    pub async fn load_all_modules(&self) -> LoadSummary {
        for catalog in &self.ctx.config().catalogs {
            if let Err(e) = self.load_catalog(catalog).await {
                warn!("{e}");
            }
        }

        let urls = self.state.lock().toggles.enabled_urls();
        let results = join_all(urls.iter().map(|url| self.load_from_url(url))).await;

        let mut summary = LoadSummary::default();
        for (url, result) in urls.into_iter().zip(results) {
            match result {
                Ok(_) => summary.loaded.push(url),
                Err(_) => summary.failed.push(url),
            }
        }

        let controller = self.ctx.controller();
        controller.load_all().await;
        let started = controller.start_all().await;
        summary.started = started.started;
        summary.start_failed = started.failed;

        info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            started = summary.started.len(),
            start_failed = summary.start_failed.len(),
            "Module loading finished"
        );
        summary
    }

    /// Stop and evict a module, forgetting the URL it came from.
    pub async fn unload(&self, id: &ModuleId) -> RuntimeResult<ReleaseReport> {
        let report = self.ctx.controller().unload(id).await?;
        let mut state = self.state.lock();
        let urls: Vec<String> = state
            .artifacts
            .iter()
            .filter(|(_, module)| *module == id)
            .map(|(url, _)| url.clone())
            .collect();
        for url in urls {
            state.artifacts.remove(&url);
            state.loaded_urls.remove(&url);
        }
        Ok(report)
    }

    /// Unload whatever `url` produced, then fetch, load and start it again.
    pub async fn reload(&self, url: &str) -> RuntimeResult<ModuleId> {
        let previous = self.state.lock().artifacts.get(url).cloned();
        if let Some(id) = previous {
            self.unload(&id).await?;
        }
        self.state.lock().failed_urls.remove(url);

        let id = self.load_from_url(url).await?;
        let controller = self.ctx.controller();
        controller.load(&id).await?;
        if controller.state(&id).is_some_and(|s| s.enabled) {
            controller.start(&id).await?;
        }
        info!(url = %url, module = %id, "Module reloaded");
        Ok(id)
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.state.lock().loaded_urls.iter().cloned().collect()
    }

    pub fn failed_urls(&self) -> Vec<String> {
        self.state.lock().failed_urls.iter().cloned().collect()
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.state.lock().loaded_urls.contains(url)
    }

    pub fn is_failed(&self, url: &str) -> bool {
        self.state.lock().failed_urls.contains(url)
    }

    pub fn module_for(&self, url: &str) -> Option<ModuleId> {
        self.state.lock().artifacts.get(url).cloned()
    }

    pub fn toggles(&self) -> ModuleToggles {
        self.state.lock().toggles.clone()
    }

    pub fn set_enabled(&self, url: &str, enabled: bool) {
        self.state.lock().toggles.set(url, enabled);
    }

    /// Write the current toggles into the config file at `path`.
    pub async fn save_toggles(&self, path: &Path) -> Result<()> {
        let toggles = self.toggles();
        update_config(path, move |config| config.modules = toggles).await?;
        Ok(())
    }
}
