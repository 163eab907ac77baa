use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tether_config::{load_config, LoaderConfig, ModuleToggles, RuntimeConfig};
use tether_core::{ModuleId, ModuleMetadata, RuntimeError};
use tether_plugins::{
    FactoryTable, LoadScope, Loader, ManifestEngine, ModuleContext, Plugin, RuntimeContext,
    ScriptEngine, SourceFetcher,
};

/// Serves fixed documents and counts every fetch.
#[derive(Default)]
struct StaticFetcher {
    documents: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    fn with(mut self, url: &str, body: serde_json::Value) -> Self {
        self.documents.insert(url.to_string(), body.to_string());
        self
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 for {url}"))
    }
}

struct Echo {
    metadata: ModuleMetadata,
    starts: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for Echo {
    fn metadata(&self) -> ModuleMetadata {
        self.metadata.clone()
    }

    async fn start(&self, ctx: &ModuleContext) -> anyhow::Result<()> {
        ctx.logger().info("echo online");
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn echo_factories(starts: Arc<AtomicUsize>) -> FactoryTable {
    let factories = FactoryTable::new();
    factories.insert("echo", move |metadata| {
        Ok(Arc::new(Echo {
            metadata,
            starts: starts.clone(),
        }) as Arc<dyn Plugin>)
    });
    factories
}

fn fast_config(toggles: &[(&str, bool)]) -> RuntimeConfig {
    RuntimeConfig {
        loader: Some(LoaderConfig {
            max_retries: Some(2),
            retry_delay_ms: Some(1),
            dependency_timeout_ms: Some(100),
            cache_bust: Some(false),
        }),
        modules: toggles
            .iter()
            .map(|(url, on)| (url.to_string(), *on))
            .collect::<ModuleToggles>(),
        ..Default::default()
    }
}

const A_URL: &str = "https://cdn.example.com/modules/Alpha.json";
const B_URL: &str = "https://cdn.example.com/modules/Beta.json";

#[tokio::test]
async fn always_failing_url_is_tried_max_retries_plus_one_times() {
    let ctx = RuntimeContext::in_memory(fast_config(&[]));
    let fetcher = Arc::new(StaticFetcher::default());
    let loader = Loader::new(ctx, fetcher.clone(), Arc::new(ManifestEngine::default()));

    let url = "https://cdn.example.com/modules/Missing.json";
    let err = loader.load_from_url(url).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Load { .. }));
    assert_eq!(fetcher.calls(url), 3);
    assert_eq!(loader.failed_urls(), vec![url.to_string()]);
    assert!(!loader.is_loaded(url));
}

#[tokio::test]
async fn loads_starts_and_orders_dependencies() {
    let starts = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(
        StaticFetcher::default()
            .with(
                A_URL,
                json!({"name": "Alpha", "entry": "echo", "requiredDependencies": ["Beta"]}),
            )
            .with(
                B_URL,
                json!({
                    "name": "Beta",
                    "entry": "echo",
                    "settings": {"volume": {"type": "number", "default": 0.5, "max": 1}}
                }),
            ),
    );
    let ctx = RuntimeContext::in_memory(fast_config(&[(A_URL, true), (B_URL, true)]));
    let loader = Loader::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(ManifestEngine::new(echo_factories(starts.clone()))),
    );

    let summary = loader.load_all_modules().await;
    assert_eq!(summary.loaded, vec![A_URL.to_string(), B_URL.to_string()]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.started, vec![ModuleId::new("Beta"), ModuleId::new("Alpha")]);
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    assert_eq!(loader.module_for(A_URL), Some(ModuleId::new("Alpha")));
    assert_eq!(loader.module_for(B_URL), Some(ModuleId::new("Beta")));

    let beta = ctx.settings().get(&ModuleId::new("Beta")).unwrap();
    assert!(beta.set("volume", json!(5)));
    assert_eq!(beta.get("volume"), json!(1));

    // Already loaded: no second fetch.
    loader.load_from_url(A_URL).await.unwrap();
    assert_eq!(fetcher.calls(A_URL), 1);
}

#[tokio::test]
async fn duplicate_id_is_rejected_without_retry() {
    let dup = "https://mirror.example.com/Alpha.json";
    let fetcher = Arc::new(
        StaticFetcher::default()
            .with(A_URL, json!({"name": "Alpha", "entry": "echo"}))
            .with(dup, json!({"id": "Alpha", "name": "Alpha again", "entry": "echo"})),
    );
    let ctx = RuntimeContext::in_memory(fast_config(&[]));
    let loader = Loader::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(ManifestEngine::new(echo_factories(Arc::new(AtomicUsize::new(0))))),
    );

    loader.load_from_url(A_URL).await.unwrap();
    let err = loader.load_from_url(dup).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Registration(id) if id == "Alpha"));
    assert_eq!(fetcher.calls(dup), 1);
    assert!(loader.is_failed(dup));
    assert_eq!(ctx.controller().len(), 1);
}

#[tokio::test]
async fn catalog_seeds_toggles_and_skips_disabled_entries() {
    let catalog_url = "https://cdn.example.com/catalog.json";
    let fetcher = Arc::new(
        StaticFetcher::default()
            .with(
                catalog_url,
                json!({
                    "name": "Main",
                    "modules": [
                        {"id": "Alpha", "name": "Alpha", "url": A_URL},
                        {"id": "Beta", "name": "Beta", "url": B_URL, "enabledByDefault": false}
                    ]
                }),
            )
            .with(A_URL, json!({"name": "Alpha", "entry": "echo"}))
            .with(B_URL, json!({"name": "Beta", "entry": "echo"})),
    );
    let mut config = fast_config(&[]);
    config.catalogs = vec![catalog_url.to_string()];
    let ctx = RuntimeContext::in_memory(config);
    let loader = Loader::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(ManifestEngine::new(echo_factories(Arc::new(AtomicUsize::new(0))))),
    );

    let summary = loader.load_all_modules().await;
    assert_eq!(summary.loaded, vec![A_URL.to_string()]);
    assert_eq!(fetcher.calls(B_URL), 0);
    assert!(!loader.toggles().is_enabled(B_URL, true));

    let dir = tempfile::tempdir().unwrap();
    let path = tether_config::config_file_path(dir.path());
    loader.set_enabled(B_URL, true);
    loader.save_toggles(&path).await.unwrap();
    let saved = load_config(&path).await.unwrap();
    assert!(saved.modules.is_enabled(B_URL, false));
}

#[tokio::test]
async fn unknown_entry_fails_the_url_only() {
    let fetcher = Arc::new(
        StaticFetcher::default()
            .with(A_URL, json!({"name": "Alpha", "entry": "echo"}))
            .with(B_URL, json!({"name": "Beta", "entry": "nowhere"})),
    );
    let ctx = RuntimeContext::in_memory(fast_config(&[(A_URL, true), (B_URL, true)]));
    let loader = Loader::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(ManifestEngine::new(echo_factories(Arc::new(AtomicUsize::new(0))))),
    );

    let summary = loader.load_all_modules().await;
    assert_eq!(summary.loaded, vec![A_URL.to_string()]);
    assert_eq!(summary.failed, vec![B_URL.to_string()]);
    assert_eq!(fetcher.calls(B_URL), 3);
    assert_eq!(summary.started, vec![ModuleId::new("Alpha")]);
}

#[tokio::test]
async fn reload_replaces_the_module() {
    let starts = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(StaticFetcher::default().with(A_URL, json!({"name": "Alpha", "entry": "echo"})));
    let ctx = RuntimeContext::in_memory(fast_config(&[(A_URL, true)]));
    let loader = Loader::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(ManifestEngine::new(echo_factories(starts.clone()))),
    );

    loader.load_all_modules().await;
    let id = loader.reload(A_URL).await.unwrap();
    assert_eq!(id, ModuleId::new("Alpha"));
    assert_eq!(fetcher.calls(A_URL), 2);
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert!(ctx.controller().state(&id).unwrap().started);

    loader.unload(&id).await.unwrap();
    assert!(!loader.is_loaded(A_URL));
    assert!(!ctx.controller().contains(&id));
}

/// Registers an Echo module on every run but reports failure on the first.
struct FlakyEngine {
    runs: AtomicUsize,
}

impl ScriptEngine for FlakyEngine {
    fn execute(&self, _source: &str, scope: &LoadScope<'_>) -> anyhow::Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        scope.register_as(
            ModuleMetadata::new("Flaky", "Flaky"),
            Arc::new(Echo {
                metadata: ModuleMetadata::new("Flaky", "Flaky"),
                starts: Arc::new(AtomicUsize::new(0)),
            }),
        )?;
        if run == 0 {
            anyhow::bail!("failed after registering");
        }
        Ok(())
    }
}

#[tokio::test]
async fn failed_attempt_does_not_leave_its_module_behind() {
    let url = "https://cdn.example.com/modules/Flaky.js";
    let fetcher = Arc::new(StaticFetcher::default().with(url, json!({})));
    let ctx = RuntimeContext::in_memory(fast_config(&[]));
    let engine = Arc::new(FlakyEngine {
        runs: AtomicUsize::new(0),
    });
    let loader = Loader::new(ctx.clone(), fetcher.clone(), engine.clone());

    let id = loader.load_from_url(url).await.unwrap();
    assert_eq!(id, ModuleId::new("Flaky"));
    assert_eq!(engine.runs.load(Ordering::SeqCst), 2);
    assert_eq!(fetcher.calls(url), 2);
    assert_eq!(ctx.controller().ids(), vec![id.clone()]);
    assert!(loader.is_loaded(url));
    assert!(loader.failed_urls().is_empty());

    loader.unload(&id).await.unwrap();
    assert!(ctx.controller().is_empty());
}
