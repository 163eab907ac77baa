use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tether_config::{LoaderConfig, RuntimeConfig};
use tether_core::{
    host_fn, HostRoot, HostTarget, ListenerOptions, ModuleId, ModuleMetadata, ReactiveValue,
    RecordingBridge,
};
use tether_events::EventOptions;
use tether_plugins::{
    DisconnectFn, ModuleContext, Phase, Plugin, ReleaseReport, RuntimeContext,
};
use tether_settings::{KeyValueStore, MemoryStore, SettingDefinition, SettingsDefinitions};

struct Busy {
    target: Arc<HostTarget>,
    user: ReactiveValue,
    hook_hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Plugin for Busy {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new("busy", "Busy")
    }

    async fn start(&self, ctx: &ModuleContext) -> anyhow::Result<()> {
        let hits = self.hook_hits.clone();
        ctx.pre_hook("svc.run", move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        ctx.register_event("busy.tick", EventOptions::default());
        ctx.listen("busy.tick", |_, _| Ok(()));
        ctx.spawn_interval(Duration::from_secs(3600), || {});
        ctx.observe(DisconnectFn::new(|| {}));
        ctx.listen_target(self.target.clone(), "resize", |_| {}, ListenerOptions::default())?;
        ctx.subscribe_store("user", &self.user, |_| {});
        Ok(())
    }
}

#[tokio::test]
async fn stop_releases_everything_once() {
    let host = Arc::new(HostRoot::new());
    host.define("svc.run", host_fn(|_| Ok(json!("ran")))).unwrap();
    let ctx = RuntimeContext::new(
        RuntimeConfig::default(),
        host.clone(),
        Arc::new(RecordingBridge::new()),
        Arc::new(MemoryStore::new()),
    );
    let target = Arc::new(HostTarget::new("window"));
    let user = ReactiveValue::new(json!(null));
    let hook_hits = Arc::new(AtomicUsize::new(0));

    let controller = ctx.controller();
    let id = controller
        .register(Arc::new(Busy {
            target: target.clone(),
            user: user.clone(),
            hook_hits: hook_hits.clone(),
        }))
        .unwrap();
    controller.load(&id).await.unwrap();
    controller.start(&id).await.unwrap();

    host.call("svc.run", Value::Null, vec![]).unwrap();
    assert_eq!(hook_hits.load(Ordering::SeqCst), 1);
    assert_eq!(user.subscriber_count(), 1);
    assert!(ctx.events().is_registered("busy.tick"));

    let first = controller.stop(&id).await.unwrap();
    assert_eq!(
        first,
        ReleaseReport {
            timers: 1,
            observers: 1,
            listeners: 2,
            subscriptions: 1,
            hooks: 1,
            events: 1,
        }
    );
    assert_eq!(controller.state(&id).unwrap().phase(), Phase::Stopped);

    let second = controller.stop(&id).await.unwrap();
    assert!(second.is_empty());

    assert_eq!(host.call("svc.run", Value::Null, vec![]).unwrap(), json!("ran"));
    assert_eq!(hook_hits.load(Ordering::SeqCst), 1);
    assert_eq!(user.subscriber_count(), 0);
    assert_eq!(target.listener_count("resize"), 0);
    assert!(!ctx.events().is_registered("busy.tick"));
}

struct Named(&'static str, Vec<&'static str>);

#[async_trait]
impl Plugin for Named {
    fn metadata(&self) -> ModuleMetadata {
        self.1
            .iter()
            .fold(ModuleMetadata::new(self.0, self.0), |meta, dep| meta.requires(*dep))
    }
}

#[tokio::test]
async fn dependency_arriving_late_unblocks_start() {
    let config = RuntimeConfig {
        loader: Some(LoaderConfig {
            dependency_timeout_ms: Some(200),
            ..Default::default()
        }),
        ..Default::default()
    };
    let ctx = RuntimeContext::in_memory(config);
    let controller = ctx.controller().clone();

    let a = controller.register(Arc::new(Named("A", vec!["B"]))).unwrap();
    controller.load(&a).await.unwrap();

    let late = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let b = late.register(Arc::new(Named("B", vec![]))).unwrap();
        late.load(&b).await.unwrap();
    });

    let began = Instant::now();
    controller.start(&a).await.unwrap();
    assert!(began.elapsed() < Duration::from_millis(200));
    assert!(controller.state(&a).unwrap().started);
}

#[tokio::test]
async fn start_all_skips_disabled_and_reports_dependency_failures() {
    let config = RuntimeConfig {
        loader: Some(LoaderConfig {
            dependency_timeout_ms: Some(20),
            ..Default::default()
        }),
        ..Default::default()
    };
    let ctx = RuntimeContext::in_memory(config);
    let controller = ctx.controller();

    let base = controller.register(Arc::new(Named("base", vec![]))).unwrap();
    let needy = controller
        .register(Arc::new(Named("needy", vec!["missing"])))
        .unwrap();
    let user = controller
        .register(Arc::new(Named("user", vec!["base"])))
        .unwrap();
    let off = controller.register(Arc::new(Named("off", vec![]))).unwrap();
    controller.disable(&off).await.unwrap();

    assert_eq!(controller.load_all().await, 4);
    let summary = controller.start_all().await;
    assert_eq!(summary.started, vec![base, user]);
    assert_eq!(summary.failed, vec![needy]);
    assert!(!controller.state(&off).unwrap().started);
}

#[tokio::test]
async fn emitting_tick_broadcasts_once() {
    let bridge = Arc::new(RecordingBridge::new());
    let ctx = RuntimeContext::new(
        RuntimeConfig::default(),
        Arc::new(HostRoot::new()),
        bridge.clone(),
        Arc::new(MemoryStore::new()),
    );
    let id = ctx
        .controller()
        .register(Arc::new(Named("M", vec![])))
        .unwrap();
    let module = ctx.controller().context(&id).unwrap();

    module.register_event("tick", EventOptions::default());
    let outcome = module.emit("tick", json!({"n": 1}));
    assert!(outcome.logged);
    assert!(outcome.broadcast);

    let stats = ctx.events().record("tick").unwrap();
    assert_eq!(stats.emit_count, 1);
    assert!(stats.last_emitted.is_some());

    let messages = bridge.messages();
    assert_eq!(messages.len(), 1);
    let sent: Value = serde_json::from_str(&messages[0].payload).unwrap();
    assert_eq!(sent["plugin"], "M");
    assert_eq!(sent["payload"], json!({"n": 1, "plugin": "M"}));
}

#[tokio::test]
async fn login_reaches_enabled_modules_once() {
    struct Greeter(Arc<AtomicUsize>);

    #[async_trait]
    impl Plugin for Greeter {
        fn metadata(&self) -> ModuleMetadata {
            ModuleMetadata::new("greeter", "Greeter")
        }

        async fn on_login(&self, ctx: &ModuleContext, user: &Value) -> anyhow::Result<()> {
            ctx.logger().info(format!("hello {}", user["name"]));
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let ctx = RuntimeContext::in_memory(RuntimeConfig::default());
    let greeted = Arc::new(AtomicUsize::new(0));
    ctx.controller()
        .register(Arc::new(Greeter(greeted.clone())))
        .unwrap();

    assert!(ctx.trigger_login(json!({"name": "ada"})).await);
    assert!(!ctx.trigger_login(json!({"name": "ada"})).await);
    assert_eq!(greeted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declared_default_is_read_and_persisted() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = RuntimeContext::new(
        RuntimeConfig::default(),
        Arc::new(HostRoot::new()),
        Arc::new(RecordingBridge::new()),
        backend.clone(),
    );
    let id = ctx
        .controller()
        .register(Arc::new(Named("Mixer", vec![])))
        .unwrap();
    let module = ctx.controller().context(&id).unwrap();

    let mut definitions = SettingsDefinitions::new();
    definitions.insert(
        "volume".into(),
        SettingDefinition::number(0.5).min(0.0).max(1.0),
    );
    let settings = module.define_settings(definitions);

    assert_eq!(settings.get("volume"), json!(0.5));
    assert_eq!(backend.get("tether.Mixer.volume"), Some(json!(0.5)));
    assert_eq!(module.settings().unwrap().get("volume"), json!(0.5));
    assert_eq!(ModuleId::new("Mixer"), *module.id());
}
