/// Hook engine.
///
/// Hooks are registered against dotted host paths and may arrive before the
/// host has defined the function. The first successful wrap captures the
/// original function once and installs a dispatcher in its place; later
/// registrations on the same path only append to the per-kind lists.
///
/// Dispatch order for one call:
/// 1. void hooks, if any: all run, the call returns `null`, nothing else runs
/// 2. pre hooks with the arguments
/// 3. replace-hook chain (first registered is outermost) or the original
/// 4. post hooks with `(result, args)`
///
/// A failing callback is logged with its owner and never stops the others.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tether_core::{HostFn, HostRoot, Invocation, ModuleId, RuntimeError};
use tracing::{debug, info, warn};

use crate::policy::WrapPolicy;
use crate::types::{
    HookHandle, HookKind, Next, PostHook, PreHook, ReplaceHook, VoidHook, WrapState,
};

// ---------------------------------------------------------------------------
// Per-path tables
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Entry<F> {
    id: u64,
    owner: ModuleId,
    callback: F,
}

#[derive(Clone, Default)]
struct PathHooks {
    pre: Vec<Entry<PreHook>>,
    post: Vec<Entry<PostHook>>,
    void: Vec<Entry<VoidHook>>,
    replace: Vec<Entry<ReplaceHook>>,
}

impl PathHooks {
    fn len(&self) -> usize {
        self.pre.len() + self.post.len() + self.void.len() + self.replace.len()
    }

    fn remove_where(&mut self, mut pred: impl FnMut(u64, &ModuleId) -> bool) -> usize {
        let before = self.len();
        self.pre.retain(|e| !pred(e.id, &e.owner));
        self.post.retain(|e| !pred(e.id, &e.owner));
        self.void.retain(|e| !pred(e.id, &e.owner));
        self.replace.retain(|e| !pred(e.id, &e.owner));
        before - self.len()
    }

    fn handles(&self, path: &str) -> Vec<HookHandle> {
        fn collect<F>(path: &str, kind: HookKind, entries: &[Entry<F>], out: &mut Vec<HookHandle>) {
            out.extend(entries.iter().map(|e| HookHandle {
                id: e.id,
                path: path.to_string(),
                kind,
                owner: e.owner.clone(),
            }));
        }
        let mut out = Vec::new();
        collect(path, HookKind::Pre, &self.pre, &mut out);
        collect(path, HookKind::Post, &self.post, &mut out);
        collect(path, HookKind::Void, &self.void, &mut out);
        collect(path, HookKind::Replace, &self.replace, &mut out);
        out
    }
}

#[derive(Default)]
struct EngineInner {
    tables: RwLock<HashMap<String, PathHooks>>,
    originals: RwLock<HashMap<String, HostFn>>,
    states: Mutex<HashMap<String, WrapState>>,
    next_id: AtomicU64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Registry of pre/post/void/replace interceptors keyed by host path.
#[derive(Clone)]
pub struct HookEngine {
    host: Arc<HostRoot>,
    policy: WrapPolicy,
    inner: Arc<EngineInner>,
}

impl HookEngine {
    pub fn new(host: Arc<HostRoot>) -> Self {
        Self::with_policy(host, WrapPolicy::default())
    }

    pub fn with_policy(host: Arc<HostRoot>, policy: WrapPolicy) -> Self {
        Self {
            host,
            policy,
            inner: Arc::new(EngineInner::default()),
        }
    }

    pub fn host(&self) -> &Arc<HostRoot> {
        &self.host
    }

    pub fn policy(&self) -> &WrapPolicy {
        &self.policy
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn register_pre_hook<F>(&self, path: &str, owner: &ModuleId, callback: F) -> HookHandle
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: PreHook = Arc::new(callback);
        self.register(path, owner, HookKind::Pre, |hooks, entry| {
            hooks.pre.push(entry.with(callback))
        })
    }

    pub fn register_post_hook<F>(&self, path: &str, owner: &ModuleId, callback: F) -> HookHandle
    where
        F: Fn(&Value, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: PostHook = Arc::new(callback);
        self.register(path, owner, HookKind::Post, |hooks, entry| {
            hooks.post.push(entry.with(callback))
        })
    }

    pub fn register_void_hook<F>(&self, path: &str, owner: &ModuleId, callback: F) -> HookHandle
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: VoidHook = Arc::new(callback);
        self.register(path, owner, HookKind::Void, |hooks, entry| {
            hooks.void.push(entry.with(callback))
        })
    }

    pub fn register_replace_hook<F>(
        &self,
        path: &str,
        owner: &ModuleId,
        callback: F,
    ) -> HookHandle
    where
        F: Fn(&Invocation, &Next<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let callback: ReplaceHook = Arc::new(callback);
        self.register(path, owner, HookKind::Replace, |hooks, entry| {
            hooks.replace.push(entry.with(callback))
        })
    }

    fn register(
        &self,
        path: &str,
        owner: &ModuleId,
        kind: HookKind,
        push: impl FnOnce(&mut PathHooks, EntryStub),
    ) -> HookHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut tables = self.inner.tables.write();
            let hooks = tables.entry(path.to_string()).or_default();
            push(
                hooks,
                EntryStub {
                    id,
                    owner: owner.clone(),
                },
            );
        }
        debug!(path = %path, kind = %kind, owner = %owner, "Hook registered");
        self.ensure_wrapped(path);
        HookHandle {
            id,
            path: path.to_string(),
            kind,
            owner: owner.clone(),
        }
    }

    /// Remove one hook. The dispatcher stays installed; an empty path simply
    /// falls through to the original.
    pub fn unregister(&self, handle: &HookHandle) -> bool {
        let mut tables = self.inner.tables.write();
        let Some(hooks) = tables.get_mut(&handle.path) else {
            return false;
        };
        hooks.remove_where(|id, _| id == handle.id) > 0
    }

    /// Remove every hook owned by `owner`, returning how many were removed.
    pub fn unregister_all(&self, owner: &ModuleId) -> usize {
        let mut tables = self.inner.tables.write();
        let removed: usize = tables
            .values_mut()
            .map(|hooks| hooks.remove_where(|_, o| o == owner))
            .sum();
        if removed > 0 {
            debug!(owner = %owner, removed, "Hooks unregistered");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn wrap_state(&self, path: &str) -> WrapState {
        self.inner
            .states
            .lock()
            .get(path)
            .copied()
            .unwrap_or(WrapState::Unresolved)
    }

    pub fn hook_count(&self, path: &str) -> usize {
        self.inner
            .tables
            .read()
            .get(path)
            .map(PathHooks::len)
            .unwrap_or(0)
    }

    pub fn hooks_owned_by(&self, owner: &ModuleId) -> Vec<HookHandle> {
        self.inner
            .tables
            .read()
            .iter()
            .flat_map(|(path, hooks)| hooks.handles(path))
            .filter(|h| &h.owner == owner)
            .collect()
    }

    /// The captured original for `path`, if it has been wrapped.
    pub fn original(&self, path: &str) -> Option<HostFn> {
        self.inner.originals.read().get(path).cloned()
    }

    pub fn original_count(&self) -> usize {
        self.inner.originals.read().len()
    }

    // -----------------------------------------------------------------------
    // Wrapping
    // -----------------------------------------------------------------------

    /// Wrap `path` now if possible, otherwise start a retry task.
    fn ensure_wrapped(&self, path: &str) {
        if self.inner.try_wrap(&self.host, path) {
            return;
        }
        {
            let mut states = self.inner.states.lock();
            match states.get(path) {
                Some(WrapState::Pending | WrapState::Abandoned | WrapState::Wrapped) => return,
                _ => {
                    states.insert(path.to_string(), WrapState::Pending);
                }
            }
        }
        self.spawn_retry(path.to_string());
    }

    /// Retry wrapping every pending path immediately. Useful when no Tokio
    /// runtime was available to run the retry tasks.
    pub fn wrap_pending(&self) -> usize {
        let pending: Vec<String> = self
            .inner
            .states
            .lock()
            .iter()
            .filter(|(_, s)| **s == WrapState::Pending)
            .map(|(p, _)| p.clone())
            .collect();
        pending
            .iter()
            .filter(|p| self.inner.try_wrap(&self.host, p))
            .count()
    }

    fn spawn_retry(&self, path: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %path, "No async runtime; wrap stays pending until wrap_pending()");
            return;
        };
        let inner = self.inner.clone();
        let host = self.host.clone();
        let policy = self.policy.clone();

        runtime.spawn(async move {
            let mut definitions = host.subscribe_definitions();
            let mut attempt = 0;
            loop {
                if inner.try_wrap(&host, &path) {
                    return;
                }
                if !policy.should_retry(attempt) {
                    let err = RuntimeError::WrapTimeout {
                        path: path.clone(),
                        attempts: attempt,
                    };
                    warn!(path = %path, "{err}; hooks on this path will not fire");
                    inner.states.lock().insert(path, WrapState::Abandoned);
                    return;
                }
                let delay = policy.delay_for(attempt);
                tokio::select! {
                    // A host publish is a free re-check; it does not use up an attempt.
                    changed = definitions.changed() => {
                        if changed.is_err() {
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                    }
                    _ = tokio::time::sleep(delay) => {
                        attempt += 1;
                    }
                }
            }
        });
    }
}

/// Id and owner of an entry whose callback is about to be attached.
struct EntryStub {
    id: u64,
    owner: ModuleId,
}

impl EntryStub {
    fn with<F>(self, callback: F) -> Entry<F> {
        Entry {
            id: self.id,
            owner: self.owner,
            callback,
        }
    }
}

impl EngineInner {
    /// Install the dispatcher at `path`. Returns true if the path is (now) wrapped.
    fn try_wrap(self: &Arc<Self>, host: &HostRoot, path: &str) -> bool {
        let mut states = self.states.lock();
        if states.get(path) == Some(&WrapState::Wrapped) {
            return true;
        }
        let Some(found) = host.resolve(path) else {
            return false;
        };

        let original = self
            .originals
            .write()
            .entry(path.to_string())
            .or_insert(found)
            .clone();

        let weak = Arc::downgrade(self);
        let dispatch_path = path.to_string();
        let captured = original.clone();
        let dispatcher: HostFn = Arc::new(move |invocation: &Invocation| {
            match weak.upgrade() {
                Some(engine) => Ok(engine.dispatch(&dispatch_path, &captured, invocation)),
                None => captured(invocation),
            }
        });

        if host.replace(path, dispatcher).is_none() {
            return false;
        }
        states.insert(path.to_string(), WrapState::Wrapped);
        info!(path = %path, "Host function wrapped");
        true
    }

    fn dispatch(&self, path: &str, original: &HostFn, invocation: &Invocation) -> Value {
        let snapshot = self.tables.read().get(path).cloned();
        let Some(hooks) = snapshot else {
            return call_original(path, original, invocation);
        };
        let args = invocation.args.as_slice();

        if !hooks.void.is_empty() {
            for entry in &hooks.void {
                if let Err(e) = (entry.callback)(args) {
                    log_failure(path, HookKind::Void, &entry.owner, &e);
                }
            }
            return Value::Null;
        }

        for entry in &hooks.pre {
            if let Err(e) = (entry.callback)(args) {
                log_failure(path, HookKind::Pre, &entry.owner, &e);
            }
        }

        let result = run_chain(path, &hooks.replace, original, invocation);

        for entry in &hooks.post {
            if let Err(e) = (entry.callback)(&result, args) {
                log_failure(path, HookKind::Post, &entry.owner, &e);
            }
        }

        result
    }
}

/// Run `chain[0]` with `next` bound to the rest of the chain around the
/// original. Equivalent to folding the hooks in reverse registration order.
fn run_chain(
    path: &str,
    chain: &[Entry<ReplaceHook>],
    original: &HostFn,
    invocation: &Invocation,
) -> Value {
    let Some((outer, rest)) = chain.split_first() else {
        return call_original(path, original, invocation);
    };
    let link = |inv: &Invocation| run_chain(path, rest, original, inv);
    let next = Next::new(&link);
    match (outer.callback)(invocation, &next) {
        Ok(value) => value,
        Err(e) => {
            log_failure(path, HookKind::Replace, &outer.owner, &e);
            // The rest of the chain runs at most once per invocation.
            match next.take_last() {
                Some(value) => value,
                None => next.call(invocation),
            }
        }
    }
}

fn call_original(path: &str, original: &HostFn, invocation: &Invocation) -> Value {
    match original(invocation) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path, error = %e, "Original host function failed");
            Value::Null
        }
    }
}

fn log_failure(path: &str, kind: HookKind, owner: &ModuleId, error: &anyhow::Error) {
    let err = RuntimeError::HookDispatch {
        path: path.to_string(),
        owner: owner.to_string(),
        message: error.to_string(),
    };
    warn!(kind = %kind, "{err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tether_core::{host_fn, BRIDGE_RECEIVE_PATH};

    fn owner(id: &str) -> ModuleId {
        ModuleId::new(id)
    }

    /// Host with `svc.add` summing its integer arguments and counting calls.
    fn host_with_add() -> (Arc<HostRoot>, Arc<AtomicUsize>) {
        let host = Arc::new(HostRoot::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        host.define(
            "svc.add",
            host_fn(move |inv| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(json!(inv.args.iter().filter_map(Value::as_i64).sum::<i64>()))
            }),
        )
        .unwrap();
        (host, calls)
    }

    fn fast_policy() -> WrapPolicy {
        WrapPolicy {
            base_delay_ms: 5,
            backoff_factor: 1.5,
            max_delay_ms: 20,
            max_attempts: 3,
        }
    }

    #[test]
    fn wraps_once_and_stores_single_original() {
        let (host, _) = host_with_add();
        let engine = HookEngine::new(host.clone());
        engine.register_pre_hook("svc.add", &owner("a"), |_| Ok(()));
        engine.register_post_hook("svc.add", &owner("b"), |_, _| Ok(()));
        engine.register_pre_hook("svc.add", &owner("c"), |_| Ok(()));

        assert_eq!(engine.wrap_state("svc.add"), WrapState::Wrapped);
        assert_eq!(engine.original_count(), 1);
        assert_eq!(engine.hook_count("svc.add"), 3);
        assert_eq!(
            host.call("svc.add", Value::Null, vec![json!(2), json!(3)]).unwrap(),
            json!(5)
        );
    }

    #[test]
    fn void_hook_suppresses_original_and_pre_hooks() {
        let (host, calls) = host_with_add();
        let engine = HookEngine::new(host.clone());
        let void_hits = Arc::new(AtomicUsize::new(0));
        let pre_hits = Arc::new(AtomicUsize::new(0));

        let v = void_hits.clone();
        engine.register_void_hook("svc.add", &owner("m"), move |_| {
            v.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let p = pre_hits.clone();
        engine.register_pre_hook("svc.add", &owner("m"), move |_| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let out = host.call("svc.add", Value::Null, vec![json!(1)]).unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(void_hits.load(Ordering::SeqCst), 1);
        assert_eq!(pre_hits.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn replace_hooks_nest_in_registration_order() {
        let (host, _) = host_with_add();
        let engine = HookEngine::new(host.clone());
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        engine.register_replace_hook("svc.add", &owner("r1"), move |inv, next| {
            o.lock().push("r1");
            let inner = next.call(inv);
            Ok(json!(inner.as_i64().unwrap_or(0) * 10))
        });
        let o = order.clone();
        engine.register_replace_hook("svc.add", &owner("r2"), move |inv, next| {
            o.lock().push("r2");
            let inner = next.call(inv);
            Ok(json!(inner.as_i64().unwrap_or(0) + 1))
        });

        let out = host.call("svc.add", Value::Null, vec![json!(2), json!(3)]).unwrap();
        // r1(r2(original)) = (5 + 1) * 10
        assert_eq!(out, json!(60));
        assert_eq!(*order.lock(), vec!["r1", "r2"]);
    }

    #[test]
    fn replace_hook_may_skip_next() {
        let (host, calls) = host_with_add();
        let engine = HookEngine::new(host.clone());
        engine.register_replace_hook("svc.add", &owner("r"), |_, _| Ok(json!("cached")));
        assert_eq!(
            host.call("svc.add", Value::Null, vec![]).unwrap(),
            json!("cached")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn replace_hook_failing_after_next_keeps_its_result() {
        let (host, calls) = host_with_add();
        let engine = HookEngine::new(host.clone());
        engine.register_replace_hook("svc.add", &owner("r"), |inv, next| {
            next.call(inv);
            anyhow::bail!("failed after next")
        });

        let out = host.call("svc.add", Value::Null, vec![json!(2), json!(2)]).unwrap();
        assert_eq!(out, json!(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bridge_receive_can_be_observed_and_suppressed() {
        let host = Arc::new(HostRoot::new());
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let d = delivered.clone();
        host.define(
            BRIDGE_RECEIVE_PATH,
            host_fn(move |inv| {
                d.lock().push(inv.args.clone());
                Ok(Value::Null)
            }),
        )
        .unwrap();
        let engine = HookEngine::new(host.clone());

        let observed = Arc::new(Mutex::new(Vec::new()));
        let o = observed.clone();
        engine.register_pre_hook(BRIDGE_RECEIVE_PATH, &owner("spy"), move |args| {
            o.lock().push(args.to_vec());
            Ok(())
        });
        let inbound = vec![json!("presence"), json!("{\"online\":true}")];
        host.call(BRIDGE_RECEIVE_PATH, Value::Null, inbound.clone()).unwrap();
        assert_eq!(*observed.lock(), vec![inbound.clone()]);
        assert_eq!(delivered.lock().len(), 1);

        let mute = engine.register_void_hook(BRIDGE_RECEIVE_PATH, &owner("mute"), |_| Ok(()));
        host.call(BRIDGE_RECEIVE_PATH, Value::Null, inbound.clone()).unwrap();
        assert_eq!(delivered.lock().len(), 1);

        assert!(engine.unregister(&mute));
        host.call(BRIDGE_RECEIVE_PATH, Value::Null, inbound).unwrap();
        assert_eq!(delivered.lock().len(), 2);
        assert_eq!(observed.lock().len(), 2);
    }

    #[test]
    fn failing_hooks_do_not_abort_dispatch() {
        let (host, calls) = host_with_add();
        let engine = HookEngine::new(host.clone());
        let seen = Arc::new(Mutex::new(None));

        engine.register_pre_hook("svc.add", &owner("bad"), |_| anyhow::bail!("pre failed"));
        engine.register_replace_hook("svc.add", &owner("bad"), |_, _| {
            anyhow::bail!("replace failed")
        });
        engine.register_post_hook("svc.add", &owner("bad"), |_, _| anyhow::bail!("post failed"));
        let s = seen.clone();
        engine.register_post_hook("svc.add", &owner("good"), move |result, args| {
            *s.lock() = Some((result.clone(), args.len()));
            Ok(())
        });

        let out = host.call("svc.add", Value::Null, vec![json!(4), json!(4)]).unwrap();
        assert_eq!(out, json!(8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), Some((json!(8), 2)));
    }

    #[test]
    fn pre_hooks_see_arguments_in_order() {
        let (host, _) = host_with_add();
        let engine = HookEngine::new(host.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let l = log.clone();
            engine.register_pre_hook("svc.add", &owner(name), move |args| {
                l.lock().push(format!("{name}:{}", args.len()));
                Ok(())
            });
        }
        host.call("svc.add", Value::Null, vec![json!(1), json!(1)]).unwrap();
        assert_eq!(*log.lock(), vec!["first:2", "second:2"]);
    }

    #[test]
    fn unregister_all_removes_only_owner() {
        let (host, _) = host_with_add();
        let engine = HookEngine::new(host.clone());
        engine.register_void_hook("svc.add", &owner("gone"), |_| Ok(()));
        engine.register_pre_hook("svc.add", &owner("gone"), |_| Ok(()));
        let kept = engine.register_pre_hook("svc.add", &owner("kept"), |_| Ok(()));

        assert_eq!(engine.unregister_all(&owner("gone")), 2);
        assert_eq!(engine.hook_count("svc.add"), 1);
        assert_eq!(engine.hooks_owned_by(&owner("kept")), vec![kept.clone()]);
        // Void hook is gone, so the original runs again.
        assert_eq!(
            host.call("svc.add", Value::Null, vec![json!(1), json!(2)]).unwrap(),
            json!(3)
        );
        assert!(engine.unregister(&kept));
        assert!(!engine.unregister(&kept));
    }

    #[tokio::test]
    async fn wraps_when_target_is_defined_later() {
        let host = Arc::new(HostRoot::new());
        let engine = HookEngine::with_policy(host.clone(), fast_policy());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        engine.register_pre_hook("late.fn", &owner("m"), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(engine.wrap_state("late.fn"), WrapState::Pending);

        host.define("late.fn", host_fn(|_| Ok(json!("ok")))).unwrap();
        for _ in 0..50 {
            if engine.wrap_state("late.fn") == WrapState::Wrapped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(engine.wrap_state("late.fn"), WrapState::Wrapped);
        assert_eq!(host.call("late.fn", Value::Null, vec![]).unwrap(), json!("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandons_after_attempt_ceiling() {
        let host = Arc::new(HostRoot::new());
        let engine = HookEngine::with_policy(host.clone(), fast_policy());
        engine.register_pre_hook("never.there", &owner("m"), |_| Ok(()));

        tokio::time::sleep(engine.policy().total_budget() + Duration::from_millis(100)).await;
        assert_eq!(engine.wrap_state("never.there"), WrapState::Abandoned);

        // Defining it afterwards does not revive the hooks.
        host.define("never.there", host_fn(|_| Ok(json!(1)))).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.wrap_state("never.there"), WrapState::Abandoned);
        assert!(engine.original("never.there").is_none());
    }

    #[test]
    fn wrap_pending_without_runtime() {
        let host = Arc::new(HostRoot::new());
        let engine = HookEngine::new(host.clone());
        engine.register_pre_hook("no.rt", &owner("m"), |_| Ok(()));
        assert_eq!(engine.wrap_state("no.rt"), WrapState::Pending);
        host.define("no.rt", host_fn(|_| Ok(Value::Null))).unwrap();
        assert_eq!(engine.wrap_pending(), 1);
        assert_eq!(engine.wrap_state("no.rt"), WrapState::Wrapped);
    }
}
