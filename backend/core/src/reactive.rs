//! Host reactive containers and shared-subscription pooling.
//!
//! A reactive container is any piece of host state that can notify on
//! change. Many modules tend to watch the same few containers, so the
//! [`SubscriptionPool`] multiplexes them onto one underlying subscription
//! per logical kind (`"location"`, `"user"`, ...).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

/// Callback invoked with the container's new state.
pub type ChangeCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Reverses a subscription. May fail; callers log and carry on.
pub type Unsubscribe = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A piece of host state that notifies subscribers on change.
pub trait ReactiveContainer: Send + Sync {
    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe;

    /// Current state of the container.
    fn snapshot(&self) -> Value;
}

// ---------------------------------------------------------------------------
// ReactiveValue
// ---------------------------------------------------------------------------

struct ValueInner {
    value: RwLock<Value>,
    subscribers: Mutex<Vec<(u64, ChangeCallback)>>,
    next_id: AtomicU64,
}

/// A single JSON value that notifies subscribers whenever it is set.
#[derive(Clone)]
pub struct ReactiveValue {
    inner: Arc<ValueInner>,
}

impl ReactiveValue {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(ValueInner {
                value: RwLock::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn get(&self) -> Value {
        self.inner.value.read().clone()
    }

    pub fn set(&self, value: Value) {
        *self.inner.value.write() = value.clone();
        let subscribers: Vec<ChangeCallback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in subscribers {
            cb(&value);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl ReactiveContainer for ReactiveValue {
    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, callback));
        let inner = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.lock().retain(|(sid, _)| *sid != id);
            }
            Ok(())
        })
    }

    fn snapshot(&self) -> Value {
        self.get()
    }
}

// ---------------------------------------------------------------------------
// SubscriptionPool
// ---------------------------------------------------------------------------

type Wrappers = Arc<Mutex<Vec<(u64, ChangeCallback)>>>;

struct Pool {
    wrappers: Wrappers,
    underlying: Option<Unsubscribe>,
}

#[derive(Default)]
struct PoolInner {
    pools: Mutex<HashMap<String, Pool>>,
    next_id: AtomicU64,
}

/// Shares one underlying container subscription per logical kind.
///
/// A notification cycle iterates over the wrappers present when it began;
/// a wrapper removed mid-cycle may still see that cycle. The underlying
/// subscription is released as soon as the last wrapper unsubscribes.
#[derive(Clone, Default)]
pub struct SubscriptionPool {
    inner: Arc<PoolInner>,
}

impl SubscriptionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `callback` to the shared subscription for `kind`, creating the
    /// underlying subscription on `container` if this is the first wrapper.
    pub fn subscribe(
        &self,
        kind: &str,
        container: &dyn ReactiveContainer,
        callback: ChangeCallback,
    ) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let needs_underlying = {
            let mut pools = self.inner.pools.lock();
            let pool = pools.entry(kind.to_string()).or_insert_with(|| Pool {
                wrappers: Arc::new(Mutex::new(Vec::new())),
                underlying: None,
            });
            pool.wrappers.lock().push((id, callback));
            pool.underlying.is_none().then(|| pool.wrappers.clone())
        };

        if let Some(wrappers) = needs_underlying {
            let fan_out: ChangeCallback = Arc::new(move |value: &Value| {
                let current: Vec<ChangeCallback> =
                    wrappers.lock().iter().map(|(_, cb)| cb.clone()).collect();
                for cb in current {
                    cb(value);
                }
            });
            let underlying = container.subscribe(fan_out);
            let orphan = {
                let mut pools = self.inner.pools.lock();
                match pools.get_mut(kind) {
                    Some(pool) if pool.underlying.is_none() => {
                        pool.underlying = Some(underlying);
                        debug!(kind = %kind, "Shared host subscription opened");
                        None
                    }
                    // Every wrapper left before the subscription was stored.
                    _ => Some(underlying),
                }
            };
            if let Some(orphan) = orphan {
                if let Err(e) = orphan() {
                    warn!(kind = %kind, error = %e, "Releasing orphaned host subscription failed");
                }
            }
        }

        let inner = Arc::downgrade(&self.inner);
        let kind = kind.to_string();
        Box::new(move || {
            let Some(inner) = inner.upgrade() else {
                return Ok(());
            };
            let released = {
                let mut pools = inner.pools.lock();
                let now_empty = match pools.get(&kind) {
                    Some(pool) => {
                        let mut wrappers = pool.wrappers.lock();
                        wrappers.retain(|(wid, _)| *wid != id);
                        wrappers.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    pools.remove(&kind).and_then(|p| p.underlying)
                } else {
                    None
                }
            };
            if let Some(unsubscribe) = released {
                debug!(kind = %kind, "Last wrapper left; releasing shared host subscription");
                unsubscribe()?;
            }
            Ok(())
        })
    }

    /// Number of wrapping callbacks currently attached to `kind`.
    pub fn wrapper_count(&self, kind: &str) -> usize {
        self.inner
            .pools
            .lock()
            .get(kind)
            .map(|p| p.wrappers.lock().len())
            .unwrap_or(0)
    }

    pub fn is_active(&self, kind: &str) -> bool {
        self.inner
            .pools
            .lock()
            .get(kind)
            .map(|p| p.underlying.is_some())
            .unwrap_or(false)
    }
}
