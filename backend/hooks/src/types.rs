/// Hook kinds, callback signatures, and registration handles.
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{Invocation, ModuleId};

// ---------------------------------------------------------------------------
// Hook kinds
// ---------------------------------------------------------------------------

/// How a hook interacts with the wrapped host function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Observe the arguments before the call.
    Pre,
    /// Observe the result and arguments after the call.
    Post,
    /// Suppress the call entirely. The wrapped function returns `null`.
    Void,
    /// Substitute the call. Chainable: each hook decides whether to call `next`.
    Replace,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pre => "pre",
            Self::Post => "post",
            Self::Void => "void",
            Self::Replace => "replace",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Callback signatures
// ---------------------------------------------------------------------------

pub type PreHook = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;
pub type PostHook = Arc<dyn Fn(&Value, &[Value]) -> anyhow::Result<()> + Send + Sync>;
pub type VoidHook = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;
pub type ReplaceHook =
    Arc<dyn Fn(&Invocation, &Next<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// The next link of a replace-hook chain: the remaining replace hooks
/// wrapped around the original function.
pub struct Next<'a> {
    link: &'a dyn Fn(&Invocation) -> Value,
    last: RefCell<Option<Value>>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(link: &'a dyn Fn(&Invocation) -> Value) -> Self {
        Self {
            link,
            last: RefCell::new(None),
        }
    }

    /// Continue down the chain with `invocation`.
    pub fn call(&self, invocation: &Invocation) -> Value {
        let value = (self.link)(invocation);
        *self.last.borrow_mut() = Some(value.clone());
        value
    }

    /// Result of the most recent [`Next::call`], if the hook made one.
    pub(crate) fn take_last(&self) -> Option<Value> {
        self.last.borrow_mut().take()
    }
}

// ---------------------------------------------------------------------------
// Registration handle
// ---------------------------------------------------------------------------

/// Identifies one registered hook. Returned from every `register_*` call and
/// accepted by [`crate::HookEngine::unregister`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookHandle {
    pub id: u64,
    pub path: String,
    pub kind: HookKind,
    pub owner: ModuleId,
}

// ---------------------------------------------------------------------------
// Wrap state
// ---------------------------------------------------------------------------

/// Progress of wrapping a host path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapState {
    /// No hook has asked for this path yet.
    Unresolved,
    /// The path was missing; a retry task is waiting for it.
    Pending,
    /// The dispatcher is installed and the original captured.
    Wrapped,
    /// Retries were exhausted. Hooks on this path stay dormant.
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(HookKind::Replace.to_string(), "replace");
        assert_eq!(
            serde_json::to_string(&WrapState::Abandoned).unwrap(),
            "\"abandoned\""
        );
    }
}
