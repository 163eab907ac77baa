//! Host function tree.
//!
//! The host exposes its callable operations as leaves of a namespace tree
//! addressed by dotted paths (`"service.method"`). Extensions never patch
//! host objects directly: the hook engine swaps a leaf for a dispatcher and
//! keeps the original. Every `define` bumps a publication counter so that
//! anyone waiting for a path can re-check without polling.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// A single call into a host function: the receiver it is bound to plus
/// positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub receiver: Value,
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(receiver: Value, args: Vec<Value>) -> Self {
        Self { receiver, args }
    }

    pub fn with_args(args: Vec<Value>) -> Self {
        Self {
            receiver: Value::Null,
            args,
        }
    }
}

/// A callable host operation.
pub type HostFn = Arc<dyn Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync>;

/// Wrap a closure as a [`HostFn`].
pub fn host_fn<F>(f: F) -> HostFn
where
    F: Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

enum Node {
    Namespace(BTreeMap<String, Node>),
    Function(HostFn),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Namespace(children) => f.debug_map().entries(children.iter()).finish(),
            Node::Function(_) => f.write_str("<fn>"),
        }
    }
}

/// Root of the host's callable surface.
pub struct HostRoot {
    root: RwLock<BTreeMap<String, Node>>,
    published: watch::Sender<u64>,
}

impl HostRoot {
    pub fn new() -> Self {
        let (published, _) = watch::channel(0);
        Self {
            root: RwLock::new(BTreeMap::new()),
            published,
        }
    }

    /// Declare (or redefine) a function at `path`, creating any missing
    /// intermediate namespaces.
    pub fn define(&self, path: &str, f: HostFn) -> RuntimeResult<()> {
        let segments = split_path(path)?;
        {
            let mut root = self.root.write();
            let (leaf, parents) = segments.split_last().ok_or_else(|| {
                RuntimeError::Host(format!("empty path '{path}'"))
            })?;
            let mut current = &mut *root;
            for seg in parents {
                let node = current
                    .entry(seg.to_string())
                    .or_insert_with(|| Node::Namespace(BTreeMap::new()));
                current = match node {
                    Node::Namespace(children) => children,
                    Node::Function(_) => {
                        return Err(RuntimeError::Host(format!(
                            "'{seg}' in '{path}' is a function, not a namespace"
                        )));
                    }
                };
            }
            if let Some(Node::Namespace(_)) = current.get(*leaf) {
                return Err(RuntimeError::Host(format!(
                    "'{path}' is a namespace, not a function"
                )));
            }
            current.insert(leaf.to_string(), Node::Function(f));
        }
        debug!(path = %path, "Host function defined");
        self.published.send_modify(|n| *n += 1);
        Ok(())
    }

    /// Walk the dotted segments from the root. `None` if any segment is missing.
    pub fn resolve(&self, path: &str) -> Option<HostFn> {
        let segments = split_path(path).ok()?;
        let root = self.root.read();
        let (leaf, parents) = segments.split_last()?;
        let mut current = &*root;
        for seg in parents {
            match current.get(*seg)? {
                Node::Namespace(children) => current = children,
                Node::Function(_) => return None,
            }
        }
        match current.get(*leaf)? {
            Node::Function(f) => Some(f.clone()),
            Node::Namespace(_) => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Swap the function at an existing `path`, returning the previous one.
    /// Does not publish: replacing a leaf is not a new definition.
    pub fn replace(&self, path: &str, f: HostFn) -> Option<HostFn> {
        let segments = split_path(path).ok()?;
        let mut root = self.root.write();
        let (leaf, parents) = segments.split_last()?;
        let mut current = &mut *root;
        for seg in parents {
            match current.get_mut(*seg)? {
                Node::Namespace(children) => current = children,
                Node::Function(_) => return None,
            }
        }
        match current.get_mut(*leaf)? {
            Node::Function(existing) => Some(std::mem::replace(existing, f)),
            Node::Namespace(_) => None,
        }
    }

    /// Invoke whatever currently sits at `path` (the original function or a
    /// hook dispatcher). The tree lock is released before the call.
    pub fn call(&self, path: &str, receiver: Value, args: Vec<Value>) -> RuntimeResult<Value> {
        let f = self
            .resolve(path)
            .ok_or_else(|| RuntimeError::NotFound(format!("host function '{path}'")))?;
        f(&Invocation::new(receiver, args)).map_err(RuntimeError::from)
    }

    /// Receiver that changes every time a function is defined.
    pub fn subscribe_definitions(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }

    /// All function paths currently defined, in sorted order.
    pub fn paths(&self) -> Vec<String> {
        fn walk(prefix: &str, nodes: &BTreeMap<String, Node>, out: &mut Vec<String>) {
            for (name, node) in nodes {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match node {
                    Node::Namespace(children) => walk(&path, children, out),
                    Node::Function(_) => out.push(path),
                }
            }
        }
        let mut out = Vec::new();
        walk("", &self.root.read(), &mut out);
        out
    }
}

impl Default for HostRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRoot")
            .field("root", &*self.root.read())
            .finish()
    }
}

fn split_path(path: &str) -> RuntimeResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(RuntimeError::Host(format!("malformed path '{path}'")));
    }
    Ok(segments)
}
