pub mod engine;
pub mod policy;
pub mod types;

pub use engine::HookEngine;
pub use policy::WrapPolicy;
pub use types::{HookHandle, HookKind, Next, PostHook, PreHook, ReplaceHook, VoidHook, WrapState};
