pub mod bridge;
pub mod error;
pub mod host;
pub mod reactive;
pub mod target;
pub mod types;

pub use bridge::{
    BridgeMessage, ChannelBridge, NativeBridge, NullBridge, RecordingBridge, BRIDGE_RECEIVE_PATH,
};
pub use error::{RuntimeError, RuntimeResult};
pub use host::{host_fn, HostFn, HostRoot, Invocation};
pub use reactive::{ChangeCallback, ReactiveContainer, ReactiveValue, SubscriptionPool, Unsubscribe};
pub use target::{EventTarget, HostTarget, ListenerOptions, TargetHandler};
pub use types::{ModuleId, ModuleMetadata};
