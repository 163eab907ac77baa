//! Native bridge: the host's call-style message channel.
//!
//! Outbound messages are `(message_type, payload)` string pairs. Inbound
//! traffic is intercepted by hooking the host's receive function (see
//! [`BRIDGE_RECEIVE_PATH`]) rather than through this trait.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Conventional host path of the bridge's inbound handler.
pub const BRIDGE_RECEIVE_PATH: &str = "bridge.receive";

/// Outbound side of the host bridge.
pub trait NativeBridge: Send + Sync {
    fn send(&self, message_type: &str, payload: &str) -> anyhow::Result<()>;
}

/// A message captured by [`ChannelBridge`] or [`RecordingBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
    pub message_type: String,
    pub payload: String,
}

/// Bridge that drops everything. Used when the host has no native side.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl NativeBridge for NullBridge {
    fn send(&self, message_type: &str, _payload: &str) -> anyhow::Result<()> {
        debug!(message_type = %message_type, "Bridge message dropped (no native side)");
        Ok(())
    }
}

/// Bridge that forwards messages into a Tokio channel for the host to drain.
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NativeBridge for ChannelBridge {
    fn send(&self, message_type: &str, payload: &str) -> anyhow::Result<()> {
        self.tx
            .send(BridgeMessage {
                message_type: message_type.to_string(),
                payload: payload.to_string(),
            })
            .map_err(|_| anyhow::anyhow!("native bridge channel closed"))
    }
}

/// Bridge that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    messages: Mutex<Vec<BridgeMessage>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<BridgeMessage> {
        self.messages.lock().clone()
    }
}

impl NativeBridge for RecordingBridge {
    fn send(&self, message_type: &str, payload: &str) -> anyhow::Result<()> {
        self.messages.lock().push(BridgeMessage {
            message_type: message_type.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
