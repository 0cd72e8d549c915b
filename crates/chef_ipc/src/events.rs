//! Host -> surface push notifications
//!
//! Delivery is at-most-once and unacknowledged. An event emitted while no
//! listener is subscribed is dropped; a listener subscribed later never sees
//! it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Bound on events held for a slow listener before it starts skipping
pub const EVENT_CAPACITY: usize = 32;

/// Push notification toward the rendering surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum BridgeEvent {
    /// Menu intent, e.g. `new-recipe`
    MenuAction(String),
    ImportFile(String),
    ExportFile(String),
}

impl BridgeEvent {
    /// Channel name the surface listens on
    pub fn channel(&self) -> &'static str {
        match self {
            Self::MenuAction(_) => "menu-action",
            Self::ImportFile(_) => "import-file",
            Self::ExportFile(_) => "export-file",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::MenuAction(value) | Self::ImportFile(value) | Self::ExportFile(value) => value,
        }
    }
}

/// What happened to an emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to this many listeners
    Delivered(usize),
    /// Nobody was listening
    Dropped,
}

#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: BridgeEvent) -> Delivery {
        let channel = event.channel();
        match self.tx.send(event) {
            Ok(listeners) => {
                debug!(channel, listeners, "event emitted");
                Delivery::Delivered(listeners)
            }
            Err(_) => {
                debug!(channel, "no listener, event dropped");
                Delivery::Dropped
            }
        }
    }

    /// Listen for events emitted from now on
    pub fn subscribe(&self) -> EventListener {
        EventListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct EventListener {
    rx: broadcast::Receiver<BridgeEvent>,
}

impl EventListener {
    /// Next event in emission order; `None` once every emitter is gone
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagging, events lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagging, events lost");
                }
                Err(_) => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
