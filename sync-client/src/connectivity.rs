//! Network availability, the only job constraint.

use tokio::sync::watch;

/// Source of the "network connected" constraint.
pub trait Connectivity: Send + Sync {
    /// Whether the device currently has a network connection.
    fn is_online(&self) -> bool;

    /// Receiver that changes whenever connectivity flips, if the source can
    /// report changes.
    fn changes(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

/// Connectivity that never changes.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

impl Connectivity for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// Connectivity toggled by the host (platform callbacks, CLI flag, tests).
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Monitor that starts online.
    pub fn always_online() -> Self {
        Self::new(true)
    }

    /// Report a connectivity change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            tracing::info!("Network {}", if online { "connected" } else { "disconnected" });
        }
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn changes(&self) -> Option<watch::Receiver<bool>> {
        Some(self.subscribe())
    }
}
