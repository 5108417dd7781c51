//! Online/offline state as seen by the sync coordinator.
//!
//! The host owns the actual monitoring and pushes state into a
//! [`ConnectivityGate`]; the coordinator only reads the current value and
//! watches for transitions.

mod probe;

pub use probe::{probe_once, spawn_probe, ProbeConfig};

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

pub trait ConnectivityMonitor: Send + Sync {
    fn is_connected(&self) -> bool;
    fn connection_type(&self) -> ConnectionType;
    /// A receiver that wakes on every connectivity transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

pub struct ConnectivityGate {
    state: watch::Sender<bool>,
    kind: Mutex<ConnectionType>,
}

impl ConnectivityGate {
    pub fn new(connected: bool) -> Self {
        let (state, _) = watch::channel(connected);
        Self {
            state,
            kind: Mutex::new(ConnectionType::Unknown),
        }
    }

    /// Record the current state. Returns true when this was a transition.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.state.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        })
    }

    pub fn set_connection_type(&self, kind: ConnectionType) {
        if let Ok(mut current) = self.kind.lock() {
            *current = kind;
        }
    }
}

impl ConnectivityMonitor for ConnectivityGate {
    fn is_connected(&self) -> bool {
        *self.state.borrow()
    }

    fn connection_type(&self) -> ConnectionType {
        self.kind.lock().map(|k| *k).unwrap_or_default()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
