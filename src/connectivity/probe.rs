use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::info;

use crate::connectivity::ConnectivityGate;

/// Reachability probe settings: a TCP connect to `target` counts as online.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// host:port to connect to (default: 1.1.1.1:443)
    pub target: String,

    /// Seconds between probes (default: 30)
    pub interval_secs: u64,

    /// Connect timeout in milliseconds (default: 1500)
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: "1.1.1.1:443".to_string(),
            interval_secs: 30,
            timeout_ms: 1500,
        }
    }
}

pub async fn probe_once(target: &str, limit: Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)))
}

/// Probe periodically and feed the result into `gate` until the task is aborted.
pub fn spawn_probe(gate: Arc<ConnectivityGate>, config: ProbeConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let limit = Duration::from_millis(config.timeout_ms);
        let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let online = probe_once(&config.target, limit).await;
            if gate.set_connected(online) {
                info!(
                    "Connectivity changed: {}",
                    if online { "online" } else { "offline" }
                );
            }
        }
    })
}
