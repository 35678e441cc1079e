//! virtnet settings
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::network::{Address, NetworkId};

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 9994;
pub const DEFAULT_PORT_HTTP: &str = "9994";

/// Minimum time between unforced certificate pushes to the same peer
pub const DEFAULT_CERTIFICATE_PUSH_INTERVAL_MS: u64 = 20_000;
/// How long a bridged multicast group survives without being seen again
pub const DEFAULT_BRIDGED_MULTICAST_RETENTION_MS: u64 = 600_000;
pub const DEFAULT_CLEAN_INTERVAL_SECS: &str = "60";

/// Tunables shared by every network a node joins
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkSettings {
    /// This node's address
    pub local_address: Address,
    pub certificate_push_interval_ms: u64,
    pub bridged_multicast_retention_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            local_address: Address::default(),
            certificate_push_interval_ms: DEFAULT_CERTIFICATE_PUSH_INTERVAL_MS,
            bridged_multicast_retention_ms: DEFAULT_BRIDGED_MULTICAST_RETENTION_MS,
        }
    }
}

impl NetworkSettings {
    pub fn new(local_address: Address) -> Self {
        Self {
            local_address,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Status API listen address
    pub listen_address: String,

    // Status API listen port
    pub listen_port: u16,

    // Directory for persisted network state
    pub state_dir: PathBuf,

    // Networks to join at startup
    pub networks: Vec<NetworkId>,

    // Seconds between housekeeping passes
    pub clean_interval_secs: u64,

    pub network: NetworkSettings,
}

impl Settings {
    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs.max(1))
    }

    pub fn socket_address(&self) -> Result<SocketAddr, String> {
        let ip = self
            .listen_address
            .parse::<std::net::IpAddr>()
            .map_err(|e| format!("Invalid listen address '{}': {}", self.listen_address, e))?;
        Ok(SocketAddr::from((ip, self.listen_port)))
    }
}
