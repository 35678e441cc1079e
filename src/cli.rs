//! CLI for this application
//!
use std::path::PathBuf;

use crate::network::{Address, NetworkId};
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Status API listen address
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("VIRTNET_LISTEN_ADDRESS"),
        help = "IP Address for the status API to listen on"
    )]
    pub listen_address: String,

    // Status API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("VIRTNET_HTTP_LISTEN_PORT"),
        help = "Port to bind the status API to"
    )]
    pub listen_port: u16,

    // Where per-network state is saved
    #[clap(
        long,
        default_value = "./virtnet-state",
        env("VIRTNET_STATE_DIR"),
        help = "Directory holding saved network state"
    )]
    pub state_dir: PathBuf,

    // This node's 40-bit address
    #[clap(
        long,
        env("VIRTNET_LOCAL_ADDRESS"),
        help = "This node's address as 10 hex digits"
    )]
    pub local_address: Address,

    // Networks to join
    #[clap(
        long = "network",
        env("VIRTNET_NETWORKS"),
        value_delimiter = ',',
        help = "Network ids (16 hex digits) to join; repeat or comma-separate"
    )]
    pub networks: Vec<NetworkId>,

    // Housekeeping interval
    #[clap(
        long,
        default_value = settings::DEFAULT_CLEAN_INTERVAL_SECS,
        env("VIRTNET_CLEAN_INTERVAL_SECONDS"),
        help = "Seconds between housekeeping passes"
    )]
    pub clean_interval_secs: u64,

    // Certificate push throttle
    #[clap(
        long,
        default_value_t = settings::DEFAULT_CERTIFICATE_PUSH_INTERVAL_MS,
        env("VIRTNET_CERTIFICATE_PUSH_INTERVAL_MS"),
        help = "Minimum milliseconds between certificate pushes to one peer"
    )]
    pub certificate_push_interval_ms: u64,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        let mut network = settings::NetworkSettings::new(self.local_address);
        network.certificate_push_interval_ms = self.certificate_push_interval_ms;
        settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            state_dir: self.state_dir,
            networks: self.networks,
            clean_interval_secs: self.clean_interval_secs,
            network,
        }
    }
}
