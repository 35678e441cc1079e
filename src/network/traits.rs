//! Collaborator traits for a virtual network
//!
//! The network controller decides who may talk and how fast; everything that
//! touches the OS, the wire or the disk goes through these.
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Address, Mac, MulticastGroup, NetworkId};
use crate::certificate::MembershipCertificate;
use crate::error::{Result, TapError};

/// A provisioned virtual Ethernet device
pub trait Tap: Send + Sync {
    /// Inject a frame towards the host
    fn put(&self, from: Mac, to: Mac, ether_type: u16, data: &[u8]);

    /// IP addresses currently assigned to the device
    fn ips(&self) -> BTreeSet<IpAddr>;

    /// OS-level device name, e.g. `zt0`
    fn device_name(&self) -> String;

    /// Bring the device's link up or down
    fn set_enabled(&self, enabled: bool);

    /// Multicast groups the host has subscribed to on this device
    fn scan_multicast_groups(&self) -> BTreeSet<MulticastGroup>;
}

/// Creates tap devices. May block for a long time; it is only ever called
/// from a network's setup worker.
pub trait TapProvisioner: Send + Sync {
    fn create(
        &self,
        network_id: NetworkId,
        mac: Mac,
    ) -> std::result::Result<Arc<dyn Tap>, TapError>;
}

/// Talks to network controllers and peers
///
/// Both calls are fire-and-forget from the network's point of view: answers
/// to `request_config` come back later through `Network::set_configuration`,
/// `set_access_denied` or `set_not_found`.
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Ask `controller` for our configuration on `network_id`
    async fn request_config(&self, network_id: NetworkId, controller: Address) -> Result<()>;

    /// Send our membership certificate to `peer`
    async fn push_certificate(
        &self,
        network_id: NetworkId,
        peer: Address,
        certificate: MembershipCertificate,
    ) -> Result<()>;
}

/// Durable storage of per-network state blobs
pub trait StateStore: Send + Sync {
    fn save(&self, network_id: NetworkId, state: &[u8]) -> Result<()>;

    fn load(&self, network_id: NetworkId) -> Result<Option<Vec<u8>>>;

    fn erase(&self, network_id: NetworkId) -> Result<()>;
}
