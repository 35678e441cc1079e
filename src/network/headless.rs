//! Collaborators for running a node without kernel devices or a wire
//! protocol: frames are logged and dropped, controller requests are logged.
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace};

use super::{Address, ConfigTransport, Mac, MulticastGroup, NetworkId, Tap, TapProvisioner};
use crate::certificate::MembershipCertificate;
use crate::error::{Result, TapError};

#[derive(Debug)]
pub struct HeadlessTap {
    name: String,
    up: AtomicBool,
}

impl HeadlessTap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: AtomicBool::new(false),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }
}

impl Tap for HeadlessTap {
    fn put(&self, from: Mac, to: Mac, ether_type: u16, data: &[u8]) {
        trace!(
            "{}: dropping {} byte frame {} -> {} (ethertype {:04x})",
            self.name,
            data.len(),
            from,
            to,
            ether_type
        );
    }

    fn ips(&self) -> BTreeSet<IpAddr> {
        BTreeSet::new()
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn set_enabled(&self, enabled: bool) {
        self.up.store(enabled, Ordering::Release);
        debug!("{}: link {}", self.name, if enabled { "up" } else { "down" });
    }

    fn scan_multicast_groups(&self) -> BTreeSet<MulticastGroup> {
        BTreeSet::new()
    }
}

/// Hands out `HeadlessTap`s named `vn<network id>`
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessProvisioner;

impl TapProvisioner for HeadlessProvisioner {
    fn create(&self, network_id: NetworkId, _mac: Mac) -> std::result::Result<Arc<dyn Tap>, TapError> {
        Ok(Arc::new(HeadlessTap::new(format!("vn{}", network_id))))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl ConfigTransport for LogTransport {
    async fn request_config(&self, network_id: NetworkId, controller: Address) -> Result<()> {
        info!("[{}] Configuration request for controller {}", network_id, controller);
        Ok(())
    }

    async fn push_certificate(
        &self,
        network_id: NetworkId,
        peer: Address,
        certificate: MembershipCertificate,
    ) -> Result<()> {
        debug!(
            "[{}] Certificate push to {} (issued {:?})",
            network_id,
            peer,
            certificate.timestamp()
        );
        Ok(())
    }
}
