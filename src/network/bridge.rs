use std::collections::HashMap;

use super::{Address, Mac, MulticastGroup};

/// Learned Ethernet bridging state for one network.
#[derive(Clone, Debug, Default)]
pub struct BridgeTable {
    routes: HashMap<Mac, Address>,
    /// Group -> last time (epoch ms) it was seen behind our tap
    multicast_groups: HashMap<MulticastGroup, u64>,
}

impl BridgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last writer wins: bridged hosts move between segments.
    pub fn learn_route(&mut self, mac: Mac, peer: Address) {
        self.routes.insert(mac, peer);
    }

    /// The result may be our own address.
    pub fn find_route(&self, mac: &Mac) -> Option<Address> {
        self.routes.get(mac).copied()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn learn_multicast_group(&mut self, group: MulticastGroup, now: u64) {
        self.multicast_groups.insert(group, now);
    }

    pub fn multicast_groups(&self) -> impl Iterator<Item = &MulticastGroup> {
        self.multicast_groups.keys()
    }

    /// Drop routes through peers `permitted` no longer accepts.
    pub fn prune_routes<F>(&mut self, permitted: F) -> usize
    where
        F: Fn(Address) -> bool,
    {
        let before = self.routes.len();
        self.routes.retain(|_, peer| permitted(*peer));
        before - self.routes.len()
    }

    /// Drop bridged groups not seen since `cutoff`.
    pub fn prune_multicast_groups(&mut self, cutoff: u64) -> usize {
        let before = self.multicast_groups.len();
        self.multicast_groups.retain(|_, seen| *seen >= cutoff);
        before - self.multicast_groups.len()
    }
}
