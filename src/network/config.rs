use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Address, MulticastGroup, NetworkId};
use crate::certificate::MembershipCertificate;
use crate::config_error;
use crate::error::Result;

/// Token bucket parameters for one multicast group, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MulticastRate {
    /// Starting balance of a new account
    pub preload: u32,
    /// Balance cap
    pub max_balance: u32,
    /// Refill rate per second
    pub accrual: u32,
}

impl Default for MulticastRate {
    fn default() -> Self {
        Self {
            preload: 32_768,
            max_balance: 262_144,
            accrual: 32_768,
        }
    }
}

fn default_multicast_rate() -> MulticastRate {
    MulticastRate::default()
}

/// Network configuration as issued by the network's controller.
///
/// Once adopted this is never mutated: updates replace the whole object.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub network_id: NetworkId,
    /// Controller-side issue time in milliseconds
    pub timestamp: u64,
    pub issued_to: Address,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub private: bool,
    /// Our own membership certificate; required on private networks
    #[serde(default)]
    pub certificate_of_membership: Option<MembershipCertificate>,
    /// Anyone may bridge
    #[serde(default)]
    pub allow_passive_bridging: bool,
    #[serde(default)]
    pub active_bridges: BTreeSet<Address>,
    #[serde(default)]
    pub multicast_rates: BTreeMap<MulticastGroup, MulticastRate>,
    #[serde(default = "default_multicast_rate")]
    pub default_multicast_rate: MulticastRate,
}

impl NetworkConfig {
    pub fn is_public(&self) -> bool {
        !self.private
    }

    pub fn com(&self) -> Option<&MembershipCertificate> {
        self.certificate_of_membership.as_ref()
    }

    pub fn permits_bridging(&self, peer: Address) -> bool {
        self.allow_passive_bridging || self.active_bridges.contains(&peer)
    }

    pub fn multicast_rate(&self, group: &MulticastGroup) -> MulticastRate {
        self.multicast_rates
            .get(group)
            .copied()
            .unwrap_or(self.default_multicast_rate)
    }

    /// Structural checks before a configuration can be adopted by `network_id`.
    pub fn validate(&self, network_id: NetworkId) -> Result<()> {
        if self.network_id != network_id {
            return Err(config_error!(
                "Configuration is for network {}, expected {}",
                self.network_id,
                network_id
            ));
        }
        if self.timestamp == 0 {
            return Err(config_error!("Configuration has no timestamp"));
        }
        if self.issued_to.is_nil() {
            return Err(config_error!("Configuration has no recipient"));
        }
        if self.private {
            let com = self
                .com()
                .ok_or_else(|| config_error!("Private network without membership certificate"))?;
            if com.network_id() != Some(network_id) {
                return Err(config_error!(
                    "Membership certificate is not for network {}",
                    network_id
                ));
            }
        }
        let rates = self
            .multicast_rates
            .values()
            .chain(std::iter::once(&self.default_multicast_rate));
        for rate in rates {
            if rate.preload > rate.max_balance {
                return Err(config_error!(
                    "Multicast preload {} exceeds max balance {}",
                    rate.preload,
                    rate.max_balance
                ));
            }
        }
        Ok(())
    }
}
