//! Certificates of membership held for peers, plus the schedule on which we
//! push our own certificate to them.
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{Address, NetworkId};
use crate::certificate::{CertificateComparator, CertificateOrder, MembershipCertificate};

#[derive(Clone, Debug)]
pub struct MembershipStore {
    network_id: NetworkId,
    certificates: BTreeMap<Address, MembershipCertificate>,
    last_pushed: HashMap<Address, u64>,
    push_interval_ms: u64,
}

impl MembershipStore {
    pub fn new(network_id: NetworkId, push_interval_ms: u64) -> Self {
        Self {
            network_id,
            certificates: BTreeMap::new(),
            last_pushed: HashMap::new(),
            push_interval_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn get(&self, peer: &Address) -> Option<&MembershipCertificate> {
        self.certificates.get(peer)
    }

    pub fn certificates(&self) -> impl Iterator<Item = &MembershipCertificate> {
        self.certificates.values()
    }

    /// File `cert` under its recipient if it is strictly newer than what we
    /// hold. Returns whether the store changed.
    pub fn add(
        &mut self,
        cert: MembershipCertificate,
        comparator: &dyn CertificateComparator,
    ) -> bool {
        let Some(peer) = cert.issued_to() else {
            debug!("Ignoring certificate without recipient");
            return false;
        };
        if cert.network_id() != Some(self.network_id) {
            debug!(
                "Ignoring certificate for {} issued for network {:?}",
                peer,
                cert.network_id()
            );
            return false;
        }
        match self.certificates.get(&peer) {
            Some(on_file) => match comparator.compare(&cert, on_file) {
                CertificateOrder::Newer => {
                    self.certificates.insert(peer, cert);
                    true
                }
                order => {
                    debug!("Ignoring certificate for {}: {:?}", peer, order);
                    false
                }
            },
            None => {
                self.certificates.insert(peer, cert);
                true
            }
        }
    }

    /// Is `peer` holding a certificate that agrees with `local`?
    pub fn is_member(
        &self,
        peer: &Address,
        local: &MembershipCertificate,
        comparator: &dyn CertificateComparator,
    ) -> bool {
        self.certificates
            .get(peer)
            .is_some_and(|theirs| comparator.is_compatible(local, theirs))
    }

    /// Decide whether to push our certificate to `peer` at `now`, recording
    /// the push when the answer is yes.
    pub fn should_push(&mut self, peer: Address, force: bool, now: u64) -> bool {
        let due = match self.last_pushed.get(&peer) {
            Some(last) => now.saturating_sub(*last) > self.push_interval_ms,
            None => true,
        };
        if force || due {
            self.last_pushed.insert(peer, now);
            true
        } else {
            false
        }
    }

    /// Forget push times older than the push interval; an absent entry
    /// already means "due". Returns how many were dropped.
    pub fn prune_push_times(&mut self, now: u64) -> usize {
        let before = self.last_pushed.len();
        let interval = self.push_interval_ms;
        self.last_pushed
            .retain(|_, last| now.saturating_sub(*last) <= interval);
        before - self.last_pushed.len()
    }

    pub fn push_times_len(&self) -> usize {
        self.last_pushed.len()
    }

    /// Drop certificates that no longer agree with `local`; returns how many.
    pub fn prune_incompatible(
        &mut self,
        local: &MembershipCertificate,
        comparator: &dyn CertificateComparator,
    ) -> usize {
        let before = self.certificates.len();
        self.certificates
            .retain(|_, theirs| comparator.is_compatible(local, theirs));
        before - self.certificates.len()
    }
}
