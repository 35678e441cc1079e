//! Certificates of membership
//!
//! A certificate is a set of `(id, value, max_delta)` qualifiers issued to a
//! single peer for a single network. Signature checking happens before a
//! certificate reaches this crate; here we only need to order certificates
//! for the same peer and decide whether two certificates agree.
use serde::{Deserialize, Serialize};

use crate::network::{Address, NetworkId};

/// Issue time in milliseconds; also the recency qualifier.
pub const QUALIFIER_TIMESTAMP: u64 = 0;
pub const QUALIFIER_NETWORK_ID: u64 = 1;
pub const QUALIFIER_ISSUED_TO: u64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Qualifier {
    pub id: u64,
    pub value: u64,
    pub max_delta: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MembershipCertificate {
    /// Sorted by qualifier id, one entry per id
    qualifiers: Vec<Qualifier>,
    signed_by: Address,
}

impl MembershipCertificate {
    /// Build a certificate carrying the three standard qualifiers.
    ///
    /// `timestamp_max_delta` is the window within which two certificates'
    /// issue times must fall to agree with each other. The network id must
    /// match exactly, while the issued-to qualifier may differ by any amount.
    pub fn new(
        timestamp: u64,
        timestamp_max_delta: u64,
        network_id: NetworkId,
        issued_to: Address,
    ) -> Self {
        Self {
            qualifiers: vec![
                Qualifier {
                    id: QUALIFIER_TIMESTAMP,
                    value: timestamp,
                    max_delta: timestamp_max_delta,
                },
                Qualifier {
                    id: QUALIFIER_NETWORK_ID,
                    value: network_id.value(),
                    max_delta: 0,
                },
                Qualifier {
                    id: QUALIFIER_ISSUED_TO,
                    value: issued_to.value(),
                    max_delta: u64::MAX,
                },
            ],
            signed_by: network_id.controller(),
        }
    }

    /// Add or replace a qualifier, keeping the list sorted by id.
    pub fn with_qualifier(mut self, id: u64, value: u64, max_delta: u64) -> Self {
        let q = Qualifier {
            id,
            value,
            max_delta,
        };
        match self.qualifiers.binary_search_by_key(&id, |q| q.id) {
            Ok(pos) => self.qualifiers[pos] = q,
            Err(pos) => self.qualifiers.insert(pos, q),
        }
        self
    }

    pub fn signed_by(mut self, signer: Address) -> Self {
        self.signed_by = signer;
        self
    }

    pub fn signer(&self) -> Address {
        self.signed_by
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn qualifier(&self, id: u64) -> Option<&Qualifier> {
        self.qualifiers
            .binary_search_by_key(&id, |q| q.id)
            .ok()
            .map(|pos| &self.qualifiers[pos])
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.qualifier(QUALIFIER_TIMESTAMP).map(|q| q.value)
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.qualifier(QUALIFIER_NETWORK_ID)
            .map(|q| NetworkId::new(q.value))
    }

    pub fn issued_to(&self) -> Option<Address> {
        self.qualifier(QUALIFIER_ISSUED_TO)
            .map(|q| Address::new(q.value))
    }
}

/// Result of comparing a candidate certificate against the one on file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateOrder {
    Newer,
    Older,
    Incompatible,
}

/// Ordering and agreement rules for certificates.
///
/// These are defined by the certificate format; the network controller only
/// consumes them.
pub trait CertificateComparator: Send + Sync {
    /// Order `candidate` relative to `on_file`. Anything not strictly newer
    /// must come back as `Older` or `Incompatible`.
    fn compare(
        &self,
        candidate: &MembershipCertificate,
        on_file: &MembershipCertificate,
    ) -> CertificateOrder;

    /// Does `peer`'s certificate agree with our own?
    fn is_compatible(&self, local: &MembershipCertificate, peer: &MembershipCertificate) -> bool;
}

/// Comparator for certificates built from [`Qualifier`]s.
///
/// Recency is the timestamp qualifier. Two certificates agree when every
/// qualifier of the local certificate is present on the peer's and the
/// values differ by no more than the smaller of the two `max_delta`s.
#[derive(Clone, Copy, Debug, Default)]
pub struct QualifierComparator;

impl CertificateComparator for QualifierComparator {
    fn compare(
        &self,
        candidate: &MembershipCertificate,
        on_file: &MembershipCertificate,
    ) -> CertificateOrder {
        if candidate.issued_to() != on_file.issued_to()
            || candidate.network_id() != on_file.network_id()
        {
            return CertificateOrder::Incompatible;
        }
        match (candidate.timestamp(), on_file.timestamp()) {
            (Some(new_ts), Some(old_ts)) if new_ts > old_ts => CertificateOrder::Newer,
            (Some(_), Some(_)) => CertificateOrder::Older,
            _ => CertificateOrder::Incompatible,
        }
    }

    fn is_compatible(&self, local: &MembershipCertificate, peer: &MembershipCertificate) -> bool {
        local.qualifiers().iter().all(|mine| match peer.qualifier(mine.id) {
            Some(theirs) => {
                mine.value.abs_diff(theirs.value) <= mine.max_delta.min(theirs.max_delta)
            }
            None => false,
        })
    }
}
