use std::collections::HashMap;

use super::bandwidth_account::BandwidthAccount;
use crate::network::{Address, MulticastGroup, MulticastRate};

/// (sender, group) key for a multicast bandwidth account
pub type MulticastRateKey = (Address, MulticastGroup);

/// Per sender, per group multicast admission control.
///
/// Accounts are created lazily the first time a key is seen, seeded from the
/// rate the caller resolves for that group. This structure holds no lock of
/// its own; it lives inside the network's state mutex.
#[derive(Clone, Debug, Default)]
pub struct MulticastLimiter {
    accounts: HashMap<MulticastRateKey, BandwidthAccount>,
}

impl MulticastLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn account(&self, sender: Address, group: &MulticastGroup) -> Option<&BandwidthAccount> {
        self.accounts.get(&(sender, *group))
    }

    /// Deduct `bytes` from the (sender, group) account, creating it from
    /// `rate` if this is the first packet seen for the key.
    /// Returns whether the packet is within budget.
    pub fn check_and_deduct<F>(
        &mut self,
        sender: Address,
        group: &MulticastGroup,
        bytes: u32,
        now_ms: i64,
        rate: F,
    ) -> bool
    where
        F: FnOnce() -> MulticastRate,
    {
        self.accounts
            .entry((sender, *group))
            .or_insert_with(|| BandwidthAccount::new(&rate(), now_ms))
            .deduct_at(bytes, now_ms)
    }

    /// Drop accounts that have accrued back to their cap by `now_ms`.
    /// A sender seen again starts over from its group's preload.
    pub fn prune_full(&mut self, now_ms: i64) -> usize {
        let before = self.accounts.len();
        self.accounts
            .retain(|_, account| !account.accrue(now_ms).is_full());
        before - self.accounts.len()
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Mac;

    fn rate() -> MulticastRate {
        MulticastRate {
            preload: 1000,
            max_balance: 2000,
            accrual: 100,
        }
    }

    fn group(n: u8) -> MulticastGroup {
        MulticastGroup::new(Mac::new([0x01, 0x00, 0x5e, 0, 0, n]), 0)
    }

    #[test]
    fn account_created_on_first_packet() {
        let mut limiter = MulticastLimiter::new();
        assert!(limiter.is_empty());
        assert!(limiter.check_and_deduct(Address::new(1), &group(1), 400, 0, rate));
        assert_eq!(limiter.len(), 1);
        let account = limiter.account(Address::new(1), &group(1)).unwrap();
        assert_eq!(account.balance(), 600);
    }

    #[test]
    fn rate_only_resolved_for_new_accounts() {
        let mut limiter = MulticastLimiter::new();
        let mut calls = 0;
        for _ in 0..3 {
            limiter.check_and_deduct(Address::new(1), &group(1), 1, 0, || {
                calls += 1;
                rate()
            });
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn keys_are_independent() {
        let mut limiter = MulticastLimiter::new();
        assert!(limiter.check_and_deduct(Address::new(1), &group(1), 1000, 0, rate));
        assert!(!limiter.check_and_deduct(Address::new(1), &group(1), 1, 0, rate));

        // same sender, other group
        assert!(limiter.check_and_deduct(Address::new(1), &group(2), 1000, 0, rate));
        // other sender, same group
        assert!(limiter.check_and_deduct(Address::new(2), &group(1), 1000, 0, rate));
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn exhausted_key_recovers_with_accrual() {
        let mut limiter = MulticastLimiter::new();
        assert!(limiter.check_and_deduct(Address::new(1), &group(1), 1000, 0, rate));
        assert!(!limiter.check_and_deduct(Address::new(1), &group(1), 100, 500, rate));
        assert!(limiter.check_and_deduct(Address::new(1), &group(1), 100, 1000, rate));
    }

    #[test]
    fn refilled_accounts_are_pruned() {
        let mut limiter = MulticastLimiter::new();
        assert!(limiter.check_and_deduct(Address::new(1), &group(1), 1000, 0, rate));
        assert!(limiter.check_and_deduct(Address::new(2), &group(1), 10, 0, rate));
        // 15 s of accrual at 100 B/s refills 1500 bytes: only sender 2
        // (balance 990) reaches the 2000 cap
        assert_eq!(limiter.prune_full(15_000), 1);
        assert!(limiter.account(Address::new(1), &group(1)).is_some());
        assert!(limiter.account(Address::new(2), &group(1)).is_none());
    }
}
