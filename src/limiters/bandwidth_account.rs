//! Token bucket rate limiting algorithm, counted in bytes
use chrono::Utc;

use crate::network::MulticastRate;

/// Byte-denominated token bucket
///
/// Balance accrues at `accrual_per_second` up to `max_balance` and is spent
/// by admitted packets. `0 <= balance <= max_balance` always holds.
#[derive(Clone, Debug, PartialEq)]
pub struct BandwidthAccount {
    balance: f64,
    max_balance: f64,
    accrual_per_second: f64,
    /// Epoch milliseconds of the last accrual
    last_update: i64,
}

impl BandwidthAccount {
    pub fn new(rate: &MulticastRate, now_ms: i64) -> Self {
        let max_balance = f64::from(rate.max_balance);
        Self {
            balance: f64::from(rate.preload).min(max_balance),
            max_balance,
            accrual_per_second: f64::from(rate.accrual),
            last_update: now_ms,
        }
    }

    /// Add balance for the time elapsed since the last update.
    /// A clock that went backwards accrues nothing.
    pub fn accrue(&mut self, now_ms: i64) -> &mut Self {
        if now_ms <= self.last_update {
            return self;
        }
        let elapsed_secs = (now_ms - self.last_update) as f64 / 1000.0;
        self.balance = (self.balance + self.accrual_per_second * elapsed_secs)
            .clamp(0.0, self.max_balance);
        self.last_update = now_ms;
        self
    }

    /// Accrue up to `now_ms`, then spend `bytes` if the balance covers it.
    /// A rejected packet leaves the balance as it was after accrual.
    pub fn deduct_at(&mut self, bytes: u32, now_ms: i64) -> bool {
        self.accrue(now_ms);
        let bytes = f64::from(bytes);
        if self.balance >= bytes {
            self.balance -= bytes;
            true
        } else {
            false
        }
    }

    pub fn deduct(&mut self, bytes: u32) -> bool {
        self.deduct_at(bytes, Utc::now().timestamp_millis())
    }

    /// Whole bytes available, clamped to u32 range
    pub fn balance(&self) -> u32 {
        self.balance.trunc().clamp(0.0, u32::MAX.into()) as u32
    }

    /// Nothing spent that accrual has not already paid back
    pub fn is_full(&self) -> bool {
        self.balance >= self.max_balance
    }

    pub fn max_balance(&self) -> u32 {
        self.max_balance as u32
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(preload: u32, max_balance: u32, accrual: u32) -> MulticastRate {
        MulticastRate {
            preload,
            max_balance,
            accrual,
        }
    }

    #[test]
    fn starts_at_preload() {
        let account = BandwidthAccount::new(&rate(100, 1000, 10), 0);
        assert_eq!(account.balance(), 100);
        assert_eq!(account.max_balance(), 1000);
    }

    #[test]
    fn preload_is_capped() {
        let account = BandwidthAccount::new(&rate(5000, 1000, 10), 0);
        assert_eq!(account.balance(), 1000);
    }

    #[test]
    fn deduct_until_exhausted() {
        let mut account = BandwidthAccount::new(&rate(300, 1000, 0), 0);
        assert!(account.deduct_at(100, 0));
        assert!(account.deduct_at(200, 0));
        assert_eq!(account.balance(), 0);
        assert!(!account.deduct_at(1, 0));
    }

    #[test]
    fn rejection_leaves_balance_unchanged() {
        let mut account = BandwidthAccount::new(&rate(100, 1000, 0), 0);
        assert!(!account.deduct_at(101, 0));
        assert_eq!(account.balance(), 100);
        assert!(account.deduct_at(100, 0));
    }

    #[test]
    fn accrues_over_time() {
        let mut account = BandwidthAccount::new(&rate(0, 1000, 100), 0);
        account.accrue(500);
        assert_eq!(account.balance(), 50);
        account.accrue(1500);
        assert_eq!(account.balance(), 150);
        assert_eq!(account.last_update(), 1500);
    }

    #[test]
    fn accrual_is_capped() {
        let mut account = BandwidthAccount::new(&rate(0, 1000, 100), 0);
        assert!(!account.is_full());
        account.accrue(60_000);
        assert_eq!(account.balance(), 1000);
        assert!(account.is_full());
    }

    #[test]
    fn clock_going_backwards_accrues_nothing() {
        let mut account = BandwidthAccount::new(&rate(10, 1000, 100), 10_000);
        account.accrue(5_000);
        assert_eq!(account.balance(), 10);
        assert_eq!(account.last_update(), 10_000);
    }

    #[test]
    fn refill_allows_rejected_packet_later() {
        let mut account = BandwidthAccount::new(&rate(0, 1000, 1000), 0);
        assert!(!account.deduct_at(500, 0));
        assert!(account.deduct_at(500, 500));
        assert_eq!(account.balance(), 0);
    }
}
