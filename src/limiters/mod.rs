pub mod bandwidth_account;
pub mod multicast_limiter;
pub use bandwidth_account::BandwidthAccount;
pub use multicast_limiter::{MulticastLimiter, MulticastRateKey};
