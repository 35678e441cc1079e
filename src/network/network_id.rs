//! Identifiers used on a virtual network: peer addresses, network ids,
//! Ethernet MACs and multicast groups.
//!
//! All of these serialize as strings so they can be used as JSON map keys.
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// 40-bit peer address
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Address(u64);

impl Address {
    pub const MASK: u64 = 0xff_ffff_ffff;

    pub const fn new(value: u64) -> Self {
        Self(value & Self::MASK)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010x}", self.0)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            u64::from_str_radix(s, 16).map_err(|e| format!("Invalid address '{}': {}", s, e))?;
        if value > Self::MASK {
            return Err(format!("Address '{}' is wider than 40 bits", s));
        }
        Ok(Address(value))
    }
}

/// 64-bit network id: the controller's address in the top 40 bits and a
/// controller-local network number in the bottom 24.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct NetworkId(u64);

impl NetworkId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn from_parts(controller: Address, number: u32) -> Self {
        Self((controller.value() << 24) | u64::from(number & 0xff_ffff))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn controller(&self) -> Address {
        Address::new(self.0 >> 24)
    }

    pub fn network_number(&self) -> u32 {
        (self.0 & 0xff_ffff) as u32
    }
}

impl From<u64> for NetworkId {
    fn from(value: u64) -> Self {
        NetworkId(value)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16)
            .map(NetworkId)
            .map_err(|e| format!("Invalid network id '{}': {}", s, e))
    }
}

/// Ethernet MAC address
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Mac([u8; 6]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Locally administered unicast MAC for `address` on `network_id`.
    ///
    /// The first octet comes from the network id with the multicast bit
    /// cleared and the local bit set; 0x52 is skipped because hypervisors
    /// commonly claim it. The remaining octets are the address mixed with
    /// the network id so the same peer gets distinct MACs per network.
    pub fn from_address(address: Address, network_id: NetworkId) -> Self {
        let nwid = network_id.value();
        let mut first = ((nwid & 0xfe) as u8) | 0x02;
        if first == 0x52 {
            first = 0x32;
        }
        let mixed = (address.value() ^ (nwid >> 8)) & Address::MASK;
        let b = mixed.to_be_bytes();
        Mac([first, b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for Mac {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("Invalid MAC '{}': too few octets", s))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|e| format!("Invalid MAC '{}': {}", s, e))?;
        }
        if parts.next().is_some() {
            return Err(format!("Invalid MAC '{}': too many octets", s));
        }
        Ok(Mac(octets))
    }
}

/// Multicast group: a multicast MAC plus a 32-bit additional distinguishing
/// information field (ADI), used e.g. to scope ARP broadcasts by IP.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct MulticastGroup {
    mac: Mac,
    adi: u32,
}

impl MulticastGroup {
    pub const BROADCAST: MulticastGroup = MulticastGroup {
        mac: Mac::BROADCAST,
        adi: 0,
    };

    pub fn new(mac: Mac, adi: u32) -> Self {
        Self { mac, adi }
    }

    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub fn adi(&self) -> u32 {
        self.adi
    }
}

impl fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:x}", self.mac, self.adi)
    }
}

impl FromStr for MulticastGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mac, adi) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid multicast group '{}': expected MAC/ADI", s))?;
        let adi = u32::from_str_radix(adi, 16)
            .map_err(|e| format!("Invalid multicast group '{}': {}", s, e))?;
        Ok(MulticastGroup::new(mac.parse()?, adi))
    }
}

string_serde!(Address);
string_serde!(NetworkId);
string_serde!(Mac);
string_serde!(MulticastGroup);
