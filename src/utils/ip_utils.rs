//! IPv4 prefix helpers used by network address assignment and by binding
//! filters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network prefix such as `10.150.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    /// Build a prefix, masking off host bits of `addr`.
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, String> {
        if len > 32 {
            return Err(format!("Invalid prefix length /{}", len));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_for(len));
        Ok(Self { network, len })
    }

    fn mask_for(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(len))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// Number of addresses covered by the prefix.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.len))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_for(self.len) == u32::from(self.network)
    }

    /// True if every address of `other` lies inside this prefix.
    pub fn covers(&self, other: &Ipv4Prefix) -> bool {
        other.len >= self.len && self.contains(other.network)
    }

    /// Address at `offset` from the network address, if it stays inside
    /// the prefix.
    pub fn host(&self, offset: u32) -> Option<Ipv4Addr> {
        if u64::from(offset) >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + offset))
    }

    /// Offset of `addr` from the network address.
    pub fn offset_of(&self, addr: Ipv4Addr) -> Option<u32> {
        self.contains(addr)
            .then(|| u32::from(addr) - u32::from(self.network))
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("Invalid prefix '{}': missing '/'", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("Invalid prefix '{}': bad address", s))?;
        let len: u8 = len
            .parse()
            .map_err(|_| format!("Invalid prefix '{}': bad length", s))?;
        Ipv4Prefix::new(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        let prefix: Ipv4Prefix = "10.150.0.0/24".parse().unwrap();
        assert_eq!(prefix.network(), Ipv4Addr::new(10, 150, 0, 0));
        assert_eq!(prefix.len(), 24);
        assert_eq!(prefix.to_string(), "10.150.0.0/24");

        // Host bits are masked off
        let prefix: Ipv4Prefix = "10.150.0.77/24".parse().unwrap();
        assert_eq!(prefix.network(), Ipv4Addr::new(10, 150, 0, 0));

        assert!("10.150.0.0".parse::<Ipv4Prefix>().is_err());
        assert!("10.150.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("not.an.ip/24".parse::<Ipv4Prefix>().is_err());
    }

    #[test]
    fn test_contains_and_host() {
        let prefix: Ipv4Prefix = "10.2.0.0/24".parse().unwrap();
        assert!(prefix.contains(Ipv4Addr::new(10, 2, 0, 71)));
        assert!(!prefix.contains(Ipv4Addr::new(10, 3, 0, 71)));
        assert_eq!(prefix.host(71), Some(Ipv4Addr::new(10, 2, 0, 71)));
        assert_eq!(prefix.host(256), None);
        assert_eq!(prefix.offset_of(Ipv4Addr::new(10, 2, 0, 254)), Some(254));
        assert_eq!(prefix.offset_of(Ipv4Addr::new(10, 9, 0, 254)), None);
    }

    #[test]
    fn test_covers() {
        let wide: Ipv4Prefix = "10.0.0.0/8".parse().unwrap();
        let narrow: Ipv4Prefix = "10.150.0.0/24".parse().unwrap();
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
    }
}
