// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! IPv4 address blocks and allocation of host addresses from them.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::types::{SimError, SimResult};

/// A contiguous IPv4 network such as `10.1.1.0/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Network {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Create a network. Host bits set in `addr` are an error.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> SimResult<Self> {
        if prefix_len > 30 {
            return sim_error!("prefix /{prefix_len} leaves no host addresses");
        }
        let net = Self {
            network: addr,
            prefix_len,
        };
        if u32::from(addr) & !net.mask() != 0 {
            return sim_error!("{addr}/{prefix_len} has host bits set");
        }
        Ok(net)
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        }
    }

    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    #[must_use]
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask())
    }

    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.network)
    }

    /// Number of usable host addresses (network and broadcast excluded).
    #[must_use]
    pub fn num_hosts(&self) -> u32 {
        let size = 1u64 << (32 - self.prefix_len);
        (size - 2) as u32
    }

    /// Whether two networks share any address.
    #[must_use]
    pub fn overlaps(&self, other: &Ipv4Network) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }
}

impl FromStr for Ipv4Network {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((addr, prefix)) = s.trim().split_once('/') else {
            return sim_error!("'{s}' is not of the form a.b.c.d/len");
        };
        let addr: Ipv4Addr = match addr.parse() {
            Ok(addr) => addr,
            Err(e) => return sim_error!("'{s}': {e}"),
        };
        let prefix_len: u8 = match prefix.parse() {
            Ok(len) if len <= 32 => len,
            _ => return sim_error!("'{s}': invalid prefix length"),
        };
        Self::new(addr, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Network {
    type Error = SimError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Network> for String {
    fn from(net: Ipv4Network) -> String {
        net.to_string()
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Hands out host addresses from an [`Ipv4Network`] in ascending order.
#[derive(Debug, Clone)]
pub struct AddressBlock {
    network: Ipv4Network,
    next_host: u32,
}

impl AddressBlock {
    #[must_use]
    pub fn new(network: Ipv4Network) -> Self {
        Self {
            network,
            next_host: 1,
        }
    }

    #[must_use]
    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    /// Number of addresses still available.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.network.num_hosts() + 1 - self.next_host
    }

    /// Allocate the next host address.
    pub fn allocate(&mut self) -> SimResult<Ipv4Addr> {
        if self.next_host > self.network.num_hosts() {
            return sim_error!("address block {} exhausted", self.network);
        }
        let addr = Ipv4Addr::from(u32::from(self.network.network) + self.next_host);
        self.next_host += 1;
        Ok(addr)
    }
}

/// Carves equally sized subnets out of a larger network.
#[derive(Debug, Clone)]
pub struct SubnetAllocator {
    parent: Ipv4Network,
    prefix_len: u8,
    next_index: u64,
}

impl SubnetAllocator {
    pub fn new(parent: Ipv4Network, prefix_len: u8) -> SimResult<Self> {
        if prefix_len < parent.prefix_len || prefix_len > 30 {
            return sim_error!("cannot split {parent} into /{prefix_len} subnets");
        }
        Ok(Self {
            parent,
            prefix_len,
            next_index: 0,
        })
    }

    /// Number of subnets the parent network holds in total.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        1u64 << (self.prefix_len - self.parent.prefix_len)
    }

    /// Return the next unused subnet.
    pub fn next_subnet(&mut self) -> SimResult<Ipv4Network> {
        if self.next_index >= self.capacity() {
            return sim_error!(
                "no /{} subnets left in {}",
                self.prefix_len,
                self.parent
            );
        }
        let size = 1u64 << (32 - self.prefix_len);
        let base = u64::from(u32::from(self.parent.network)) + self.next_index * size;
        self.next_index += 1;
        Ipv4Network::new(Ipv4Addr::from(base as u32), self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_network() {
        let net: Ipv4Network = "10.1.1.0/24".parse().unwrap();
        assert_eq!(net.network(), Ipv4Addr::new(10, 1, 1, 0));
        assert_eq!(net.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(net.num_hosts(), 254);
        assert!(net.contains(Ipv4Addr::new(10, 1, 1, 200)));
        assert!(!net.contains(Ipv4Addr::new(10, 1, 2, 1)));

        assert!("10.1.1.1/24".parse::<Ipv4Network>().is_err());
        assert!("10.1.1.0".parse::<Ipv4Network>().is_err());
        assert!("10.1.1.0/33".parse::<Ipv4Network>().is_err());
    }

    #[test]
    fn allocate_in_order() {
        let mut block = AddressBlock::new("10.1.1.0/24".parse().unwrap());
        assert_eq!(block.allocate().unwrap(), Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(block.allocate().unwrap(), Ipv4Addr::new(10, 1, 1, 2));
        assert_eq!(block.remaining(), 252);
    }

    #[test]
    fn exhaustion() {
        let mut block = AddressBlock::new("192.168.0.0/30".parse().unwrap());
        assert_eq!(block.allocate().unwrap(), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(block.allocate().unwrap(), Ipv4Addr::new(192, 168, 0, 2));
        assert!(block.allocate().is_err());
    }

    #[test]
    fn subnets() {
        let mut subnets = SubnetAllocator::new("10.2.0.0/16".parse().unwrap(), 30).unwrap();
        assert_eq!(subnets.capacity(), 16384);
        assert_eq!(subnets.next_subnet().unwrap().to_string(), "10.2.0.0/30");
        assert_eq!(subnets.next_subnet().unwrap().to_string(), "10.2.0.4/30");

        let mut small = SubnetAllocator::new("10.3.0.0/29".parse().unwrap(), 30).unwrap();
        assert!(small.next_subnet().is_ok());
        assert!(small.next_subnet().is_ok());
        assert!(small.next_subnet().is_err());
    }

    #[test]
    fn overlap() {
        let a: Ipv4Network = "10.1.1.0/24".parse().unwrap();
        let b: Ipv4Network = "10.2.0.0/16".parse().unwrap();
        let c: Ipv4Network = "10.0.0.0/8".parse().unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }
}
