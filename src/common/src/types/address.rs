// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// An IP address, stored uniformly as 16 bytes. IPv4 addresses occupy the
/// v4-mapped prefix `::ffff:0:0/96`, so a v4 address and its mapped v6
/// form are the same value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Ipv6Addr);

impl Address {
    pub fn from_v4(addr: Ipv4Addr) -> Self {
        Self(addr.to_ipv6_mapped())
    }

    pub fn from_v6(addr: Ipv6Addr) -> Self {
        Self(addr)
    }

    pub fn from_octets(octets: [u8; 16]) -> Self {
        Self(Ipv6Addr::from(octets))
    }

    pub fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }

    /// Whether the address lies in the v4-mapped prefix.
    pub fn is_v4(&self) -> bool {
        self.0.to_ipv4_mapped().is_some()
    }

    /// Zero out all but the first `length` bits.
    pub fn mask(&self, length: u8) -> Self {
        let mut octets = self.octets();
        let length = length.min(128) as usize;
        for (i, byte) in octets.iter_mut().enumerate() {
            let bit = i * 8;
            if bit + 8 <= length {
                continue;
            }
            if bit >= length {
                *byte = 0;
            } else {
                *byte &= 0xff << (8 - (length - bit));
            }
        }
        Self::from_octets(octets)
    }
}

impl From<IpAddr> for Address {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::from_v4(v4),
            IpAddr::V6(v6) => Self::from_v6(v6),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<IpAddr>()
            .map(Into::into)
            .map_err(|_| Error::parse(format!("not an IP address: {s}")))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.to_ipv4_mapped() {
            Some(v4) => write!(f, "{v4}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// An address prefix. The length counts bits of the 16-byte form, so v4
/// prefixes are stored with an offset of 96 and printed without it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subnet {
    network: Address,
    length: u8,
}

impl Subnet {
    /// Build a subnet, masking `network` down to `length` bits.
    pub fn new(network: Address, length: u8) -> Self {
        let length = length.min(128);
        Self {
            network: network.mask(length),
            length,
        }
    }

    /// Build from a v4 network and a v4 prefix length.
    pub fn from_v4(network: Ipv4Addr, length: u8) -> Self {
        Self::new(Address::from_v4(network), length.min(32) + 96)
    }

    pub fn network(&self) -> Address {
        self.network
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn contains(&self, addr: &Address) -> bool {
        addr.mask(self.length) == self.network
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| Error::parse(format!("not a subnet: {s}")))?;
        let length: u8 = len
            .parse()
            .map_err(|_| Error::parse(format!("bad prefix length: {len}")))?;
        match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) if length <= 32 => Ok(Self::from_v4(v4, length)),
            Ok(IpAddr::V6(v6)) if length <= 128 => Ok(Self::new(Address::from_v6(v6), length)),
            _ => Err(Error::parse(format!("not a subnet: {s}"))),
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.network.is_v4() && self.length >= 96 {
            write!(f, "{}/{}", self.network, self.length - 96)
        } else {
            write!(f, "{}/{}", self.network, self.length)
        }
    }
}

impl fmt::Debug for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
