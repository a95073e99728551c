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

//! Per-column prefilters.
//!
//! A synopsis is a lossy summary consulted before the exact value
//! index. Its three-valued answer is binding in one direction only:
//! `Some(false)` guarantees that no row of the column satisfies the
//! predicate, `Some(true)` that every row does, and `None` defers to
//! the index. Growth is monotone: adding a value only ever widens the
//! accepted set.

mod bloom;
mod minmax;

use bytes::{Buf, BufMut};
use serde::Deserialize;

pub use self::bloom::BloomSynopsis;
pub use self::minmax::MinMaxSynopsis;

use spyglass_common::error::{Error, Result};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::take_u8;
use spyglass_common::types::{Address, Data, DataRef, Subnet, Type, TypeKind};

/// Tuning knobs for synopsis construction.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynopsisOptions {
    /// Expected number of distinct values per Bloom-filtered column.
    pub bloom_capacity: u64,
    /// Target false-positive rate of the Bloom filters.
    pub bloom_false_positive: f64,
}

impl Default for SynopsisOptions {
    fn default() -> Self {
        Self {
            bloom_capacity: 16_384,
            bloom_false_positive: 0.01,
        }
    }
}

/// The two-flag synopsis for boolean columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoolSynopsis {
    any_true: bool,
    any_false: bool,
    any_nil: bool,
}

impl BoolSynopsis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: DataRef<'_>) {
        match value {
            DataRef::Bool(true) => self.any_true = true,
            DataRef::Bool(false) => self.any_false = true,
            DataRef::Nil => self.any_nil = true,
            _ => {}
        }
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Option<bool> {
        // For the match set, `!= b` coincides with `== !b`: nil rows
        // match neither.
        let positive = match (op, rhs) {
            (RelOp::Eq, Data::Bool(b)) => *b,
            (RelOp::Ne, Data::Bool(b)) => !*b,
            _ => return None,
        };
        let (present, absent) = if positive {
            (self.any_true, self.any_false)
        } else {
            (self.any_false, self.any_true)
        };
        if !present {
            Some(false)
        } else if !absent && !self.any_nil {
            Some(true)
        } else {
            None
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.any_true as u8);
        buf.put_u8(self.any_false as u8);
        buf.put_u8(self.any_nil as u8);
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            any_true: take_u8(buf)? != 0,
            any_false: take_u8(buf)? != 0,
            any_nil: take_u8(buf)? != 0,
        })
    }
}

/// Address columns combine a range summary with a Bloom filter, so both
/// equality probes and subnet membership can be ruled out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddressSynopsis {
    minmax: MinMaxSynopsis,
    bloom: Option<BloomSynopsis>,
}

impl AddressSynopsis {
    pub fn new(options: &SynopsisOptions) -> Self {
        Self {
            minmax: MinMaxSynopsis::new(),
            bloom: Some(BloomSynopsis::new(
                options.bloom_capacity,
                options.bloom_false_positive,
            )),
        }
    }

    pub fn add(&mut self, value: DataRef<'_>) {
        self.minmax.add(value);
        if let Some(bloom) = &mut self.bloom {
            bloom.add(value);
        }
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Option<bool> {
        match (op, rhs) {
            (RelOp::Eq, Data::Address(_)) => {
                if let Some(bloom) = &self.bloom {
                    if bloom.lookup(RelOp::Eq, rhs) == Some(false) {
                        return Some(false);
                    }
                }
                self.minmax.lookup(RelOp::Eq, rhs)
            }
            (RelOp::In, Data::Subnet(net)) => {
                // x in net is lower <= x <= upper.
                let lower = Data::Address(net.network());
                let upper = Data::Address(subnet_upper(net));
                let ge = self.minmax.lookup(RelOp::Ge, &lower);
                let le = self.minmax.lookup(RelOp::Le, &upper);
                if ge == Some(false) || le == Some(false) {
                    Some(false)
                } else if ge == Some(true) && le == Some(true) {
                    Some(true)
                } else {
                    None
                }
            }
            (RelOp::In, Data::List(_)) => {
                let by_bloom = self
                    .bloom
                    .as_ref()
                    .and_then(|bloom| bloom.lookup(RelOp::In, rhs));
                by_bloom.or_else(|| self.minmax.lookup(RelOp::In, rhs))
            }
            _ => self.minmax.lookup(op, rhs),
        }
    }

    pub fn mem_usage(&self) -> usize {
        self.minmax.mem_usage() + self.bloom.as_ref().map_or(0, BloomSynopsis::mem_usage)
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        self.minmax.encode_to(buf);
        match &self.bloom {
            Some(bloom) => {
                buf.put_u8(1);
                bloom.encode_to(buf);
            }
            None => buf.put_u8(0),
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let minmax = MinMaxSynopsis::decode_from(buf)?;
        let bloom = match take_u8(buf)? {
            0 => None,
            _ => Some(BloomSynopsis::decode_from(buf)?),
        };
        Ok(Self { minmax, bloom })
    }
}

/// The last address of a subnet: the network with all host bits set.
fn subnet_upper(net: &Subnet) -> Address {
    let mut octets = net.network().octets();
    let length = net.length() as usize;
    for (i, byte) in octets.iter_mut().enumerate() {
        let bit = i * 8;
        if bit + 8 <= length {
            continue;
        }
        if bit >= length {
            *byte = 0xff;
        } else {
            *byte |= 0xff >> (length - bit);
        }
    }
    Address::from_octets(octets)
}

mod tag {
    pub const BOOL: u8 = 0;
    pub const MINMAX: u8 = 1;
    pub const BLOOM: u8 = 2;
    pub const ADDRESS: u8 = 3;
}

/// A per-column synopsis, dispatched by the column's scalar type.
#[derive(Clone, Debug, PartialEq)]
pub enum Synopsis {
    Bool(BoolSynopsis),
    MinMax(MinMaxSynopsis),
    Bloom(BloomSynopsis),
    Address(AddressSynopsis),
}

impl Synopsis {
    /// The synopsis for a column of `ty`, or `None` for types that have
    /// no meaningful prefilter (containers).
    pub fn for_type(ty: &Type, options: &SynopsisOptions) -> Option<Self> {
        match ty.resolved().kind() {
            TypeKind::Bool => Some(Self::Bool(BoolSynopsis::new())),
            TypeKind::Integer
            | TypeKind::Count
            | TypeKind::Real
            | TypeKind::Time
            | TypeKind::Duration
            | TypeKind::Enumeration(_) => Some(Self::MinMax(MinMaxSynopsis::new())),
            TypeKind::Str | TypeKind::Pattern | TypeKind::Subnet => Some(Self::Bloom(
                BloomSynopsis::new(options.bloom_capacity, options.bloom_false_positive),
            )),
            TypeKind::Address => Some(Self::Address(AddressSynopsis::new(options))),
            TypeKind::List(_) | TypeKind::Map(..) | TypeKind::Record(_) => None,
            TypeKind::Alias(..) => unreachable!("resolved"),
        }
    }

    pub fn add(&mut self, value: DataRef<'_>) {
        match self {
            Self::Bool(s) => s.add(value),
            Self::MinMax(s) => s.add(value),
            Self::Bloom(s) => s.add(value),
            Self::Address(s) => s.add(value),
        }
    }

    /// Probe the synopsis: `Some(false)` rules the predicate out for
    /// every row, `Some(true)` rules it in, `None` defers to the index.
    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Option<bool> {
        match self {
            Self::Bool(s) => s.lookup(op, rhs),
            Self::MinMax(s) => s.lookup(op, rhs),
            Self::Bloom(s) => s.lookup(op, rhs),
            Self::Address(s) => s.lookup(op, rhs),
        }
    }

    pub fn mem_usage(&self) -> usize {
        match self {
            Self::Bool(_) => std::mem::size_of::<BoolSynopsis>(),
            Self::MinMax(s) => s.mem_usage(),
            Self::Bloom(s) => s.mem_usage(),
            Self::Address(s) => s.mem_usage(),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        match self {
            Self::Bool(s) => {
                buf.put_u8(tag::BOOL);
                s.encode_to(buf);
            }
            Self::MinMax(s) => {
                buf.put_u8(tag::MINMAX);
                s.encode_to(buf);
            }
            Self::Bloom(s) => {
                buf.put_u8(tag::BLOOM);
                s.encode_to(buf);
            }
            Self::Address(s) => {
                buf.put_u8(tag::ADDRESS);
                s.encode_to(buf);
            }
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        match take_u8(buf)? {
            tag::BOOL => Ok(Self::Bool(BoolSynopsis::decode_from(buf)?)),
            tag::MINMAX => Ok(Self::MinMax(MinMaxSynopsis::decode_from(buf)?)),
            tag::BLOOM => Ok(Self::Bloom(BloomSynopsis::decode_from(buf)?)),
            tag::ADDRESS => Ok(Self::Address(AddressSynopsis::decode_from(buf)?)),
            tag => Err(Error::format(format!("unknown synopsis tag: {tag}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use spyglass_common::expr::evaluate;

    use super::*;

    #[test]
    fn test_bool_synopsis() {
        let mut s = BoolSynopsis::new();
        s.add(DataRef::Bool(true));
        assert_eq!(s.lookup(RelOp::Eq, &Data::Bool(true)), Some(true));
        assert_eq!(s.lookup(RelOp::Eq, &Data::Bool(false)), Some(false));
        assert_eq!(s.lookup(RelOp::Ne, &Data::Bool(false)), Some(true));
        s.add(DataRef::Bool(false));
        assert_eq!(s.lookup(RelOp::Eq, &Data::Bool(true)), None);
        assert_eq!(s.lookup(RelOp::Lt, &Data::Bool(true)), None);
    }

    #[test]
    fn test_bool_nil_blocks_universal_claims() {
        let mut s = BoolSynopsis::new();
        s.add(DataRef::Bool(true));
        s.add(DataRef::Nil);
        assert_eq!(s.lookup(RelOp::Eq, &Data::Bool(true)), None);
        assert_eq!(s.lookup(RelOp::Eq, &Data::Bool(false)), Some(false));
    }

    #[test]
    fn test_address_subnet_pushdown() {
        let options = SynopsisOptions::default();
        let mut s = AddressSynopsis::new(&options);
        s.add(DataRef::Address("10.0.1.5".parse().unwrap()));
        s.add(DataRef::Address("10.0.1.77".parse().unwrap()));

        let inside = Data::Subnet("10.0.0.0/16".parse().unwrap());
        assert_eq!(s.lookup(RelOp::In, &inside), Some(true));
        let outside = Data::Subnet("192.168.0.0/16".parse().unwrap());
        assert_eq!(s.lookup(RelOp::In, &outside), Some(false));
        let partial = Data::Subnet("10.0.1.64/26".parse().unwrap());
        assert_eq!(s.lookup(RelOp::In, &partial), None);
    }

    #[test]
    fn test_subnet_upper() {
        let net: Subnet = "10.0.0.0/8".parse().unwrap();
        assert_eq!(
            subnet_upper(&net),
            "10.255.255.255".parse::<Address>().unwrap()
        );
        let v6: Subnet = "2001:db8::/32".parse().unwrap();
        assert_eq!(
            subnet_upper(&v6),
            "2001:db8:ffff:ffff:ffff:ffff:ffff:ffff"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_factory_covers_scalars() {
        let options = SynopsisOptions::default();
        assert!(Synopsis::for_type(&Type::bool_(), &options).is_some());
        assert!(Synopsis::for_type(&Type::count(), &options).is_some());
        assert!(Synopsis::for_type(&Type::string(), &options).is_some());
        assert!(Synopsis::for_type(&Type::address(), &options).is_some());
        assert!(Synopsis::for_type(&Type::list(Type::count()), &options).is_none());
    }

    #[test]
    fn test_round_trip_through_tagged_encoding() {
        let options = SynopsisOptions::default();
        let mut synopses = [
            Synopsis::for_type(&Type::bool_(), &options).unwrap(),
            Synopsis::for_type(&Type::count(), &options).unwrap(),
            Synopsis::for_type(&Type::string(), &options).unwrap(),
            Synopsis::for_type(&Type::address(), &options).unwrap(),
        ];
        synopses[0].add(DataRef::Bool(true));
        synopses[1].add(DataRef::Count(42));
        synopses[2].add(DataRef::Str("x"));
        synopses[3].add(DataRef::Address("10.0.0.1".parse().unwrap()));
        for synopsis in &synopses {
            let mut buf = Vec::new();
            synopsis.encode_to(&mut buf);
            let decoded = Synopsis::decode_from(&mut buf.as_slice()).unwrap();
            assert_eq!(&decoded, synopsis);
        }
    }

    /// Soundness: whenever some added value satisfies a predicate, the
    /// synopsis must not answer `Some(false)`; whenever it answers
    /// `Some(true)`, every added value must satisfy the predicate.
    #[test]
    fn test_soundness_against_row_evaluation() {
        let mut rng = StdRng::seed_from_u64(7);
        let options = SynopsisOptions::default();
        for _ in 0..64 {
            let values: Vec<Data> = (0..32)
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        Data::Nil
                    } else {
                        Data::Count(rng.gen_range(0..64))
                    }
                })
                .collect();
            let mut synopsis = Synopsis::for_type(&Type::count(), &options).unwrap();
            for v in &values {
                synopsis.add(v.as_data_ref());
            }
            for op in [RelOp::Eq, RelOp::Ne, RelOp::Lt, RelOp::Le, RelOp::Gt, RelOp::Ge] {
                for rhs in (0..64).map(Data::Count) {
                    let rows: Vec<bool> = values
                        .iter()
                        .map(|v| !v.is_nil() && evaluate(v.as_data_ref(), op, &rhs))
                        .collect();
                    match synopsis.lookup(op, &rhs) {
                        Some(false) => {
                            assert!(
                                rows.iter().all(|m| !m),
                                "{op} {rhs} ruled out but a row matches"
                            )
                        }
                        Some(true) => {
                            assert!(
                                rows.iter().all(|m| *m),
                                "{op} {rhs} claimed universal but a row fails"
                            )
                        }
                        None => {}
                    }
                }
            }
        }
    }
}
