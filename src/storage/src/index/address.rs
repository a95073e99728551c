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

use bytes::{Buf, BufMut};

use spyglass_common::bitmap::Bitmap;
use spyglass_common::error::{Error, Result};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::take_u64;
use spyglass_common::types::{Address, Data, DataRef, Subnet};

use super::arithmetic::{ArithmeticIndex, ArithmeticKind};

/// An exact index over an address column, bit-sliced on the 16-byte
/// form: one bitmap per bit, most significant first. Equality walks all
/// 128 slices, subnet membership only the prefix.
#[derive(Debug)]
pub struct AddressIndex {
    base: u64,
    rows: u64,
    present: Bitmap,
    bits: Vec<Bitmap>,
}

/// Bit `i` of an address, counting from the most significant bit of the
/// first octet.
fn address_bit(octets: &[u8; 16], i: usize) -> bool {
    octets[i / 8] >> (7 - i % 8) & 1 == 1
}

impl AddressIndex {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            rows: base,
            present: Bitmap::new(),
            bits: (0..128).map(|_| Bitmap::new()).collect(),
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn present(&self) -> &Bitmap {
        &self.present
    }

    pub fn nulls(&self) -> Bitmap {
        let mut all = Bitmap::new();
        all.insert_range(self.base, self.rows);
        &all - &self.present
    }

    pub fn skip_to(&mut self, row: u64) {
        self.rows = self.rows.max(row);
    }

    pub fn append(&mut self, value: Option<DataRef<'_>>) -> Result<()> {
        let row = self.rows;
        self.rows += 1;
        let addr = match value {
            None | Some(DataRef::Nil) => return Ok(()),
            Some(DataRef::Address(addr)) => addr,
            Some(other) => {
                return Err(Error::type_clash(format!(
                    "{} does not belong to an address index",
                    other.kind_name()
                )))
            }
        };
        self.present.insert(row);
        let octets = addr.octets();
        for (i, bits) in self.bits.iter_mut().enumerate() {
            if address_bit(&octets, i) {
                bits.insert(row);
            }
        }
        Ok(())
    }

    /// Rows whose first `prefix_len` bits agree with `addr`.
    fn matching_prefix(&self, addr: &Address, prefix_len: usize) -> Bitmap {
        let octets = addr.octets();
        let mut out = self.present.clone();
        for i in 0..prefix_len.min(128) {
            out = if address_bit(&octets, i) {
                &out & &self.bits[i]
            } else {
                &out - &self.bits[i]
            };
            if out.is_empty() {
                break;
            }
        }
        out
    }

    /// `(less, equal)` against `addr` in address order, which is the
    /// lexicographic order of the 16-byte form.
    fn partition_at(&self, addr: &Address) -> (Bitmap, Bitmap) {
        let octets = addr.octets();
        let mut less = Bitmap::new();
        let mut equal = self.present.clone();
        for (i, bits) in self.bits.iter().enumerate() {
            if address_bit(&octets, i) {
                less = &less | &(&equal - bits);
                equal = &equal & bits;
            } else {
                equal = &equal - bits;
            }
            if equal.is_empty() {
                break;
            }
        }
        (less, equal)
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Result<Bitmap> {
        if rhs.is_nil() {
            return match op {
                RelOp::Eq => Ok(self.nulls()),
                RelOp::Ne => Ok(self.present.clone()),
                _ => Err(Error::invalid_argument(format!("{op} nil"))),
            };
        }
        if let Data::List(elements) = rhs {
            if !matches!(op, RelOp::In | RelOp::NotIn) {
                return Err(Error::invalid_argument(format!("{op} on a list")));
            }
            let mut matched = Bitmap::new();
            for element in elements {
                if element.is_nil() {
                    continue;
                }
                matched = &matched | &self.lookup(RelOp::Eq, element)?;
            }
            return Ok(match op {
                RelOp::In => matched,
                _ => &self.present - &matched,
            });
        }
        match (op, rhs) {
            (RelOp::Eq, Data::Address(addr)) => Ok(self.matching_prefix(addr, 128)),
            (RelOp::Ne, Data::Address(addr)) => {
                Ok(&self.present - &self.matching_prefix(addr, 128))
            }
            (RelOp::Lt, Data::Address(addr)) => Ok(self.partition_at(addr).0),
            (RelOp::Le, Data::Address(addr)) => {
                let (less, equal) = self.partition_at(addr);
                Ok(&less | &equal)
            }
            (RelOp::Gt, Data::Address(addr)) => {
                let (less, equal) = self.partition_at(addr);
                Ok(&(&self.present - &less) - &equal)
            }
            (RelOp::Ge, Data::Address(addr)) => {
                Ok(&self.present - &self.partition_at(addr).0)
            }
            (RelOp::In, Data::Subnet(net)) => {
                Ok(self.matching_prefix(&net.network(), net.length() as usize))
            }
            (RelOp::NotIn, Data::Subnet(net)) => {
                Ok(&self.present - &self.matching_prefix(&net.network(), net.length() as usize))
            }
            (op, rhs) => Err(Error::invalid_argument(format!(
                "cannot probe an address index with {op} {}",
                rhs.kind_name()
            ))),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.base);
        buf.put_u64_le(self.rows);
        self.present.encode_to(buf);
        for bits in &self.bits {
            bits.encode_to(buf);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let base = take_u64(buf)?;
        let rows = take_u64(buf)?;
        let present = Bitmap::decode_from(buf)?;
        let mut bits = Vec::with_capacity(128);
        for _ in 0..128 {
            bits.push(Bitmap::decode_from(buf)?);
        }
        Ok(Self {
            base,
            rows,
            present,
            bits,
        })
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.present.mem_usage()
            + self.bits.iter().map(Bitmap::mem_usage).sum::<usize>()
    }
}

/// An index over a subnet column: the network addresses bit-sliced like
/// an address column, plus an arithmetic index over the prefix lengths.
#[derive(Debug)]
pub struct SubnetIndex {
    network: AddressIndex,
    length: ArithmeticIndex,
}

impl SubnetIndex {
    pub fn new(base: u64) -> Self {
        Self {
            network: AddressIndex::new(base),
            length: ArithmeticIndex::new(ArithmeticKind::Count, base),
        }
    }

    pub fn rows(&self) -> u64 {
        self.network.rows()
    }

    pub fn present(&self) -> &Bitmap {
        self.network.present()
    }

    pub fn nulls(&self) -> Bitmap {
        self.network.nulls()
    }

    pub fn skip_to(&mut self, row: u64) {
        self.network.skip_to(row);
        self.length.skip_to(row);
    }

    pub fn append(&mut self, value: Option<DataRef<'_>>) -> Result<()> {
        match value {
            None | Some(DataRef::Nil) => {
                self.network.append(None)?;
                self.length.append(None)
            }
            Some(DataRef::Subnet(net)) => {
                self.network
                    .append(Some(DataRef::Address(net.network())))?;
                self.length
                    .append(Some(DataRef::Count(net.length() as u64)))
            }
            Some(other) => Err(Error::type_clash(format!(
                "{} does not belong to a subnet index",
                other.kind_name()
            ))),
        }
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Result<Bitmap> {
        if rhs.is_nil() {
            return match op {
                RelOp::Eq => Ok(self.nulls()),
                RelOp::Ne => Ok(self.present().clone()),
                _ => Err(Error::invalid_argument(format!("{op} nil"))),
            };
        }
        let equal_to = |net: &Subnet| -> Result<Bitmap> {
            let networks = self
                .network
                .lookup(RelOp::Eq, &Data::Address(net.network()))?;
            let lengths = self
                .length
                .lookup(RelOp::Eq, &Data::Count(net.length() as u64))?;
            Ok(&networks & &lengths)
        };
        match (op, rhs) {
            (RelOp::Eq, Data::Subnet(net)) => equal_to(net),
            (RelOp::Ne, Data::Subnet(net)) => Ok(&self.present().clone() - &equal_to(net)?),
            // Subnets contained in the probe: network inside it and at
            // least as specific.
            (RelOp::In, Data::Subnet(net)) => {
                let networks = self.network.lookup(RelOp::In, rhs)?;
                let lengths = self
                    .length
                    .lookup(RelOp::Ge, &Data::Count(net.length() as u64))?;
                Ok(&networks & &lengths)
            }
            (RelOp::NotIn, Data::Subnet(net)) => {
                let networks = self.network.lookup(RelOp::In, rhs)?;
                let lengths = self
                    .length
                    .lookup(RelOp::Ge, &Data::Count(net.length() as u64))?;
                Ok(&self.present().clone() - &(&networks & &lengths))
            }
            (RelOp::In | RelOp::NotIn, Data::List(elements)) => {
                let mut matched = Bitmap::new();
                for element in elements {
                    if element.is_nil() {
                        continue;
                    }
                    matched = &matched | &self.lookup(RelOp::Eq, element)?;
                }
                Ok(match op {
                    RelOp::In => matched,
                    _ => &self.present().clone() - &matched,
                })
            }
            (op, rhs) => Err(Error::invalid_argument(format!(
                "cannot probe a subnet index with {op} {}",
                rhs.kind_name()
            ))),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        self.network.encode_to(buf);
        self.length.encode_to(buf);
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let network = AddressIndex::decode_from(buf)?;
        let length = ArithmeticIndex::decode_from(buf)?;
        Ok(Self { network, length })
    }

    pub fn mem_usage(&self) -> usize {
        self.network.mem_usage() + self.length.mem_usage()
    }
}
