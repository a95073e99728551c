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

//! Exact per-column inverted indexes.
//!
//! A value index answers a relational predicate with the precise bitmap
//! of matching row ids. Appending skips forward automatically, so a
//! column that only exists in some stretches of a partition stays
//! addressable by global id; skipped rows are "null" and match nothing
//! but `== nil`.

mod address;
mod arithmetic;
mod container;
mod string;

use bytes::{Buf, BufMut};

pub use self::address::{AddressIndex, SubnetIndex};
pub use self::arithmetic::{ArithmeticIndex, ArithmeticKind};
pub use self::container::{ListIndex, NullIndex};
pub use self::string::StringIndex;

use spyglass_common::bitmap::Bitmap;
use spyglass_common::error::{Error, Result};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::take_u8;
use spyglass_common::types::{Data, DataRef, Type, TypeKind};

mod tag {
    pub const ARITHMETIC: u8 = 0;
    pub const STRING: u8 = 1;
    pub const ADDRESS: u8 = 2;
    pub const SUBNET: u8 = 3;
    pub const LIST: u8 = 4;
    pub const NULL: u8 = 5;
}

#[derive(Debug)]
enum IndexRepr {
    Arithmetic(ArithmeticIndex),
    Str(StringIndex),
    Address(AddressIndex),
    Subnet(SubnetIndex),
    List(Box<ListIndex>),
    Null(NullIndex),
}

/// A per-column value index, dispatched by the column's type.
#[derive(Debug)]
pub struct ValueIndex {
    repr: IndexRepr,
    /// Number of served probes, counted so tests can observe that a
    /// synopsis verdict short-circuited the index.
    #[cfg(test)]
    pub(crate) probes: std::sync::atomic::AtomicU64,
}

impl ValueIndex {
    fn wrap(repr: IndexRepr) -> Self {
        Self {
            repr,
            #[cfg(test)]
            probes: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// The index for a column of `ty`, addressing rows from `base` on.
    pub fn for_type(ty: &Type, base: u64) -> Self {
        let repr = match ty.resolved().kind() {
            TypeKind::Bool => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Bool, base))
            }
            TypeKind::Integer => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Integer, base))
            }
            TypeKind::Count => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Count, base))
            }
            TypeKind::Real => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Real, base))
            }
            TypeKind::Time => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Time, base))
            }
            TypeKind::Duration => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Duration, base))
            }
            TypeKind::Enumeration(_) => {
                IndexRepr::Arithmetic(ArithmeticIndex::new(ArithmeticKind::Enumeration, base))
            }
            TypeKind::Str | TypeKind::Pattern => IndexRepr::Str(StringIndex::new(base)),
            TypeKind::Address => IndexRepr::Address(AddressIndex::new(base)),
            TypeKind::Subnet => IndexRepr::Subnet(SubnetIndex::new(base)),
            TypeKind::List(element) => {
                IndexRepr::List(Box::new(ListIndex::new((**element).clone(), base)))
            }
            // Map indexing is blocked on settling key/value semantics;
            // for now only nil probes work.
            TypeKind::Map(..) => IndexRepr::Null(NullIndex::new(base)),
            TypeKind::Record(_) => IndexRepr::Null(NullIndex::new(base)),
            TypeKind::Alias(..) => unreachable!("resolved"),
        };
        Self::wrap(repr)
    }

    /// One past the last row this index describes.
    pub fn rows(&self) -> u64 {
        match &self.repr {
            IndexRepr::Arithmetic(i) => i.rows(),
            IndexRepr::Str(i) => i.rows(),
            IndexRepr::Address(i) => i.rows(),
            IndexRepr::Subnet(i) => i.rows(),
            IndexRepr::List(i) => i.rows(),
            IndexRepr::Null(i) => i.rows(),
        }
    }

    /// Rows carrying a non-nil value.
    pub fn present(&self) -> &Bitmap {
        match &self.repr {
            IndexRepr::Arithmetic(i) => i.present(),
            IndexRepr::Str(i) => i.present(),
            IndexRepr::Address(i) => i.present(),
            IndexRepr::Subnet(i) => i.present(),
            IndexRepr::List(i) => i.present(),
            IndexRepr::Null(i) => i.present(),
        }
    }

    pub fn skip_to(&mut self, row: u64) {
        match &mut self.repr {
            IndexRepr::Arithmetic(i) => i.skip_to(row),
            IndexRepr::Str(i) => i.skip_to(row),
            IndexRepr::Address(i) => i.skip_to(row),
            IndexRepr::Subnet(i) => i.skip_to(row),
            IndexRepr::List(i) => i.skip_to(row),
            IndexRepr::Null(i) => i.skip_to(row),
        }
    }

    /// Append the next row's value. `None` and nil are both "no value".
    pub fn append(&mut self, value: Option<DataRef<'_>>) -> Result<()> {
        match &mut self.repr {
            IndexRepr::Arithmetic(i) => i.append(value),
            IndexRepr::Str(i) => i.append(value),
            IndexRepr::Address(i) => i.append(value),
            IndexRepr::Subnet(i) => i.append(value),
            IndexRepr::List(i) => i.append(value),
            IndexRepr::Null(i) => i.append(value),
        }
    }

    /// The exact set of rows satisfying `op rhs`.
    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Result<Bitmap> {
        #[cfg(test)]
        self.probes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        match &self.repr {
            IndexRepr::Arithmetic(i) => i.lookup(op, rhs),
            IndexRepr::Str(i) => i.lookup(op, rhs),
            IndexRepr::Address(i) => i.lookup(op, rhs),
            IndexRepr::Subnet(i) => i.lookup(op, rhs),
            IndexRepr::List(i) => i.lookup(op, rhs),
            IndexRepr::Null(i) => i.lookup(op, rhs),
        }
    }

    pub fn mem_usage(&self) -> usize {
        match &self.repr {
            IndexRepr::Arithmetic(i) => i.mem_usage(),
            IndexRepr::Str(i) => i.mem_usage(),
            IndexRepr::Address(i) => i.mem_usage(),
            IndexRepr::Subnet(i) => i.mem_usage(),
            IndexRepr::List(i) => i.mem_usage(),
            IndexRepr::Null(i) => i.mem_usage(),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        match &self.repr {
            IndexRepr::Arithmetic(i) => {
                buf.put_u8(tag::ARITHMETIC);
                i.encode_to(buf);
            }
            IndexRepr::Str(i) => {
                buf.put_u8(tag::STRING);
                i.encode_to(buf);
            }
            IndexRepr::Address(i) => {
                buf.put_u8(tag::ADDRESS);
                i.encode_to(buf);
            }
            IndexRepr::Subnet(i) => {
                buf.put_u8(tag::SUBNET);
                i.encode_to(buf);
            }
            IndexRepr::List(i) => {
                buf.put_u8(tag::LIST);
                i.encode_to(buf);
            }
            IndexRepr::Null(i) => {
                buf.put_u8(tag::NULL);
                i.encode_to(buf);
            }
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let repr = match take_u8(buf)? {
            tag::ARITHMETIC => IndexRepr::Arithmetic(ArithmeticIndex::decode_from(buf)?),
            tag::STRING => IndexRepr::Str(StringIndex::decode_from(buf)?),
            tag::ADDRESS => IndexRepr::Address(AddressIndex::decode_from(buf)?),
            tag::SUBNET => IndexRepr::Subnet(SubnetIndex::decode_from(buf)?),
            tag::LIST => IndexRepr::List(Box::new(ListIndex::decode_from(buf)?)),
            tag::NULL => IndexRepr::Null(NullIndex::decode_from(buf)?),
            tag => return Err(Error::format(format!("unknown index tag: {tag}"))),
        };
        Ok(Self::wrap(repr))
    }
}
