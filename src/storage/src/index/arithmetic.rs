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
use spyglass_common::types::value_encoding::{take_u64, take_u8};
use spyglass_common::types::{Data, DataRef};

/// The scalar domains an [`ArithmeticIndex`] can hold. Each maps its
/// values onto `u64` keys preserving the value order, so one bit-sliced
/// representation serves them all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticKind {
    Bool,
    Integer,
    Count,
    Real,
    Time,
    Duration,
    Enumeration,
}

impl ArithmeticKind {
    fn to_tag(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Integer => 1,
            Self::Count => 2,
            Self::Real => 3,
            Self::Time => 4,
            Self::Duration => 5,
            Self::Enumeration => 6,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::Bool,
            1 => Self::Integer,
            2 => Self::Count,
            3 => Self::Real,
            4 => Self::Time,
            5 => Self::Duration,
            6 => Self::Enumeration,
            tag => return Err(Error::format(format!("unknown arithmetic kind: {tag}"))),
        })
    }

    /// The order-preserving key of a value, or `None` if the value does
    /// not belong to this domain.
    fn key_of(self, value: DataRef<'_>) -> Option<u64> {
        match (self, value) {
            (Self::Bool, DataRef::Bool(v)) => Some(v as u64),
            (Self::Integer, DataRef::Integer(v)) => Some(offset_signed(v)),
            (Self::Count, DataRef::Count(v)) => Some(v),
            (Self::Real, DataRef::Real(v)) => Some(order_f64(v.get())),
            (Self::Time, DataRef::Time(v)) => Some(offset_signed(v.as_nanos())),
            (Self::Duration, DataRef::Duration(v)) => Some(offset_signed(v.as_nanos())),
            (Self::Enumeration, DataRef::Enum(v)) => Some(v as u64),
            _ => None,
        }
    }
}

/// Shift the signed range onto `u64` keeping the order.
fn offset_signed(value: i64) -> u64 {
    (value as u64) ^ (1 << 63)
}

/// The classic total-order embedding of IEEE doubles: flip all bits of
/// negatives and the sign bit of non-negatives. Matches `f64::total_cmp`.
fn order_f64(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

/// An exact index over an ordered scalar column, as 64 bit-position
/// bitmaps. Equality and range predicates cost a constant number of
/// bitmap operations in the key width, independent of the row count.
#[derive(Debug)]
pub struct ArithmeticIndex {
    kind: ArithmeticKind,
    /// First row id this index describes.
    base: u64,
    /// One past the last row id described.
    rows: u64,
    /// Rows holding a non-nil value.
    present: Bitmap,
    /// `bits[i]` holds the rows whose key has bit `i` set.
    bits: Vec<Bitmap>,
}

impl ArithmeticIndex {
    pub fn new(kind: ArithmeticKind, base: u64) -> Self {
        Self {
            kind,
            base,
            rows: base,
            present: Bitmap::new(),
            bits: (0..64).map(|_| Bitmap::new()).collect(),
        }
    }

    pub fn kind(&self) -> ArithmeticKind {
        self.kind
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn present(&self) -> &Bitmap {
        &self.present
    }

    /// Rows with no value: everything described but not present.
    pub fn nulls(&self) -> Bitmap {
        let mut all = Bitmap::new();
        all.insert_range(self.base, self.rows);
        &all - &self.present
    }

    /// Jump forward so the next appended value lands at row `row`.
    pub fn skip_to(&mut self, row: u64) {
        self.rows = self.rows.max(row);
    }

    /// Append the value of the next row; `None` and nil both mean the
    /// row has no value.
    pub fn append(&mut self, value: Option<DataRef<'_>>) -> Result<()> {
        let row = self.rows;
        self.rows += 1;
        let Some(value) = value else {
            return Ok(());
        };
        if value.is_nil() {
            return Ok(());
        }
        let key = self.kind.key_of(value).ok_or_else(|| {
            Error::type_clash(format!(
                "{} does not belong to a {:?} index",
                value.kind_name(),
                self.kind
            ))
        })?;
        self.present.insert(row);
        for (i, bits) in self.bits.iter_mut().enumerate() {
            if key >> i & 1 == 1 {
                bits.insert(row);
            }
        }
        Ok(())
    }

    /// Rows whose key equals `key`.
    fn matching(&self, key: u64) -> Bitmap {
        let mut out = self.present.clone();
        for (i, bits) in self.bits.iter().enumerate() {
            out = if key >> i & 1 == 1 {
                &out & bits
            } else {
                &out - bits
            };
            if out.is_empty() {
                break;
            }
        }
        out
    }

    /// Partition the present rows into `(less, equal)` against `key`,
    /// walking the slices from the most significant bit down.
    fn partition_at(&self, key: u64) -> (Bitmap, Bitmap) {
        let mut less = Bitmap::new();
        let mut equal = self.present.clone();
        for i in (0..64).rev() {
            if key >> i & 1 == 1 {
                less = &less | &(&equal - &self.bits[i]);
                equal = &equal & &self.bits[i];
            } else {
                equal = &equal - &self.bits[i];
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
                // A nil element matches no row.
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
        let key = self.kind.key_of(rhs.as_data_ref()).ok_or_else(|| {
            Error::invalid_argument(format!(
                "cannot probe a {:?} index with {}",
                self.kind,
                rhs.kind_name()
            ))
        })?;
        match op {
            RelOp::Eq => Ok(self.matching(key)),
            RelOp::Ne => Ok(&self.present - &self.matching(key)),
            RelOp::Lt => Ok(self.partition_at(key).0),
            RelOp::Le => {
                let (less, equal) = self.partition_at(key);
                Ok(&less | &equal)
            }
            RelOp::Gt => {
                let (less, equal) = self.partition_at(key);
                Ok(&(&self.present - &less) - &equal)
            }
            RelOp::Ge => Ok(&self.present - &self.partition_at(key).0),
            op => Err(Error::invalid_argument(format!(
                "{op} on a {:?} column",
                self.kind
            ))),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind.to_tag());
        buf.put_u64_le(self.base);
        buf.put_u64_le(self.rows);
        self.present.encode_to(buf);
        for bits in &self.bits {
            bits.encode_to(buf);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let kind = ArithmeticKind::from_tag(take_u8(buf)?)?;
        let base = take_u64(buf)?;
        let rows = take_u64(buf)?;
        let present = Bitmap::decode_from(buf)?;
        let mut bits = Vec::with_capacity(64);
        for _ in 0..64 {
            bits.push(Bitmap::decode_from(buf)?);
        }
        Ok(Self {
            kind,
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

#[cfg(test)]
mod tests {
    use spyglass_common::expr::evaluate;

    use super::*;

    fn build(values: &[Option<i64>]) -> ArithmeticIndex {
        let mut index = ArithmeticIndex::new(ArithmeticKind::Integer, 0);
        for v in values {
            index
                .append(v.map(DataRef::Integer))
                .unwrap();
        }
        index
    }

    #[test]
    fn test_equality_and_range() {
        let index = build(&[Some(3), Some(-7), None, Some(3), Some(100)]);
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Integer(3)).unwrap().ids().collect::<Vec<_>>(),
            [0, 3]
        );
        assert_eq!(
            index.lookup(RelOp::Lt, &Data::Integer(3)).unwrap().ids().collect::<Vec<_>>(),
            [1]
        );
        assert_eq!(
            index.lookup(RelOp::Ge, &Data::Integer(3)).unwrap().ids().collect::<Vec<_>>(),
            [0, 3, 4]
        );
        // Nulls match only `== nil`.
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Nil).unwrap().ids().collect::<Vec<_>>(),
            [2]
        );
        assert_eq!(
            index.lookup(RelOp::Ne, &Data::Integer(3)).unwrap().ids().collect::<Vec<_>>(),
            [1, 4]
        );
    }

    #[test]
    fn test_membership() {
        let index = build(&[Some(1), Some(2), Some(3)]);
        let list = Data::List(vec![Data::Integer(1), Data::Integer(3)]);
        assert_eq!(
            index.lookup(RelOp::In, &list).unwrap().ids().collect::<Vec<_>>(),
            [0, 2]
        );
        assert_eq!(
            index.lookup(RelOp::NotIn, &list).unwrap().ids().collect::<Vec<_>>(),
            [1]
        );
    }

    #[test]
    fn test_invalid_probes() {
        let index = build(&[Some(1)]);
        assert!(index.lookup(RelOp::Eq, &Data::Count(1)).is_err());
        assert!(index.lookup(RelOp::Match, &Data::Integer(1)).is_err());
        assert!(index.lookup(RelOp::Lt, &Data::Nil).is_err());
    }

    #[test]
    fn test_skipping_and_base() {
        let mut index = ArithmeticIndex::new(ArithmeticKind::Count, 100);
        index.append(Some(DataRef::Count(5))).unwrap();
        index.skip_to(110);
        index.append(Some(DataRef::Count(6))).unwrap();
        assert_eq!(
            index.lookup(RelOp::Ge, &Data::Count(5)).unwrap().ids().collect::<Vec<_>>(),
            [100, 110]
        );
        let nulls: Vec<u64> = index.nulls().ids().collect();
        assert_eq!(nulls, (101..110).collect::<Vec<_>>());
    }

    /// Exactness against row-by-row evaluation over random data.
    #[test]
    fn test_matches_row_evaluation() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(99);
        for kind in [ArithmeticKind::Integer, ArithmeticKind::Count, ArithmeticKind::Real] {
            let values: Vec<Option<Data>> = (0..200)
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        None
                    } else {
                        Some(match kind {
                            ArithmeticKind::Integer => Data::Integer(rng.gen_range(-50..50)),
                            ArithmeticKind::Count => Data::Count(rng.gen_range(0..100)),
                            ArithmeticKind::Real => {
                                Data::Real((rng.gen_range(-50..50) as f64 / 2.0).into())
                            }
                            _ => unreachable!(),
                        })
                    }
                })
                .collect();
            let mut index = ArithmeticIndex::new(kind, 0);
            for v in &values {
                index.append(v.as_ref().map(|d| d.as_data_ref())).unwrap();
            }
            for op in [RelOp::Eq, RelOp::Ne, RelOp::Lt, RelOp::Le, RelOp::Gt, RelOp::Ge] {
                for _ in 0..32 {
                    let rhs = match kind {
                        ArithmeticKind::Integer => Data::Integer(rng.gen_range(-50..50)),
                        ArithmeticKind::Count => Data::Count(rng.gen_range(0..100)),
                        ArithmeticKind::Real => {
                            Data::Real((rng.gen_range(-50..50) as f64 / 2.0).into())
                        }
                        _ => unreachable!(),
                    };
                    let expected: Vec<u64> = values
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| {
                            v.as_ref()
                                .is_some_and(|v| evaluate(v.as_data_ref(), op, &rhs))
                        })
                        .map(|(i, _)| i as u64)
                        .collect();
                    let got: Vec<u64> =
                        index.lookup(op, &rhs).unwrap().ids().collect();
                    assert_eq!(got, expected, "{kind:?} {op} {rhs}");
                }
            }
        }
    }
}
