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

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use spyglass_common::error::{Error, Result};
use spyglass_common::expr::{compare, RelOp};
use spyglass_common::types::value_encoding::take_u8;
use spyglass_common::types::{Data, DataRef};

/// The `(min, max)` synopsis for ordered scalar columns.
///
/// `any_nil` blocks every `Some(true)` answer: a nil row satisfies no
/// relational predicate, so "every row matches" can only be claimed for
/// columns without nils.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MinMaxSynopsis {
    min: Option<Data>,
    max: Option<Data>,
    any_nil: bool,
}

impl MinMaxSynopsis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: DataRef<'_>) {
        if value.is_nil() {
            self.any_nil = true;
            return;
        }
        let value = value.to_owned_data();
        match &self.min {
            None => self.min = Some(value.clone()),
            Some(min) => {
                if compare(value.as_data_ref(), min.as_data_ref()) == Some(Ordering::Less) {
                    self.min = Some(value.clone());
                }
            }
        }
        match &self.max {
            None => self.max = Some(value),
            Some(max) => {
                if compare(value.as_data_ref(), max.as_data_ref()) == Some(Ordering::Greater) {
                    self.max = Some(value);
                }
            }
        }
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Option<bool> {
        if rhs.is_nil() {
            // Nil matching is the value index's business.
            return None;
        }
        let (Some(min), Some(max)) = (&self.min, &self.max) else {
            // No values at all: no relational predicate can match.
            return Some(false);
        };
        if let RelOp::In | RelOp::NotIn = op {
            return match rhs {
                Data::List(elements) => {
                    let any_candidate = elements.iter().any(|e| {
                        !e.is_nil() && self.lookup(RelOp::Eq, e) != Some(false)
                    });
                    match (op, any_candidate) {
                        (RelOp::In, false) => Some(false),
                        _ => None,
                    }
                }
                _ => None,
            };
        }
        // A differently-tagged rhs cannot equal or order against any
        // value of this column.
        let Some(versus_min) = compare(rhs.as_data_ref(), min.as_data_ref()) else {
            return Some(false);
        };
        let versus_max = compare(rhs.as_data_ref(), max.as_data_ref())
            .expect("min and max share a variant");
        let exact = !self.any_nil;
        let single = versus_min.is_eq() && versus_max.is_eq();
        match op {
            RelOp::Eq => {
                if versus_min.is_lt() || versus_max.is_gt() {
                    Some(false)
                } else if single && exact {
                    Some(true)
                } else {
                    None
                }
            }
            RelOp::Ne => {
                if single && exact {
                    Some(false)
                } else if (versus_min.is_lt() || versus_max.is_gt()) && exact {
                    Some(true)
                } else {
                    None
                }
            }
            // x < rhs
            RelOp::Lt => {
                if versus_min.is_le() {
                    Some(false)
                } else if versus_max.is_gt() && exact {
                    Some(true)
                } else {
                    None
                }
            }
            // x <= rhs
            RelOp::Le => {
                if versus_min.is_lt() {
                    Some(false)
                } else if versus_max.is_ge() && exact {
                    Some(true)
                } else {
                    None
                }
            }
            // x > rhs
            RelOp::Gt => {
                if versus_max.is_ge() {
                    Some(false)
                } else if versus_min.is_lt() && exact {
                    Some(true)
                } else {
                    None
                }
            }
            // x >= rhs
            RelOp::Ge => {
                if versus_max.is_gt() {
                    Some(false)
                } else if versus_min.is_le() && exact {
                    Some(true)
                } else {
                    None
                }
            }
            RelOp::Match | RelOp::NotMatch | RelOp::In | RelOp::NotIn => None,
        }
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.any_nil as u8);
        for bound in [&self.min, &self.max] {
            match bound {
                Some(data) => {
                    buf.put_u8(1);
                    data.encode_to(buf);
                }
                None => buf.put_u8(0),
            }
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let any_nil = take_u8(buf)? != 0;
        let mut bounds = [None, None];
        for bound in &mut bounds {
            if take_u8(buf)? != 0 {
                *bound = Some(Data::decode_from(buf)?);
            }
        }
        let [min, max] = bounds;
        if min.is_some() != max.is_some() {
            return Err(Error::format("minmax synopsis with one bound"));
        }
        Ok(Self { min, max, any_nil })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(values: &[u64]) -> MinMaxSynopsis {
        let mut synopsis = MinMaxSynopsis::new();
        for v in values {
            synopsis.add(DataRef::Count(*v));
        }
        synopsis
    }

    #[test]
    fn test_range_decisions() {
        let s = counts(&[10, 20, 30]);
        assert_eq!(s.lookup(RelOp::Eq, &Data::Count(5)), Some(false));
        assert_eq!(s.lookup(RelOp::Eq, &Data::Count(20)), None);
        assert_eq!(s.lookup(RelOp::Lt, &Data::Count(10)), Some(false));
        assert_eq!(s.lookup(RelOp::Lt, &Data::Count(31)), Some(true));
        assert_eq!(s.lookup(RelOp::Le, &Data::Count(30)), Some(true));
        assert_eq!(s.lookup(RelOp::Gt, &Data::Count(30)), Some(false));
        assert_eq!(s.lookup(RelOp::Ge, &Data::Count(10)), Some(true));
        assert_eq!(s.lookup(RelOp::Ge, &Data::Count(11)), None);
    }

    #[test]
    fn test_single_value_equality() {
        let s = counts(&[7, 7]);
        assert_eq!(s.lookup(RelOp::Eq, &Data::Count(7)), Some(true));
        assert_eq!(s.lookup(RelOp::Ne, &Data::Count(7)), Some(false));
        assert_eq!(s.lookup(RelOp::Ne, &Data::Count(8)), Some(true));
    }

    #[test]
    fn test_nil_blocks_universal_claims() {
        let mut s = counts(&[10, 20]);
        s.add(DataRef::Nil);
        assert_eq!(s.lookup(RelOp::Lt, &Data::Count(100)), None);
        // Impossibility is unaffected by nils.
        assert_eq!(s.lookup(RelOp::Gt, &Data::Count(100)), Some(false));
    }

    #[test]
    fn test_variant_mismatch_cannot_match() {
        let s = counts(&[10]);
        assert_eq!(s.lookup(RelOp::Eq, &Data::Integer(10)), Some(false));
        assert_eq!(s.lookup(RelOp::Eq, &Data::Nil), None);
    }

    #[test]
    fn test_membership() {
        let s = counts(&[10, 20]);
        let outside = Data::List(vec![Data::Count(1), Data::Count(100)]);
        assert_eq!(s.lookup(RelOp::In, &outside), Some(false));
        let inside = Data::List(vec![Data::Count(15)]);
        assert_eq!(s.lookup(RelOp::In, &inside), None);
        assert_eq!(s.lookup(RelOp::NotIn, &outside), None);
    }

    #[test]
    fn test_empty_column() {
        let s = MinMaxSynopsis::new();
        assert_eq!(s.lookup(RelOp::Eq, &Data::Count(1)), Some(false));
    }

    #[test]
    fn test_round_trip() {
        let s = counts(&[10, 20]);
        let mut buf = Vec::new();
        s.encode_to(&mut buf);
        assert_eq!(
            MinMaxSynopsis::decode_from(&mut buf.as_slice()).unwrap(),
            s
        );
    }
}
