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

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::{Buf, BufMut};

use spyglass_common::bitmap::Bitmap;
use spyglass_common::error::{Error, Result};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::{put_str, take_str, take_u32, take_u64};
use spyglass_common::types::{Data, DataRef};

/// An inverted index over a string or pattern column: each distinct
/// term maps to the rows carrying it. Pattern cells are keyed by their
/// source text.
#[derive(Debug, Default)]
pub struct StringIndex {
    base: u64,
    rows: u64,
    present: Bitmap,
    terms: BTreeMap<String, Bitmap>,
}

impl StringIndex {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            rows: base,
            ..Default::default()
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
        let term = match value {
            None | Some(DataRef::Nil) => return Ok(()),
            Some(DataRef::Str(s)) => s,
            Some(DataRef::Pattern(p)) => p.source(),
            Some(other) => {
                return Err(Error::type_clash(format!(
                    "{} does not belong to a string index",
                    other.kind_name()
                )))
            }
        };
        self.present.insert(row);
        self.terms.entry(term.to_owned()).or_default().insert(row);
        Ok(())
    }

    fn term_of(rhs: &Data) -> Option<&str> {
        match rhs {
            Data::Str(s) => Some(s),
            Data::Pattern(p) => Some(p.source()),
            _ => None,
        }
    }

    fn equal_to(&self, term: &str) -> Bitmap {
        self.terms.get(term).cloned().unwrap_or_default()
    }

    /// Union of all terms accepted by `filter`.
    fn union_where(&self, mut filter: impl FnMut(&str) -> bool) -> Bitmap {
        let mut out = Bitmap::new();
        for (term, rows) in &self.terms {
            if filter(term) {
                out = &out | rows;
            }
        }
        out
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
            (RelOp::Match | RelOp::NotMatch, Data::Pattern(pattern)) => {
                let matched = self.union_where(|term| pattern.matches(term));
                Ok(match op {
                    RelOp::Match => matched,
                    _ => &self.present - &matched,
                })
            }
            // Substring containment: the row's term inside the probe.
            (RelOp::In | RelOp::NotIn, Data::Str(haystack)) => {
                let matched = self.union_where(|term| haystack.contains(term));
                Ok(match op {
                    RelOp::In => matched,
                    _ => &self.present - &matched,
                })
            }
            _ => {
                let Some(term) = Self::term_of(rhs) else {
                    return Err(Error::invalid_argument(format!(
                        "cannot probe a string index with {}",
                        rhs.kind_name()
                    )));
                };
                match op {
                    RelOp::Eq => Ok(self.equal_to(term)),
                    RelOp::Ne => Ok(&self.present - &self.equal_to(term)),
                    RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
                        let range = match op {
                            RelOp::Lt => (Bound::Unbounded, Bound::Excluded(term.to_owned())),
                            RelOp::Le => (Bound::Unbounded, Bound::Included(term.to_owned())),
                            RelOp::Gt => (Bound::Excluded(term.to_owned()), Bound::Unbounded),
                            _ => (Bound::Included(term.to_owned()), Bound::Unbounded),
                        };
                        let mut out = Bitmap::new();
                        for (_, rows) in self.terms.range(range) {
                            out = &out | rows;
                        }
                        Ok(out)
                    }
                    op => Err(Error::invalid_argument(format!("{op} on a string column"))),
                }
            }
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.base);
        buf.put_u64_le(self.rows);
        self.present.encode_to(buf);
        buf.put_u32_le(self.terms.len() as u32);
        for (term, rows) in &self.terms {
            put_str(term, buf);
            rows.encode_to(buf);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let base = take_u64(buf)?;
        let rows = take_u64(buf)?;
        let present = Bitmap::decode_from(buf)?;
        let n_terms = take_u32(buf)? as usize;
        let mut terms = BTreeMap::new();
        for _ in 0..n_terms {
            let term = take_str(buf)?;
            let rows = Bitmap::decode_from(buf)?;
            terms.insert(term, rows);
        }
        Ok(Self {
            base,
            rows,
            present,
            terms,
        })
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.present.mem_usage()
            + self
                .terms
                .iter()
                .map(|(term, rows)| term.capacity() + rows.mem_usage())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use spyglass_common::types::Pattern;

    use super::*;

    fn build(values: &[Option<&str>]) -> StringIndex {
        let mut index = StringIndex::new(0);
        for v in values {
            index.append(v.map(DataRef::Str)).unwrap();
        }
        index
    }

    #[test]
    fn test_equality() {
        let index = build(&[Some("ssh"), Some("dns"), None, Some("ssh")]);
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Str("ssh".into())).unwrap().ids().collect::<Vec<_>>(),
            [0, 3]
        );
        assert_eq!(
            index.lookup(RelOp::Ne, &Data::Str("ssh".into())).unwrap().ids().collect::<Vec<_>>(),
            [1]
        );
        assert!(index
            .lookup(RelOp::Eq, &Data::Str("http".into()))
            .unwrap()
            .is_empty());
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Nil).unwrap().ids().collect::<Vec<_>>(),
            [2]
        );
    }

    #[test]
    fn test_pattern_match() {
        let index = build(&[Some("conn.log"), Some("dns.log"), Some("x509")]);
        let pattern = Data::Pattern(Pattern::new(r"\.log$").unwrap());
        assert_eq!(
            index.lookup(RelOp::Match, &pattern).unwrap().ids().collect::<Vec<_>>(),
            [0, 1]
        );
        assert_eq!(
            index.lookup(RelOp::NotMatch, &pattern).unwrap().ids().collect::<Vec<_>>(),
            [2]
        );
    }

    #[test]
    fn test_membership_and_substring() {
        let index = build(&[Some("A"), Some("B"), Some("C")]);
        let list = Data::List(vec![Data::Str("A".into()), Data::Str("C".into())]);
        assert_eq!(
            index.lookup(RelOp::In, &list).unwrap().ids().collect::<Vec<_>>(),
            [0, 2]
        );
        assert_eq!(
            index.lookup(RelOp::In, &Data::Str("ABBA".into())).unwrap().ids().collect::<Vec<_>>(),
            [0, 1]
        );
    }

    #[test]
    fn test_ordering_uses_term_ranges() {
        let index = build(&[Some("a"), Some("b"), Some("c")]);
        assert_eq!(
            index.lookup(RelOp::Le, &Data::Str("b".into())).unwrap().ids().collect::<Vec<_>>(),
            [0, 1]
        );
        assert_eq!(
            index.lookup(RelOp::Gt, &Data::Str("a".into())).unwrap().ids().collect::<Vec<_>>(),
            [1, 2]
        );
    }

    #[test]
    fn test_round_trip() {
        let index = build(&[Some("x"), None, Some("y")]);
        let mut buf = Vec::new();
        index.encode_to(&mut buf);
        let decoded = StringIndex::decode_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.rows(), index.rows());
        assert_eq!(
            decoded.lookup(RelOp::Eq, &Data::Str("y".into())).unwrap().ids().collect::<Vec<_>>(),
            [2]
        );
        assert_eq!(decoded.nulls().ids().collect::<Vec<_>>(), [1]);
    }
}
