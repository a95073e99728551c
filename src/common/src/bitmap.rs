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

//! A run-length compressed set of event ids.
//!
//! Ids cluster heavily (a predicate tends to match long stretches of a
//! partition or none of it), so the set is kept as sorted, disjoint,
//! non-adjacent `[start, end)` runs. All set algebra is a linear merge
//! over runs, independent of how many ids they cover.

use std::fmt;
use std::ops::{BitAnd, BitOr, Sub};

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::types::value_encoding::{take_u32, take_u64};

#[derive(Clone, Copy, PartialEq, Eq)]
struct Run {
    start: u64,
    end: u64,
}

/// An ordered set of 64-bit ids with append semantics: `push` adds a bit
/// at the current length, like a growing bit vector.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    runs: Vec<Run>,
    /// One past the highest position this bitmap describes. Tracked so
    /// that `push` knows where the next appended bit lands.
    length: u64,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full universe `[0, n)`.
    pub fn all(n: u64) -> Self {
        let mut bitmap = Self::new();
        bitmap.insert_range(0, n);
        bitmap
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of bits appended or covered so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn cardinality(&self) -> u64 {
        self.runs.iter().map(|r| r.end - r.start).sum()
    }

    pub fn min(&self) -> Option<u64> {
        self.runs.first().map(|r| r.start)
    }

    pub fn max(&self) -> Option<u64> {
        self.runs.last().map(|r| r.end - 1)
    }

    pub fn contains(&self, id: u64) -> bool {
        match self.runs.binary_search_by(|r| {
            if id < r.start {
                std::cmp::Ordering::Greater
            } else if id >= r.end {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    pub fn insert(&mut self, id: u64) {
        self.insert_range(id, id + 1);
    }

    /// Insert all ids in `[start, end)`.
    pub fn insert_range(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        self.length = self.length.max(end);
        // Find the insertion window: all runs that touch [start, end].
        let lo = self.runs.partition_point(|r| r.end < start);
        let hi = self.runs.partition_point(|r| r.start <= end);
        if lo == hi {
            self.runs.insert(lo, Run { start, end });
            return;
        }
        let merged = Run {
            start: start.min(self.runs[lo].start),
            end: end.max(self.runs[hi - 1].end),
        };
        self.runs.splice(lo..hi, [merged]);
    }

    /// Append one bit at the current length.
    pub fn push(&mut self, bit: bool) {
        if bit {
            self.insert(self.length);
        } else {
            self.length += 1;
        }
    }

    /// Append `n` identical bits.
    pub fn append_bits(&mut self, n: u64, bit: bool) {
        if bit {
            self.insert_range(self.length, self.length + n);
        } else {
            self.length += n;
        }
    }

    /// Grow the length to `n` without setting bits.
    pub fn skip_to(&mut self, n: u64) {
        self.length = self.length.max(n);
    }

    /// Number of set ids strictly below `pos`, so that
    /// `rank(max + 1) == cardinality()`.
    pub fn rank(&self, pos: u64) -> u64 {
        self.runs
            .iter()
            .take_while(|r| r.start < pos)
            .map(|r| r.end.min(pos) - r.start)
            .sum()
    }

    /// The `n`-th set id, zero-based.
    pub fn select(&self, n: u64) -> Option<u64> {
        let mut remaining = n;
        for run in &self.runs {
            let len = run.end - run.start;
            if remaining < len {
                return Some(run.start + remaining);
            }
            remaining -= len;
        }
        None
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.runs.iter().flat_map(|r| r.start..r.end)
    }

    /// The runs as `(start, end)` pairs, for callers that walk stretches
    /// instead of single ids.
    pub fn runs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.runs.iter().map(|r| (r.start, r.end))
    }

    /// All ids in `[0, universe)` that are not in this bitmap.
    pub fn complement_under(&self, universe: u64) -> Bitmap {
        &Bitmap::all(universe) - self
    }

    /// Whether any id in `[start, end)` is set.
    pub fn overlaps_range(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return false;
        }
        let i = self.runs.partition_point(|r| r.end <= start);
        self.runs.get(i).is_some_and(|r| r.start < end)
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.length);
        buf.put_u32_le(self.runs.len() as u32);
        for run in &self.runs {
            buf.put_u64_le(run.start);
            buf.put_u64_le(run.end);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let length = take_u64(buf)?;
        let n_runs = take_u32(buf)? as usize;
        let mut runs = Vec::with_capacity(n_runs.min(4096));
        let mut prev_end = None;
        for _ in 0..n_runs {
            let start = take_u64(buf)?;
            let end = take_u64(buf)?;
            if start >= end || prev_end.is_some_and(|p| start <= p) {
                return Err(Error::format("bitmap runs out of order"));
            }
            prev_end = Some(end);
            runs.push(Run { start, end });
        }
        Ok(Self { runs, length })
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.runs.capacity() * std::mem::size_of::<Run>()
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap[{}](", self.cardinality())?;
        for (i, run) in self.runs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if run.end == run.start + 1 {
                write!(f, "{}", run.start)?;
            } else {
                write!(f, "{}..{}", run.start, run.end)?;
            }
        }
        write!(f, ")")
    }
}

impl FromIterator<u64> for Bitmap {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        for id in iter {
            bitmap.insert(id);
        }
        bitmap
    }
}

impl BitOr for &Bitmap {
    type Output = Bitmap;

    fn bitor(self, rhs: &Bitmap) -> Bitmap {
        let mut out = Bitmap {
            runs: Vec::with_capacity(self.runs.len() + rhs.runs.len()),
            length: self.length.max(rhs.length),
        };
        let mut pending: Option<Run> = None;
        for run in merge_by_start(&self.runs, &rhs.runs) {
            match &mut pending {
                Some(p) if run.start <= p.end => p.end = p.end.max(run.end),
                Some(p) => {
                    out.runs.push(*p);
                    pending = Some(run);
                }
                None => pending = Some(run),
            }
        }
        out.runs.extend(pending);
        out
    }
}

impl BitAnd for &Bitmap {
    type Output = Bitmap;

    fn bitand(self, rhs: &Bitmap) -> Bitmap {
        let mut out = Bitmap {
            runs: Vec::new(),
            length: self.length.max(rhs.length),
        };
        let (mut i, mut j) = (0, 0);
        while i < self.runs.len() && j < rhs.runs.len() {
            let (a, b) = (self.runs[i], rhs.runs[j]);
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.runs.push(Run { start, end });
            }
            if a.end <= b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        out
    }
}

impl Sub for &Bitmap {
    type Output = Bitmap;

    fn sub(self, rhs: &Bitmap) -> Bitmap {
        let mut out = Bitmap {
            runs: Vec::new(),
            length: self.length.max(rhs.length),
        };
        let mut j = 0;
        for &a in &self.runs {
            let mut start = a.start;
            while j < rhs.runs.len() && rhs.runs[j].end <= start {
                j += 1;
            }
            let mut k = j;
            while k < rhs.runs.len() && rhs.runs[k].start < a.end {
                let b = rhs.runs[k];
                if b.start > start {
                    out.runs.push(Run {
                        start,
                        end: b.start.min(a.end),
                    });
                }
                start = start.max(b.end);
                if b.end >= a.end {
                    break;
                }
                k += 1;
            }
            if start < a.end {
                out.runs.push(Run { start, end: a.end });
            }
        }
        out
    }
}

/// Merge two sorted run slices into one sorted-by-start stream.
fn merge_by_start<'a>(a: &'a [Run], b: &'a [Run]) -> impl Iterator<Item = Run> + 'a {
    let mut i = 0;
    let mut j = 0;
    std::iter::from_fn(move || {
        let run = match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) => {
                if x.start <= y.start {
                    i += 1;
                    *x
                } else {
                    j += 1;
                    *y
                }
            }
            (Some(x), None) => {
                i += 1;
                *x
            }
            (None, Some(y)) => {
                j += 1;
                *y
            }
            (None, None) => return None,
        };
        Some(run)
    })
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    fn naive(ids: &[u64]) -> std::collections::BTreeSet<u64> {
        ids.iter().copied().collect()
    }

    fn random_bitmap(rng: &mut impl Rng, universe: u64) -> (Bitmap, Vec<u64>) {
        let ids: Vec<u64> = (0..universe).filter(|_| rng.gen_bool(0.3)).collect();
        (ids.iter().copied().collect(), ids)
    }

    #[test]
    fn test_insert_coalesces() {
        let mut b = Bitmap::new();
        b.insert(3);
        b.insert(5);
        b.insert(4);
        assert_eq!(b.runs.len(), 1);
        assert_eq!(b.cardinality(), 3);
        b.insert_range(0, 10);
        assert_eq!(b.runs.len(), 1);
        assert_eq!(b.cardinality(), 10);
    }

    #[test]
    fn test_push_and_append() {
        let mut b = Bitmap::new();
        b.push(true);
        b.push(false);
        b.push(true);
        b.append_bits(3, true);
        assert_eq!(b.ids().collect::<Vec<_>>(), [0, 2, 3, 4, 5]);
        assert_eq!(b.length(), 6);
    }

    #[test]
    fn test_rank_select() {
        let b: Bitmap = [1u64, 2, 3, 10, 20].into_iter().collect();
        assert_eq!(b.rank(0), 0);
        assert_eq!(b.rank(3), 2);
        assert_eq!(b.rank(11), 4);
        assert_eq!(b.rank(b.max().unwrap() + 1), b.cardinality());
        assert_eq!(b.select(0), Some(1));
        assert_eq!(b.select(3), Some(10));
        assert_eq!(b.select(5), None);
    }

    #[test]
    fn test_complement_under() {
        let b: Bitmap = [1u64, 2, 5].into_iter().collect();
        assert_eq!(
            b.complement_under(7).ids().collect::<Vec<_>>(),
            [0, 3, 4, 6]
        );
        assert!(b.complement_under(0).is_empty());
        // An involution under a fixed universe.
        assert_eq!(
            b.complement_under(7).complement_under(7).ids().collect::<Vec<_>>(),
            b.ids().collect::<Vec<_>>()
        );
        // De Morgan against difference.
        let a: Bitmap = [0u64, 2, 3].into_iter().collect();
        assert_eq!(
            (&a - &b).ids().collect::<Vec<_>>(),
            (&a & &b.complement_under(7)).ids().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_overlaps_range() {
        let b: Bitmap = [5u64, 6, 100].into_iter().collect();
        assert!(b.overlaps_range(0, 6));
        assert!(b.overlaps_range(6, 10));
        assert!(!b.overlaps_range(7, 100));
        assert!(b.overlaps_range(7, 101));
        assert!(!b.overlaps_range(101, 200));
    }

    #[test]
    fn test_algebra_matches_naive_sets() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..64 {
            let (a, a_ids) = random_bitmap(&mut rng, 200);
            let (b, b_ids) = random_bitmap(&mut rng, 200);
            let (sa, sb) = (naive(&a_ids), naive(&b_ids));

            let union: Vec<u64> = (&a | &b).ids().collect();
            assert_eq!(union, sa.union(&sb).copied().collect::<Vec<_>>());

            let inter: Vec<u64> = (&a & &b).ids().collect();
            assert_eq!(inter, sa.intersection(&sb).copied().collect::<Vec<_>>());

            let diff: Vec<u64> = (&a - &b).ids().collect();
            assert_eq!(diff, sa.difference(&sb).copied().collect::<Vec<_>>());

            // Commutativity and distributivity.
            let (c, _) = random_bitmap(&mut rng, 200);
            assert_eq!(&a | &b, &b | &a);
            assert_eq!(&a & &(&b | &c), &(&a & &b) | &(&a & &c));
        }
    }

    #[test]
    fn test_encode_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let (a, _) = random_bitmap(&mut rng, 1000);
            let mut buf = Vec::new();
            a.encode_to(&mut buf);
            let decoded = Bitmap::decode_from(&mut buf.as_slice()).unwrap();
            assert_eq!(a, decoded);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u64.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&5u64.to_le_bytes());
        buf.extend_from_slice(&5u64.to_le_bytes()); // empty run
        assert!(Bitmap::decode_from(&mut buf.as_slice()).is_err());
    }
}
