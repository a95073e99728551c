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

use std::hash::Hasher;

use bytes::{Buf, BufMut};
use twox_hash::XxHash64;

use spyglass_common::error::{Error, Result};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::{take_u32, take_u64};
use spyglass_common::types::{Data, DataRef};

/// A Bloom filter over encoded values, used as the synopsis for
/// equality-probed columns (strings, patterns, addresses, subnets).
///
/// Double hashing with two xxHash64 seeds; the bit count is derived
/// from the configured capacity and false-positive rate. The filter can
/// rule a value out but never in, so `lookup` answers `Some(false)` or
/// `None`, never `Some(true)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomSynopsis {
    num_hashes: u32,
    num_bits: u64,
    words: Vec<u64>,
}

impl BloomSynopsis {
    pub fn new(capacity: u64, false_positive: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        let false_positive = false_positive.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-capacity * false_positive.ln()) / (ln2 * ln2)).ceil() as u64;
        let num_bits = num_bits.max(64);
        let num_hashes = ((num_bits as f64 / capacity) * ln2).round().max(1.0) as u32;
        Self {
            num_hashes,
            num_bits,
            words: vec![0; num_bits.div_ceil(64) as usize],
        }
    }

    fn fingerprint(bytes: &[u8]) -> (u64, u64) {
        let mut h1 = XxHash64::with_seed(0);
        h1.write(bytes);
        let mut h2 = XxHash64::with_seed(0x9e37_79b9_7f4a_7c15);
        h2.write(bytes);
        (h1.finish(), h2.finish())
    }

    fn bit_positions(&self, bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = Self::fingerprint(bytes);
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        let positions: Vec<u64> = self.bit_positions(bytes).collect();
        for bit in positions {
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    pub fn maybe_contains_bytes(&self, bytes: &[u8]) -> bool {
        self.bit_positions(bytes)
            .all(|bit| self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    pub fn add(&mut self, value: DataRef<'_>) {
        if value.is_nil() {
            return;
        }
        let mut encoded = Vec::new();
        value.encode_to(&mut encoded);
        self.add_bytes(&encoded);
    }

    fn maybe_contains(&self, value: DataRef<'_>) -> bool {
        let mut encoded = Vec::new();
        value.encode_to(&mut encoded);
        self.maybe_contains_bytes(&encoded)
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Option<bool> {
        match (op, rhs) {
            (_, Data::Nil) => None,
            (RelOp::Eq, rhs) => match self.maybe_contains(rhs.as_data_ref()) {
                true => None,
                false => Some(false),
            },
            (RelOp::In, Data::List(elements)) => {
                let any_maybe = elements
                    .iter()
                    .any(|e| !e.is_nil() && self.maybe_contains(e.as_data_ref()));
                match any_maybe {
                    true => None,
                    false => Some(false),
                }
            }
            _ => None,
        }
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.words.capacity() * 8
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.num_hashes);
        buf.put_u64_le(self.num_bits);
        buf.put_u32_le(self.words.len() as u32);
        for word in &self.words {
            buf.put_u64_le(*word);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let num_hashes = take_u32(buf)?;
        let num_bits = take_u64(buf)?;
        let n_words = take_u32(buf)? as usize;
        if num_hashes == 0 || num_bits == 0 || n_words as u64 != num_bits.div_ceil(64) {
            return Err(Error::format("malformed bloom synopsis"));
        }
        let mut words = Vec::with_capacity(n_words);
        for _ in 0..n_words {
            words.push(take_u64(buf)?);
        }
        Ok(Self {
            num_hashes,
            num_bits,
            words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let mut bloom = BloomSynopsis::new(1024, 0.01);
        for i in 0..1024u64 {
            bloom.add(DataRef::Str(&format!("value-{i}")));
        }
        for i in 0..1024u64 {
            let value = Data::Str(format!("value-{i}"));
            assert_eq!(bloom.lookup(RelOp::Eq, &value), None);
        }
    }

    #[test]
    fn test_absent_values_are_mostly_ruled_out() {
        let mut bloom = BloomSynopsis::new(1024, 0.01);
        for i in 0..1024u64 {
            bloom.add(DataRef::Str(&format!("value-{i}")));
        }
        let ruled_out = (0..1024u64)
            .filter(|i| {
                let value = Data::Str(format!("other-{i}"));
                bloom.lookup(RelOp::Eq, &value) == Some(false)
            })
            .count();
        assert!(ruled_out > 950, "only {ruled_out} of 1024 ruled out");
    }

    #[test]
    fn test_membership_list() {
        let mut bloom = BloomSynopsis::new(16, 0.01);
        bloom.add(DataRef::Str("a"));
        let absent = Data::List(vec![Data::Str("x".into()), Data::Str("y".into())]);
        assert_eq!(bloom.lookup(RelOp::In, &absent), Some(false));
        let maybe = Data::List(vec![Data::Str("x".into()), Data::Str("a".into())]);
        assert_eq!(bloom.lookup(RelOp::In, &maybe), None);
        // Unsupported operators stay undecided.
        assert_eq!(bloom.lookup(RelOp::Lt, &Data::Str("a".into())), None);
    }

    #[test]
    fn test_round_trip() {
        let mut bloom = BloomSynopsis::new(128, 0.05);
        bloom.add(DataRef::Str("hello"));
        let mut buf = Vec::new();
        bloom.encode_to(&mut buf);
        let decoded = BloomSynopsis::decode_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, bloom);
    }
}
