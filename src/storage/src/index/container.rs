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
use spyglass_common::error::{Error, Result, WithContext};
use spyglass_common::expr::RelOp;
use spyglass_common::types::value_encoding::{take_u32, take_u64};
use spyglass_common::types::{Data, DataRef, Type};

use super::ValueIndex;

/// A positional index over a list column: one inner index per element
/// position, created on first use. An element predicate matches a row
/// if it matches at any position.
#[derive(Debug)]
pub struct ListIndex {
    element_ty: Type,
    base: u64,
    rows: u64,
    present: Bitmap,
    positions: Vec<ValueIndex>,
}

impl ListIndex {
    pub fn new(element_ty: Type, base: u64) -> Self {
        Self {
            element_ty,
            base,
            rows: base,
            present: Bitmap::new(),
            positions: Vec::new(),
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
        let elements = match value {
            None | Some(DataRef::Nil) => return Ok(()),
            Some(DataRef::List(elements)) => elements,
            Some(other) => {
                return Err(Error::type_clash(format!(
                    "{} does not belong to a list index",
                    other.kind_name()
                )))
            }
        };
        self.present.insert(row);
        for (i, element) in elements.iter().enumerate() {
            if self.positions.len() == i {
                self.positions
                    .push(ValueIndex::for_type(&self.element_ty, row));
            }
            let position = &mut self.positions[i];
            position.skip_to(row);
            position
                .append(Some(element.as_data_ref()))
                .context(format!("[{i}]"))?;
        }
        Ok(())
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Result<Bitmap> {
        if rhs.is_nil() {
            return match op {
                RelOp::Eq => Ok(self.nulls()),
                RelOp::Ne => Ok(self.present.clone()),
                _ => Err(Error::invalid_argument(format!("{op} nil"))),
            };
        }
        let mut matched = Bitmap::new();
        for position in &self.positions {
            matched = &matched | &position.lookup(op, rhs)?;
        }
        Ok(matched)
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        self.element_ty.encode_to(buf);
        buf.put_u64_le(self.base);
        buf.put_u64_le(self.rows);
        self.present.encode_to(buf);
        buf.put_u32_le(self.positions.len() as u32);
        for position in &self.positions {
            position.encode_to(buf);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let element_ty = Type::decode_from(buf)?;
        let base = take_u64(buf)?;
        let rows = take_u64(buf)?;
        let present = Bitmap::decode_from(buf)?;
        let n_positions = take_u32(buf)? as usize;
        let mut positions = Vec::with_capacity(n_positions.min(4096));
        for i in 0..n_positions {
            positions.push(ValueIndex::decode_from(buf).context(format!("[{i}]"))?);
        }
        Ok(Self {
            element_ty,
            base,
            rows,
            present,
            positions,
        })
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.present.mem_usage()
            + self.positions.iter().map(ValueIndex::mem_usage).sum::<usize>()
    }
}

/// The fallback index for columns that carry no searchable values
/// (maps, until their indexing is settled): it can only tell nil rows
/// from the rest.
#[derive(Debug, Default)]
pub struct NullIndex {
    base: u64,
    rows: u64,
    present: Bitmap,
}

impl NullIndex {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            rows: base,
            present: Bitmap::new(),
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
        match value {
            None | Some(DataRef::Nil) => {}
            Some(_) => self.present.insert(row),
        }
        Ok(())
    }

    pub fn lookup(&self, op: RelOp, rhs: &Data) -> Result<Bitmap> {
        match (op, rhs) {
            (RelOp::Eq, Data::Nil) => Ok(self.nulls()),
            (RelOp::Ne, Data::Nil) => Ok(self.present.clone()),
            (op, rhs) => Err(Error::invalid_argument(format!(
                "this column supports only nil probes, not {op} {}",
                rhs.kind_name()
            ))),
        }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.base);
        buf.put_u64_le(self.rows);
        self.present.encode_to(buf);
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let base = take_u64(buf)?;
        let rows = take_u64(buf)?;
        let present = Bitmap::decode_from(buf)?;
        Ok(Self {
            base,
            rows,
            present,
        })
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.present.mem_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_positions() {
        let mut index = ListIndex::new(Type::string(), 0);
        let rows = [
            Some(Data::List(vec![Data::Str("a".into()), Data::Str("b".into())])),
            Some(Data::List(vec![Data::Str("c".into())])),
            None,
            Some(Data::List(vec![
                Data::Str("x".into()),
                Data::Str("y".into()),
                Data::Str("a".into()),
            ])),
        ];
        for row in &rows {
            index.append(row.as_ref().map(|d| d.as_data_ref())).unwrap();
        }
        // "a" appears at position 0 of row 0 and position 2 of row 3.
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Str("a".into())).unwrap().ids().collect::<Vec<_>>(),
            [0, 3]
        );
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Str("b".into())).unwrap().ids().collect::<Vec<_>>(),
            [0]
        );
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Nil).unwrap().ids().collect::<Vec<_>>(),
            [2]
        );
    }

    #[test]
    fn test_list_round_trip() {
        let mut index = ListIndex::new(Type::count(), 0);
        index
            .append(Some(Data::List(vec![Data::Count(1), Data::Count(2)]).as_data_ref()))
            .unwrap();
        index.append(None).unwrap();
        let mut buf = Vec::new();
        index.encode_to(&mut buf);
        let decoded = ListIndex::decode_from(&mut buf.as_slice()).unwrap();
        assert_eq!(
            decoded.lookup(RelOp::Eq, &Data::Count(2)).unwrap().ids().collect::<Vec<_>>(),
            [0]
        );
        assert_eq!(decoded.nulls().ids().collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn test_null_index() {
        let mut index = NullIndex::new(0);
        index
            .append(Some(Data::Map(vec![(Data::Str("k".into()), Data::Count(1))]).as_data_ref()))
            .unwrap();
        index.append(None).unwrap();
        assert_eq!(
            index.lookup(RelOp::Eq, &Data::Nil).unwrap().ids().collect::<Vec<_>>(),
            [1]
        );
        assert!(index.lookup(RelOp::Eq, &Data::Count(1)).is_err());
    }
}
