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

//! Columnar batches of events.
//!
//! A [`TableSlice`] is the unit that flows from readers through
//! partitions into segments and back out of queries: an immutable batch
//! of rows of one layout, cheap to clone and share. The binary form is
//! self-describing (encoding tag + embedded layout), so a segment can be
//! decoded without knowing what was written into it.

mod builder;
mod iter;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use bytes::{BufMut, Bytes};
use parking_lot::RwLock;

pub use self::builder::SliceBuilder;
pub use self::iter::RowRef;

use crate::bitmap::Bitmap;
use crate::error::{Error, Result, WithContext};
use crate::schema::Layout;
use crate::types::value_encoding::{take_u32, take_u64, take_u8};
use crate::types::{Data, DataRef};

/// Identifies the binary representation of a slice body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EncodingTag(pub u8);

impl EncodingTag {
    /// The builtin row-major column store.
    pub const COLUMNAR: EncodingTag = EncodingTag(0);
}

/// One leaf column of a slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    values: Vec<Data>,
}

impl Column {
    fn new(values: Vec<Data>) -> Self {
        Self { values }
    }

    pub fn get(&self, row: usize) -> DataRef<'_> {
        self.values[row].as_data_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DataRef<'_>> {
        self.values.iter().map(Data::as_data_ref)
    }
}

/// An immutable columnar batch of events of one layout.
///
/// `offset` is the id of the first row; ids are contiguous within a
/// slice. Cloning shares the underlying columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSlice {
    layout: Arc<Layout>,
    offset: u64,
    rows: u32,
    columns: Arc<[Column]>,
    encoding: EncodingTag,
}

impl TableSlice {
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn encoding(&self) -> EncodingTag {
        self.encoding
    }

    /// The typed view of one cell.
    pub fn at(&self, row: usize, col: usize) -> DataRef<'_> {
        self.columns[col].get(row)
    }

    /// The same slice with a new starting id. Columns are shared, not
    /// copied; partitions use this to place incoming slices at the next
    /// free id.
    #[must_use]
    pub fn with_offset(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }

    /// The ids covered by this slice, `[offset, offset + rows)`.
    pub fn ids(&self) -> Bitmap {
        let mut bitmap = Bitmap::new();
        bitmap.insert_range(self.offset, self.offset + self.rows as u64);
        bitmap
    }

    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.encoding.0);
        self.layout.encode_to(buf);
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.rows);
        let encoding = lookup_encoding(self.encoding).expect("slice holds registered encoding");
        (encoding.encode_body)(self, buf);
    }

    pub fn decode_from(buf: &mut Bytes) -> Result<Self> {
        let tag = EncodingTag(take_u8(buf)?);
        let encoding = lookup_encoding(tag)?;
        let layout = Arc::new(Layout::decode_from(buf).context("layout")?);
        let offset = take_u64(buf)?;
        let rows = take_u32(buf)?;
        let columns = (encoding.decode_body)(&layout, rows, buf)?;
        Ok(Self {
            layout,
            offset,
            rows,
            columns: columns.into(),
            encoding: tag,
        })
    }
}

/// How one slice encoding lays out the body bytes, after the common
/// prefix (tag, layout, offset, row count) has been written or read.
#[derive(Clone, Copy)]
pub struct Encoding {
    pub encode_body: fn(&TableSlice, &mut Vec<u8>),
    pub decode_body: fn(&Layout, u32, &mut Bytes) -> Result<Vec<Column>>,
}

static ENCODINGS: LazyLock<RwLock<HashMap<u8, Encoding>>> = LazyLock::new(|| {
    let mut registry = HashMap::new();
    registry.insert(
        EncodingTag::COLUMNAR.0,
        Encoding {
            encode_body: encode_columnar_body,
            decode_body: decode_columnar_body,
        },
    );
    RwLock::new(registry)
});

/// Register an additional slice encoding. Intended for process start;
/// re-registering an occupied tag is an error.
pub fn register_encoding(tag: EncodingTag, encoding: Encoding) -> Result<()> {
    match ENCODINGS.write().insert(tag.0, encoding) {
        None => Ok(()),
        Some(_) => Err(Error::invalid_argument(format!(
            "encoding tag {} registered twice",
            tag.0
        ))),
    }
}

fn lookup_encoding(tag: EncodingTag) -> Result<Encoding> {
    ENCODINGS
        .read()
        .get(&tag.0)
        .copied()
        .ok_or_else(|| Error::format(format!("unknown slice encoding: {}", tag.0)))
}

fn encode_columnar_body(slice: &TableSlice, buf: &mut Vec<u8>) {
    for column in slice.columns.iter() {
        for value in &column.values {
            value.encode_to(buf);
        }
    }
}

fn decode_columnar_body(layout: &Layout, rows: u32, buf: &mut Bytes) -> Result<Vec<Column>> {
    let mut columns = Vec::with_capacity(layout.num_columns());
    for field in layout.columns() {
        let mut values = Vec::with_capacity(rows as usize);
        for row in 0..rows {
            let value = Data::decode_from(buf)
                .context(format!(".{}[{row}]", field.name))?;
            if !field.ty.is_compatible(value.as_data_ref()) {
                return Err(Error::type_clash(format!(
                    ".{}[{row}]: {} does not fit column type {}",
                    field.name,
                    value.kind_name(),
                    field.ty
                )));
            }
            values.push(value);
        }
        columns.push(Column::new(values));
    }
    Ok(columns)
}

/// Helpers for tests across the workspace.
pub mod test_utils {
    use super::*;
    use crate::types::{Field, Type};

    /// A two-column `ts`/`port` test layout.
    pub fn simple_layout() -> Arc<Layout> {
        Arc::new(
            Layout::new(
                "test.flow",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new("port", Type::count()),
                ]),
            )
            .unwrap(),
        )
    }

    /// Build a slice of `ports.len()` rows at the given offset.
    pub fn simple_slice(offset: u64, ports: &[u64]) -> TableSlice {
        let mut builder = SliceBuilder::new(simple_layout(), EncodingTag::COLUMNAR);
        for (i, port) in ports.iter().enumerate() {
            builder
                .push(DataRef::Time(crate::types::Timestamp::from_nanos(
                    1_700_000_000_000_000_000 + i as i64,
                )))
                .unwrap();
            builder.push(DataRef::Count(*port)).unwrap();
        }
        builder.finish().unwrap().with_offset(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::simple_slice;
    use super::*;

    #[test]
    fn test_binary_round_trip() {
        let slice = simple_slice(100, &[80, 443, 8080]);
        let mut buf = Vec::new();
        slice.encode_to(&mut buf);
        let mut bytes = Bytes::from(buf);
        let decoded = TableSlice::decode_from(&mut bytes).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(decoded, slice);
        assert_eq!(decoded.at(1, 1), DataRef::Count(443));
        assert_eq!(decoded.offset(), 100);
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let mut bytes = Bytes::from_static(&[0xfe, 0, 0, 0, 0]);
        assert!(matches!(
            TableSlice::decode_from(&mut bytes),
            Err(Error::FormatError(_))
        ));
    }

    #[test]
    fn test_ids() {
        let slice = simple_slice(10, &[1, 2]);
        assert_eq!(slice.ids().ids().collect::<Vec<_>>(), [10, 11]);
    }
}
