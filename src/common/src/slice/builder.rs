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

use std::sync::Arc;

use super::{Column, EncodingTag, TableSlice};
use crate::error::{Error, Result, WithContext};
use crate::schema::Layout;
use crate::types::{Data, DataRef, Type, TypeKind};

/// Builds table slices cell by cell in row-major order.
///
/// `push` walks the layout's columns left to right and wraps to the next
/// row; `finish` freezes the accumulated rows into a slice and resets
/// the builder for reuse.
pub struct SliceBuilder {
    layout: Arc<Layout>,
    encoding: EncodingTag,
    columns: Vec<Vec<Data>>,
    cursor: usize,
    rows: u32,
}

impl SliceBuilder {
    pub fn new(layout: Arc<Layout>, encoding: EncodingTag) -> Self {
        let columns = (0..layout.num_columns()).map(|_| Vec::new()).collect();
        Self {
            layout,
            encoding,
            columns,
            cursor: 0,
            rows: 0,
        }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Number of complete rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.cursor == 0
    }

    /// Append one cell. Fails with a column breadcrumb when the value
    /// does not fit the column's type.
    pub fn push(&mut self, value: DataRef<'_>) -> Result<()> {
        let field = self.layout.column(self.cursor);
        let data = widen(value, &field.ty).context(format!(".{}", field.name))?;
        self.columns[self.cursor].push(data);
        self.cursor += 1;
        if self.cursor == self.columns.len() {
            self.cursor = 0;
            self.rows += 1;
        }
        Ok(())
    }

    /// Append one full row.
    pub fn push_row<'a>(&mut self, values: impl IntoIterator<Item = DataRef<'a>>) -> Result<()> {
        let before = self.cursor;
        for value in values {
            self.push(value)?;
        }
        if self.cursor != before {
            return Err(Error::invalid_argument(format!(
                "row of layout {} left {} trailing cells",
                self.layout.name(),
                self.cursor
            )));
        }
        Ok(())
    }

    /// Freeze the accumulated rows into an immutable slice, resetting
    /// the builder. The slice's offset is 0 until assigned.
    pub fn finish(&mut self) -> Result<TableSlice> {
        if self.cursor != 0 {
            return Err(Error::invalid_argument(format!(
                "cannot finish mid-row: column {} of {}",
                self.cursor,
                self.columns.len()
            )));
        }
        let columns: Vec<Column> = self
            .columns
            .iter_mut()
            .map(|values| Column::new(std::mem::take(values)))
            .collect();
        let slice = TableSlice {
            layout: self.layout.clone(),
            offset: 0,
            rows: self.rows,
            columns: columns.into(),
            encoding: self.encoding,
        };
        self.rows = 0;
        Ok(slice)
    }
}

/// Fit a value into a column type, applying the permitted widenings:
/// nil goes everywhere, and enumeration columns accept variant names.
fn widen(value: DataRef<'_>, ty: &Type) -> Result<Data> {
    if value.is_nil() {
        return Ok(Data::Nil);
    }
    if let (TypeKind::Enumeration(variants), DataRef::Str(name)) = (ty.resolved().kind(), value) {
        return variants
            .iter()
            .position(|v| v == name)
            .map(|ordinal| Data::Enum(ordinal as u32))
            .ok_or_else(|| Error::convert(format!("no enumeration variant named {name:?}")));
    }
    if ty.is_compatible(value) {
        Ok(value.to_owned_data())
    } else {
        Err(Error::type_clash(format!(
            "{} does not fit column type {ty}",
            value.kind_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Timestamp};

    fn layout() -> Arc<Layout> {
        Arc::new(
            Layout::new(
                "test.conn",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new("proto", Type::enumeration(["tcp", "udp"])),
                    Field::new("port", Type::count()),
                ]),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_build_rows() {
        let mut builder = SliceBuilder::new(layout(), EncodingTag::COLUMNAR);
        builder
            .push_row([
                DataRef::Time(Timestamp::from_nanos(1)),
                DataRef::Str("udp"),
                DataRef::Count(53),
            ])
            .unwrap();
        builder
            .push_row([
                DataRef::Time(Timestamp::from_nanos(2)),
                DataRef::Nil,
                DataRef::Count(80),
            ])
            .unwrap();
        assert_eq!(builder.rows(), 2);
        let slice = builder.finish().unwrap();
        assert_eq!(slice.rows(), 2);
        assert_eq!(slice.at(0, 1), DataRef::Enum(1));
        assert_eq!(slice.at(1, 1), DataRef::Nil);
        assert!(builder.is_empty(), "finish resets the builder");
    }

    #[test]
    fn test_type_clash_carries_breadcrumb() {
        let mut builder = SliceBuilder::new(layout(), EncodingTag::COLUMNAR);
        let err = builder.push(DataRef::Count(1)).unwrap_err();
        assert!(matches!(err, Error::TypeClash(_)));
        assert!(err.to_string().contains(".ts"), "{err}");
    }

    #[test]
    fn test_unknown_enum_variant() {
        let mut builder = SliceBuilder::new(layout(), EncodingTag::COLUMNAR);
        builder.push(DataRef::Time(Timestamp::from_nanos(1))).unwrap();
        assert!(matches!(
            builder.push(DataRef::Str("sctp")),
            Err(Error::ConvertError(_))
        ));
    }

    #[test]
    fn test_finish_mid_row_fails() {
        let mut builder = SliceBuilder::new(layout(), EncodingTag::COLUMNAR);
        builder.push(DataRef::Time(Timestamp::from_nanos(1))).unwrap();
        assert!(builder.finish().is_err());
    }
}
