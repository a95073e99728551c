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

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::value_encoding::{put_str, take_str, take_u32};
use crate::types::{Field, Type, TypeKind};

/// The named record type of one kind of event, together with its
/// flattened leaf columns. Column names join nested fields with dots
/// (`id.orig_h`), and the qualified form prepends the layout name
/// (`zeek.conn.id.orig_h`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    name: String,
    record: Type,
    columns: Vec<Field>,
}

impl Layout {
    pub fn new(name: impl Into<String>, record: Type) -> Result<Self> {
        let name = name.into();
        if !matches!(record.resolved().kind(), TypeKind::Record(_)) {
            return Err(Error::invalid_argument(format!(
                "layout {name} must be a record type, got {record}"
            )));
        }
        let columns = record.flatten();
        Ok(Self {
            name,
            record,
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &Type {
        &self.record
    }

    /// The flattened leaf columns.
    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &Field {
        &self.columns[index]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// `<layout>.<column>` for the column at `index`.
    pub fn qualified_column(&self, index: usize) -> String {
        format!("{}.{}", self.name, self.columns[index].name)
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        put_str(&self.name, buf);
        self.record.encode_to(buf);
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let name = take_str(buf)?;
        let record = Type::decode_from(buf)?;
        Self::new(name, record)
    }
}

/// A set of named record types. Names are unique; merging schemas with
/// clashing definitions is a type error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    types: Vec<(String, Type)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }

    pub fn add(&mut self, name: impl Into<String>, ty: Type) -> Result<()> {
        let name = name.into();
        match self.lookup(&name) {
            Some(existing) if *existing == ty => Ok(()),
            Some(_) => Err(Error::type_clash(format!(
                "schema already contains a different type named {name}"
            ))),
            None => {
                self.types.push((name, ty));
                Ok(())
            }
        }
    }

    pub fn merge(&mut self, other: &Schema) -> Result<()> {
        for (name, ty) in &other.types {
            self.add(name.clone(), ty.clone())?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.types.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// All layouts in this schema, skipping entries that are not record
    /// types (plain aliases may live in a schema too).
    pub fn layouts(&self) -> impl Iterator<Item = Arc<Layout>> + '_ {
        self.types
            .iter()
            .filter_map(|(name, ty)| Layout::new(name.clone(), ty.clone()).ok().map(Arc::new))
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.types.len() as u32);
        for (name, ty) in &self.types {
            put_str(name, buf);
            ty.encode_to(buf);
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Self> {
        let len = take_u32(buf)? as usize;
        let mut schema = Self::new();
        for _ in 0..len {
            let name = take_str(buf)?;
            let ty = Type::decode_from(buf)?;
            schema.add(name, ty)?;
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn conn() -> Type {
        Type::record([
            Field::new("ts", Type::time()),
            Field::new(
                "id",
                Type::record([
                    Field::new("orig_h", Type::address()),
                    Field::new("resp_p", Type::count()),
                ]),
            ),
        ])
    }

    #[test]
    fn test_layout_columns() {
        let layout = Layout::new("zeek.conn", conn()).unwrap();
        assert_eq!(layout.num_columns(), 3);
        assert_eq!(layout.column(1).name, "id.orig_h");
        assert_eq!(layout.qualified_column(2), "zeek.conn.id.resp_p");
        assert_eq!(layout.column_index("id.resp_p"), Some(2));
        assert!(Layout::new("bad", Type::count()).is_err());
    }

    #[test]
    fn test_schema_merge() {
        let mut a = Schema::new();
        a.add("zeek.conn", conn()).unwrap();
        let mut b = Schema::new();
        b.add("zeek.conn", conn()).unwrap();
        b.add("zeek.dns", Type::record([Field::new("ts", Type::time())]))
            .unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.len(), 2);

        let mut clash = Schema::new();
        clash
            .add("zeek.conn", Type::record([Field::new("x", Type::count())]))
            .unwrap();
        assert!(a.merge(&clash).is_err());
    }

    #[test]
    fn test_schema_binary_round_trip() {
        let mut schema = Schema::new();
        schema.add("zeek.conn", conn()).unwrap();
        let mut buf = Vec::new();
        schema.encode_to(&mut buf);
        assert_eq!(Schema::decode_from(&mut buf.as_slice()).unwrap(), schema);
    }
}
