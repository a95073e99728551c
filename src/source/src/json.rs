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

use std::io::BufRead;
use std::sync::Arc;

use serde_json::Value;

use spyglass_common::error::{Error, Result, WithContext};
use spyglass_common::schema::{Layout, Schema};
use spyglass_common::slice::{EncodingTag, SliceBuilder, TableSlice};
use spyglass_common::types::{Data, Type, TypeKind};

use crate::{ReadOutcome, SourceReader};

/// Reads newline-delimited JSON objects. The layout comes from the
/// schema under the configured source name; missing object members
/// ingest as nil.
pub struct JsonReader<R: BufRead> {
    source_name: String,
    schema: Schema,
    input: R,
    layout: Option<Arc<Layout>>,
    exhausted: bool,
}

impl<R: BufRead> JsonReader<R> {
    pub fn new(source_name: impl Into<String>, input: R) -> Self {
        Self {
            source_name: source_name.into(),
            schema: Schema::new(),
            input,
            layout: None,
            exhausted: false,
        }
    }

    fn resolve_layout(&mut self) -> Result<Arc<Layout>> {
        if let Some(layout) = &self.layout {
            return Ok(layout.clone());
        }
        let ty = self
            .schema
            .lookup(&self.source_name)
            .ok_or_else(|| {
                Error::format(format!(
                    "schema does not define layout {}",
                    self.source_name
                ))
            })?
            .clone();
        let layout = Arc::new(Layout::new(self.source_name.clone(), ty)?);
        self.layout = Some(layout.clone());
        Ok(layout)
    }
}

/// Walk a dotted column path through nested objects.
fn member<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = object;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Convert one JSON value to a cell of the column type.
fn json_to_data(ty: &Type, value: &Value) -> Result<Data> {
    if value.is_null() {
        return Ok(Data::Nil);
    }
    let mismatch = || Error::parse(format!("{value} does not fit column type {ty}"));
    match ty.resolved().kind() {
        TypeKind::Bool => value.as_bool().map(Data::Bool).ok_or_else(mismatch),
        TypeKind::Count => value.as_u64().map(Data::Count).ok_or_else(mismatch),
        TypeKind::Integer => value.as_i64().map(Data::Integer).ok_or_else(mismatch),
        TypeKind::Real => value
            .as_f64()
            .map(|v| Data::Real(v.into()))
            .ok_or_else(mismatch),
        TypeKind::Str => value
            .as_str()
            .map(|s| Data::Str(s.to_owned()))
            .ok_or_else(mismatch),
        TypeKind::Enumeration(variants) => {
            let name = value.as_str().ok_or_else(mismatch)?;
            variants
                .iter()
                .position(|v| v == name)
                .map(|ordinal| Data::Enum(ordinal as u32))
                .ok_or_else(|| Error::parse(format!("no enumeration variant named {name:?}")))
        }
        TypeKind::Time => value.as_str().ok_or_else(mismatch)?.parse().map(Data::Time),
        TypeKind::Duration => value
            .as_str()
            .ok_or_else(mismatch)?
            .parse()
            .map(Data::Duration),
        TypeKind::Address => value
            .as_str()
            .ok_or_else(mismatch)?
            .parse()
            .map(Data::Address),
        TypeKind::Subnet => value
            .as_str()
            .ok_or_else(mismatch)?
            .parse()
            .map(Data::Subnet),
        TypeKind::Pattern => value
            .as_str()
            .ok_or_else(mismatch)?
            .parse()
            .map(Data::Pattern),
        TypeKind::List(element) => {
            let array = value.as_array().ok_or_else(mismatch)?;
            let elements: Result<Vec<Data>> = array
                .iter()
                .enumerate()
                .map(|(i, e)| json_to_data(element, e).context(format!("[{i}]")))
                .collect();
            Ok(Data::List(elements?))
        }
        TypeKind::Map(key, val) => {
            if !matches!(key.resolved().kind(), TypeKind::Str) {
                return Err(Error::format(format!(
                    "JSON maps require string keys, not {key}"
                )));
            }
            let object = value.as_object().ok_or_else(mismatch)?;
            let mut entries = Vec::with_capacity(object.len());
            for (k, v) in object {
                let v = json_to_data(val, v).context(format!(".{k}"))?;
                entries.push((Data::Str(k.clone()), v));
            }
            Ok(Data::Map(entries))
        }
        TypeKind::Record(_) => Err(Error::format(format!(
            "record column {ty} should have been flattened"
        ))),
        TypeKind::Alias(..) => unreachable!("resolved"),
    }
}

impl<R: BufRead> SourceReader for JsonReader<R> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn set_schema(&mut self, schema: Schema) -> Result<()> {
        self.schema = schema;
        self.layout = None;
        Ok(())
    }

    fn read(
        &mut self,
        max_events: usize,
        max_slice_rows: usize,
        consumer: &mut dyn FnMut(TableSlice),
    ) -> ReadOutcome {
        if self.exhausted {
            return (Some(Error::EndOfInput("json input exhausted".into())), 0);
        }
        let layout = match self.resolve_layout() {
            Ok(layout) => layout,
            Err(e) => return (Some(e), 0),
        };
        let max_slice_rows = max_slice_rows.max(1) as u32;
        let mut builder = SliceBuilder::new(layout.clone(), EncodingTag::COLUMNAR);
        let mut produced = 0;
        let mut outcome = None;

        while produced < max_events {
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    self.exhausted = true;
                    outcome = Some(Error::EndOfInput("json input exhausted".into()));
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    outcome = Some(Error::from(e));
                    break;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_line(&layout, &line);
            match row {
                Ok(values) => {
                    for value in &values {
                        if let Err(e) = builder.push(value.as_data_ref()) {
                            return (Some(e), produced);
                        }
                    }
                    produced += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable json record");
                    continue;
                }
            }
            if builder.rows() == max_slice_rows {
                match builder.finish() {
                    Ok(slice) => consumer(slice),
                    Err(e) => return (Some(e), produced),
                }
            }
        }
        if builder.rows() > 0 {
            match builder.finish() {
                Ok(slice) => consumer(slice),
                Err(e) => return (Some(e), produced),
            }
        }
        (outcome, produced)
    }
}

fn parse_line(layout: &Layout, line: &str) -> Result<Vec<Data>> {
    let object: Value = serde_json::from_str(line)?;
    if !object.is_object() {
        return Err(Error::parse("json record is not an object"));
    }
    layout
        .columns()
        .iter()
        .map(|field| match member(&object, &field.name) {
            None => Ok(Data::Nil),
            Some(value) => json_to_data(&field.ty, value).context(format!(".{}", field.name)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use spyglass_common::types::{DataRef, Field};

    use super::*;

    fn conn_schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add(
                "zeek.conn",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new(
                        "id",
                        Type::record([Field::new("orig_h", Type::address())]),
                    ),
                    Field::new("uid", Type::string()),
                    Field::new("ports", Type::list(Type::count())),
                ]),
            )
            .unwrap();
        schema
    }

    #[test]
    fn test_nested_objects_and_lists() {
        let input = concat!(
            r#"{"ts":"2011-08-12T13:00:36Z","id":{"orig_h":"10.0.0.1"},"uid":"A","ports":[80,443]}"#,
            "\n",
            r#"{"ts":"2011-08-12T13:00:37Z","uid":"B"}"#,
            "\n",
        );
        let mut reader = JsonReader::new("zeek.conn", input.as_bytes());
        reader.set_schema(conn_schema()).unwrap();
        let mut slices = Vec::new();
        let (outcome, produced) = reader.read(1024, 1024, &mut |slice| slices.push(slice));
        assert!(matches!(outcome, Some(Error::EndOfInput(_))));
        assert_eq!(produced, 2);
        let slice = &slices[0];
        assert_eq!(
            slice.at(0, 1),
            DataRef::Address("10.0.0.1".parse().unwrap())
        );
        assert_eq!(slice.at(0, 2), DataRef::Str("A"));
        assert_eq!(
            slice.at(0, 3),
            DataRef::List(&[Data::Count(80), Data::Count(443)])
        );
        // The second record misses id.orig_h and ports: both nil.
        assert_eq!(slice.at(1, 1), DataRef::Nil);
        assert_eq!(slice.at(1, 3), DataRef::Nil);
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let input = concat!(
            r#"{"ts":"2011-08-12T13:00:36Z","uid":"A"}"#,
            "\n",
            "{not json}\n",
            r#"{"ts":"2011-08-12T13:00:38Z","uid":"C"}"#,
            "\n",
        );
        let mut reader = JsonReader::new("zeek.conn", input.as_bytes());
        reader.set_schema(conn_schema()).unwrap();
        let mut slices = Vec::new();
        let (_, produced) = reader.read(1024, 1024, &mut |slice| slices.push(slice));
        assert_eq!(produced, 2);
    }

    #[test]
    fn test_missing_layout_is_an_error() {
        let mut reader = JsonReader::new("unknown", "{}\n".as_bytes());
        let (outcome, produced) = reader.read(1, 1, &mut |_| {});
        assert!(matches!(outcome, Some(Error::FormatError(_))));
        assert_eq!(produced, 0);
    }

    #[test]
    fn test_json_maps() {
        let mut schema = Schema::new();
        schema
            .add(
                "http.headers",
                Type::record([Field::new(
                    "hdrs",
                    Type::map(Type::string(), Type::string()),
                )]),
            )
            .unwrap();
        let input = r#"{"hdrs":{"host":"example.com"}}"#.to_owned() + "\n";
        let mut reader = JsonReader::new("http.headers", input.as_bytes());
        reader.set_schema(schema).unwrap();
        let mut slices = Vec::new();
        let (_, produced) = reader.read(1024, 1024, &mut |slice| slices.push(slice));
        assert_eq!(produced, 1);
        let DataRef::Map(entries) = slices[0].at(0, 0) else {
            panic!()
        };
        assert_eq!(entries.len(), 1);
    }
}
