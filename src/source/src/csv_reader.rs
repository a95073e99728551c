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

use std::io::Read;
use std::sync::Arc;

use spyglass_common::error::{Error, Result, WithContext};
use spyglass_common::schema::{Layout, Schema};
use spyglass_common::slice::{EncodingTag, SliceBuilder, TableSlice};
use spyglass_common::types::{from_text, Data, Field, Type, TypeKind};

use crate::{ReadOutcome, SourceReader};

/// Reads CSV with a header row. Columns are typed by looking the
/// configured source name up in the schema; without a match every
/// column ingests as a string.
pub struct CsvReader<R: Read> {
    source_name: String,
    schema: Schema,
    reader: csv::Reader<R>,
    layout: Option<Arc<Layout>>,
    exhausted: bool,
}

impl<R: Read> CsvReader<R> {
    pub fn new(source_name: impl Into<String>, input: R) -> Self {
        Self {
            source_name: source_name.into(),
            schema: Schema::new(),
            reader: csv::ReaderBuilder::new().has_headers(true).from_reader(input),
            layout: None,
            exhausted: false,
        }
    }

    /// Resolve the layout from the header row and the schema. Columns
    /// are arranged in header order. Map-typed columns are rejected:
    /// the CSV cell syntax for maps is unsettled.
    fn resolve_layout(&mut self) -> Result<Arc<Layout>> {
        if let Some(layout) = &self.layout {
            return Ok(layout.clone());
        }
        let headers: Vec<String> = self
            .reader
            .headers()
            .map_err(|e| Error::parse(format!("csv header: {e}")))?
            .iter()
            .map(str::to_owned)
            .collect();
        if headers.is_empty() {
            return Err(Error::format("csv input without header"));
        }
        let fields: Vec<Field> = match self.schema.lookup(&self.source_name) {
            Some(ty) => {
                let columns = ty.flatten();
                headers
                    .iter()
                    .map(|header| {
                        columns
                            .iter()
                            .find(|c| &c.name == header)
                            .cloned()
                            .ok_or_else(|| {
                                Error::format(format!(
                                    "column {header} not in layout {}",
                                    self.source_name
                                ))
                            })
                    })
                    .collect::<Result<_>>()?
            }
            None => headers
                .iter()
                .map(|header| Field::new(header.clone(), Type::string()))
                .collect(),
        };
        for field in &fields {
            if matches!(field.ty.resolved().kind(), TypeKind::Map(..)) {
                return Err(Error::format(format!(
                    ".{}: map-typed columns are not supported in CSV input",
                    field.name
                )));
            }
        }
        let layout = Arc::new(Layout::new(
            self.source_name.clone(),
            Type::record(fields),
        )?);
        self.layout = Some(layout.clone());
        Ok(layout)
    }
}

/// Parse one CSV cell into a value of the column type. An empty cell
/// is nil.
fn parse_cell(ty: &Type, text: &str) -> Result<Data> {
    if text.is_empty() {
        return Ok(Data::Nil);
    }
    match ty.resolved().kind() {
        TypeKind::Str => Ok(Data::Str(text.to_owned())),
        TypeKind::Enumeration(variants) => {
            if variants.iter().any(|v| v == text) {
                Ok(Data::Str(text.to_owned()))
            } else {
                Err(Error::parse(format!("no enumeration variant named {text:?}")))
            }
        }
        TypeKind::Bool => match text {
            "true" | "T" => Ok(Data::Bool(true)),
            "false" | "F" => Ok(Data::Bool(false)),
            _ => Err(Error::parse(format!("not a bool: {text}"))),
        },
        TypeKind::Count => text
            .parse()
            .map(Data::Count)
            .map_err(|_| Error::parse(format!("not a count: {text}"))),
        TypeKind::Integer => text
            .parse()
            .map(Data::Integer)
            .map_err(|_| Error::parse(format!("not an integer: {text}"))),
        TypeKind::Real => text
            .parse()
            .map(|v: f64| Data::Real(v.into()))
            .map_err(|_| Error::parse(format!("not a real: {text}"))),
        TypeKind::Time => text.parse().map(Data::Time),
        TypeKind::Duration => text.parse().map(Data::Duration),
        TypeKind::Address => text.parse().map(Data::Address),
        TypeKind::Subnet => text.parse().map(Data::Subnet),
        TypeKind::Pattern => text.parse().map(Data::Pattern),
        // Bracketed list syntax, as printed by the canonical text form.
        TypeKind::List(_) => {
            let data = from_text(text)?;
            if ty.is_compatible(data.as_data_ref()) {
                Ok(data)
            } else {
                Err(Error::type_clash(format!(
                    "{} does not fit column type {ty}",
                    data.kind_name()
                )))
            }
        }
        TypeKind::Map(..) | TypeKind::Record(_) => Err(Error::format(format!(
            "cannot ingest {ty} from a CSV cell"
        ))),
        TypeKind::Alias(..) => unreachable!("resolved"),
    }
}

impl<R: Read> SourceReader for CsvReader<R> {
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
            return (Some(Error::EndOfInput("csv input exhausted".into())), 0);
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
            let mut record = csv::StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => {
                    self.exhausted = true;
                    outcome = Some(Error::EndOfInput("csv input exhausted".into()));
                    break;
                }
                Err(e) => {
                    outcome = Some(Error::parse(format!("csv record: {e}")));
                    break;
                }
            }
            if record.len() != layout.num_columns() {
                tracing::warn!(
                    row = produced,
                    cells = record.len(),
                    columns = layout.num_columns(),
                    "skipping csv record with wrong arity"
                );
                continue;
            }
            let row: Result<Vec<Data>> = record
                .iter()
                .zip(layout.columns())
                .map(|(cell, field)| parse_cell(&field.ty, cell).context(format!(".{}", field.name)))
                .collect();
            match row {
                Ok(values) => {
                    for value in &values {
                        builder
                            .push(value.as_data_ref())
                            .expect("cell was parsed against the column type");
                    }
                    produced += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparseable csv record");
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
