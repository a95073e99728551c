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

//! Ingest readers: they turn byte streams into table slices of a
//! schema-defined layout. A malformed record degrades to a warning and
//! is skipped; a malformed batch surfaces to the caller.

mod csv_reader;
mod json;

pub use csv_reader::CsvReader;
pub use json::JsonReader;

use spyglass_common::error::Error;
use spyglass_common::schema::Schema;
use spyglass_common::slice::TableSlice;

/// What `read` reports back: an optional terminal condition and the
/// number of events produced.
pub type ReadOutcome = (Option<Error>, usize);

/// A reader ingests a byte stream and produces table slices.
pub trait SourceReader {
    /// The schema the reader resolves layouts against.
    fn schema(&self) -> &Schema;

    /// Replace the schema. Takes effect from the next `read`.
    fn set_schema(&mut self, schema: Schema) -> spyglass_common::error::Result<()>;

    /// Produce up to `max_events` events as slices of at most
    /// `max_slice_rows` rows each, handing every finished slice to
    /// `consumer`. Returns how many events were produced, plus
    /// `EndOfInput` when the stream is exhausted or the error that
    /// stopped the batch.
    fn read(
        &mut self,
        max_events: usize,
        max_slice_rows: usize,
        consumer: &mut dyn FnMut(TableSlice),
    ) -> ReadOutcome;
}
