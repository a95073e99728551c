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

use std::iter::FusedIterator;

use super::TableSlice;
use crate::types::{Data, DataRef};

impl TableSlice {
    /// Iterate over the rows of this slice.
    pub fn iter_rows(&self) -> SliceRowIter<'_> {
        SliceRowIter {
            slice: self,
            row: 0,
        }
    }
}

pub struct SliceRowIter<'a> {
    slice: &'a TableSlice,
    row: usize,
}

impl<'a> Iterator for SliceRowIter<'a> {
    type Item = RowRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row == self.slice.rows() as usize {
            return None;
        }
        let row = RowRef {
            slice: self.slice,
            row: self.row,
        };
        self.row += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.slice.rows() as usize - self.row;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SliceRowIter<'_> {}
impl FusedIterator for SliceRowIter<'_> {}

/// One row of a slice.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    slice: &'a TableSlice,
    row: usize,
}

impl<'a> RowRef<'a> {
    pub fn new(slice: &'a TableSlice, row: usize) -> Self {
        debug_assert!(row < slice.rows() as usize);
        Self { slice, row }
    }

    /// The event id of this row.
    pub fn id(&self) -> u64 {
        self.slice.offset() + self.row as u64
    }

    /// The row's index within its slice.
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn datum_at(&self, col: usize) -> DataRef<'a> {
        self.slice.at(self.row, col)
    }

    pub fn len(&self) -> usize {
        self.slice.columns()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = DataRef<'a>> + '_ {
        (0..self.len()).map(|col| self.datum_at(col))
    }

    /// Materialize the row as a record over the flattened column names.
    pub fn to_record(&self) -> Data {
        Data::Record(
            self.slice
                .layout()
                .columns()
                .iter()
                .zip(self.iter())
                .map(|(field, value)| (field.name.clone(), value.to_owned_data()))
                .collect(),
        )
    }
}

impl std::fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for RowRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}
impl Eq for RowRef<'_> {}
