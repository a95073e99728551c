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

use crate::types::Data;

/// How much detail a status query should include. Each level is a
/// superset of the previous one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Terse,
    Info,
    Detailed,
    Debug,
}

/// Assembles a status record, adding fields gated on verbosity.
#[derive(Debug, Default)]
pub struct StatusRecord {
    fields: Vec<(String, Data)>,
}

impl StatusRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Data>) -> &mut Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn finish(&mut self) -> Data {
        Data::Record(std::mem::take(&mut self.fields))
    }
}
