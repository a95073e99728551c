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

//! Durable storage: the filesystem actor, the immutable segment
//! container, per-column synopses and value indexes, and the partition
//! that ties them together into the unit of persisted, queryable data.

pub mod fs;
pub mod index;
pub mod partition;
pub mod segment;
pub mod store;
pub mod synopsis;

pub use spyglass_common::error::{Error, Result};
