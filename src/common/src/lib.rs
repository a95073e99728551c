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

//! Foundation of the event store: the typed value model, compressed id
//! bitmaps, schemas, columnar table slices and the query expression tree.
//!
//! Everything here is runtime-independent. Components that persist or
//! query data live in `spyglass_storage` and `spyglass_query`.

pub mod accountant;
pub mod bitmap;
pub mod error;
pub mod expr;
pub mod schema;
pub mod slice;
pub mod status;
pub mod types;
