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

//! The partition: the immutable unit of persisted, indexed event data.
//!
//! An [`ActivePartition`] accepts slices, assigning each the next free
//! ids and streaming its cells into per-column synopses and value
//! indexes. `seal` persists everything as one directory:
//!
//! ```text
//! partitions/<uuid>/segment.bin    the packed slices
//! partitions/<uuid>/indexes.bin    framed per-column value indexes
//! partitions/<uuid>/synopses.bin   framed per-column synopses
//! partitions/<uuid>/meta.json      uuid, schema, id range, row count
//! ```
//!
//! `meta.json` is written last: a directory without it is not a
//! partition, which makes an interrupted seal invisible to readers. A
//! [`PassivePartition`] loads the directory back and answers expression
//! lookups, consulting synopses before indexes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::{Buf, Bytes};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use spyglass_common::bitmap::Bitmap;
use spyglass_common::error::{Error, Result, WithContext};
use spyglass_common::expr::{
    normalize, resolve, Expression, Extractor, MetaExtractor, Predicate, RelOp,
};
use spyglass_common::schema::Schema;
use spyglass_common::slice::{EncodingTag, TableSlice};
use spyglass_common::status::{StatusRecord, Verbosity};
use spyglass_common::types::value_encoding::{put_str, take_str, take_u32};
use spyglass_common::types::{Data, Type};

use crate::fs::Filesystem;
use crate::index::ValueIndex;
use crate::segment::{Segment, SegmentBuilder};
use crate::synopsis::{Synopsis, SynopsisOptions};

pub const PARTITION_DIR: &str = "partitions";
pub const SEGMENT_FILE: &str = "segment.bin";
pub const INDEXES_FILE: &str = "indexes.bin";
pub const SYNOPSES_FILE: &str = "synopses.bin";
pub const META_FILE: &str = "meta.json";

pub fn partition_path(uuid: Uuid) -> PathBuf {
    PathBuf::from(PARTITION_DIR).join(uuid.to_string())
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Rows after which an active partition wants to be sealed.
    pub capacity: u64,
    pub synopsis: SynopsisOptions,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            synopsis: SynopsisOptions::default(),
        }
    }
}

/// The id stretch covered by slices of one layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRange {
    pub layout: String,
    pub begin: u64,
    /// Exclusive.
    pub end: u64,
}

/// What `meta.json` holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub uuid: Uuid,
    pub schema: Schema,
    pub first_id: u64,
    /// Inclusive.
    pub last_id: u64,
    pub rows: u64,
    pub encoding: u8,
    pub layout_ranges: Vec<LayoutRange>,
}

/// A partition that still accepts slices.
pub struct ActivePartition {
    uuid: Uuid,
    config: PartitionConfig,
    schema: Schema,
    segment: SegmentBuilder,
    synopses: BTreeMap<String, Synopsis>,
    indexes: BTreeMap<String, ValueIndex>,
    column_types: BTreeMap<String, Type>,
    layout_ranges: Vec<LayoutRange>,
    first_id: u64,
    next_id: u64,
}

impl ActivePartition {
    pub fn new(config: PartitionConfig) -> Self {
        Self::with_base(config, 0)
    }

    /// Start a partition whose ids continue at `base`.
    pub fn with_base(config: PartitionConfig, base: u64) -> Self {
        let uuid = Uuid::new_v4();
        Self {
            uuid,
            config,
            schema: Schema::new(),
            segment: SegmentBuilder::new(uuid),
            synopses: BTreeMap::new(),
            indexes: BTreeMap::new(),
            column_types: BTreeMap::new(),
            layout_ranges: Vec::new(),
            first_id: base,
            next_id: base,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> u64 {
        self.next_id - self.first_id
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn is_full(&self) -> bool {
        self.rows() >= self.config.capacity
    }

    /// Ingest one slice: place it at the next free ids, merge its
    /// layout into the schema, and stream its cells into the per-column
    /// synopses and indexes. Returns the re-offset slice.
    pub fn add(&mut self, slice: &TableSlice) -> Result<TableSlice> {
        let slice = slice.with_offset(self.next_id);
        let layout = slice.layout().clone();
        self.schema
            .add(layout.name(), layout.record().clone())
            .context(layout.name())?;
        self.segment.add(&slice)?;

        let first_id = self.first_id;
        let options = self.config.synopsis.clone();
        for col in 0..layout.num_columns() {
            let field = layout.column(col);
            let qualified = layout.qualified_column(col);
            if !self.synopses.contains_key(&qualified) {
                if let Some(synopsis) = Synopsis::for_type(&field.ty, &options) {
                    self.synopses.insert(qualified.clone(), synopsis);
                }
            }
            self.column_types
                .entry(qualified.clone())
                .or_insert_with(|| field.ty.clone());
            let index = self
                .indexes
                .entry(qualified.clone())
                .or_insert_with(|| ValueIndex::for_type(&field.ty, first_id));
            index.skip_to(slice.offset());
            let synopsis = self.synopses.get_mut(&qualified);
            if let Some(synopsis) = synopsis {
                for value in slice.column(col).iter() {
                    synopsis.add(value);
                }
            }
            for value in slice.column(col).iter() {
                index.append(Some(value)).context(&qualified)?;
            }
        }

        let end = self.next_id + slice.rows() as u64;
        match self.layout_ranges.last_mut() {
            Some(range) if range.layout == layout.name() && range.end == self.next_id => {
                range.end = end;
            }
            _ => self.layout_ranges.push(LayoutRange {
                layout: layout.name().to_owned(),
                begin: self.next_id,
                end,
            }),
        }
        self.next_id = end;
        // Keep every column's index aligned to the partition frontier,
        // so rows of other layouts count as null for this column.
        for index in self.indexes.values_mut() {
            index.skip_to(self.next_id);
        }
        Ok(slice)
    }

    /// Persist the partition through the filesystem and consume it.
    /// On failure the partition directory is removed again; without its
    /// `meta.json` readers will never treat the remains as a partition.
    pub async fn seal(mut self, fs: &Filesystem) -> Result<PartitionMeta> {
        if self.segment.is_empty() {
            return Err(Error::invalid_argument("cannot seal an empty partition"));
        }
        let meta = PartitionMeta {
            uuid: self.uuid,
            schema: self.schema.clone(),
            first_id: self.first_id,
            last_id: self.next_id - 1,
            rows: self.next_id - self.first_id,
            encoding: EncodingTag::COLUMNAR.0,
            layout_ranges: self.layout_ranges.clone(),
        };
        let dir = partition_path(self.uuid);

        let segment_bytes = Bytes::from(self.segment.finish());
        let indexes_bytes = encode_framed(&self.indexes, &self.column_types, |index, buf| {
            index.encode_to(buf)
        });
        let synopses_bytes = encode_framed(&self.synopses, &self.column_types, |synopsis, buf| {
            synopsis.encode_to(buf)
        });
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;

        let result = async {
            fs.write(dir.join(SEGMENT_FILE), segment_bytes).await?;
            fs.write(dir.join(INDEXES_FILE), indexes_bytes.into()).await?;
            fs.write(dir.join(SYNOPSES_FILE), synopses_bytes.into()).await?;
            fs.write(dir.join(META_FILE), meta_bytes.into()).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(uuid = %self.uuid, error = %e, "seal failed, removing partition dir");
            let _ = fs.erase(&dir).await;
            return Err(e);
        }
        tracing::debug!(uuid = %self.uuid, rows = meta.rows, "sealed partition");
        Ok(meta)
    }
}

/// Serialize a per-column map as `count, { path, type, frame }*`.
fn encode_framed<T>(
    entries: &BTreeMap<String, T>,
    types: &BTreeMap<String, Type>,
    encode: impl Fn(&T, &mut Vec<u8>),
) -> Vec<u8> {
    use bytes::BufMut;
    let mut out = Vec::new();
    out.put_u32_le(entries.len() as u32);
    for (path, entry) in entries {
        put_str(path, &mut out);
        types[path].encode_to(&mut out);
        let mut frame = Vec::new();
        encode(entry, &mut frame);
        out.put_u32_le(frame.len() as u32);
        out.extend_from_slice(&frame);
    }
    out
}

fn decode_framed<T>(
    buf: &mut impl Buf,
    decode: impl Fn(&mut Bytes) -> Result<T>,
) -> Result<BTreeMap<String, T>> {
    use spyglass_common::types::value_encoding::take_bytes;
    let count = take_u32(buf)? as usize;
    let mut out = BTreeMap::new();
    for _ in 0..count {
        let path = take_str(buf)?;
        let _ty = Type::decode_from(buf).context(&path)?;
        let len = take_u32(buf)? as usize;
        let mut frame = take_bytes(buf, len)?;
        let entry = decode(&mut frame).context(&path)?;
        if !frame.is_empty() {
            return Err(Error::format(format!("{path}: trailing bytes in frame")));
        }
        out.insert(path, entry);
    }
    Ok(out)
}

/// How far a passive partition has come, also surfaced via `status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    WaitingForChunk,
    Loading,
    Ready,
    Erased,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadState::WaitingForChunk => "waiting for chunk",
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
            LoadState::Erased => "erased",
        };
        f.write_str(s)
    }
}

/// A sealed partition loaded from disk, shared immutably by queries.
pub struct PassivePartition {
    meta: PartitionMeta,
    segment: Segment,
    synopses: BTreeMap<String, Synopsis>,
    indexes: BTreeMap<String, ValueIndex>,
    state: RwLock<LoadState>,
}

impl PassivePartition {
    /// Load a partition by uuid. A directory without `meta.json` is not
    /// a partition and surfaces as `NoSuchFile`; checksum and version
    /// failures are fatal for this partition.
    pub async fn load(fs: &Filesystem, uuid: Uuid) -> Result<Self> {
        let dir = partition_path(uuid);
        let meta_bytes = fs.read(dir.join(META_FILE)).await?;
        let meta: PartitionMeta = serde_json::from_slice(&meta_bytes)?;
        if meta.uuid != uuid {
            return Err(Error::format(format!(
                "partition {uuid} carries foreign uuid {}",
                meta.uuid
            )));
        }
        let chunk = fs.mmap(dir.join(SEGMENT_FILE)).await?;
        let segment = Segment::decode(chunk).context("segment.bin")?;
        if segment.uuid() != uuid {
            return Err(Error::format(format!(
                "segment of partition {uuid} carries foreign uuid {}",
                segment.uuid()
            )));
        }
        let mut indexes_bytes = fs.read(dir.join(INDEXES_FILE)).await?;
        let indexes =
            decode_framed(&mut indexes_bytes, |frame| ValueIndex::decode_from(frame))
                .context("indexes.bin")?;
        let mut synopses_bytes = fs.read(dir.join(SYNOPSES_FILE)).await?;
        let synopses =
            decode_framed(&mut synopses_bytes, |frame| Synopsis::decode_from(frame))
                .context("synopses.bin")?;
        Ok(Self {
            meta,
            segment,
            synopses,
            indexes,
            state: RwLock::new(LoadState::Ready),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    pub fn schema(&self) -> &Schema {
        &self.meta.schema
    }

    pub fn meta(&self) -> &PartitionMeta {
        &self.meta
    }

    pub fn rows(&self) -> u64 {
        self.meta.rows
    }

    pub fn state(&self) -> LoadState {
        *self.state.read()
    }

    /// All ids this partition covers.
    pub fn ids(&self) -> Bitmap {
        let mut bitmap = Bitmap::new();
        bitmap.insert_range(self.meta.first_id, self.meta.last_id + 1);
        bitmap
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            LoadState::Ready => Ok(()),
            state => Err(Error::invalid_argument(format!(
                "partition {} is {state}",
                self.meta.uuid
            ))),
        }
    }

    /// Evaluate an expression to the bitmap of matching ids. The
    /// expression is normalized and resolved against this partition's
    /// schema first.
    pub fn lookup(&self, expr: &Expression) -> Result<Bitmap> {
        self.ensure_ready()?;
        let resolved = resolve(&normalize(expr.clone()), &self.meta.schema);
        self.evaluate_expr(&resolved)
    }

    /// Evaluate an expression and decode the slices overlapping the
    /// matching ids. Callers intersect each slice's id range with the
    /// lookup bitmap to mask individual rows.
    pub fn evaluate(&self, expr: &Expression) -> Result<Vec<TableSlice>> {
        let ids = self.lookup(expr)?;
        self.slices(&ids)
    }

    /// Decode the slices overlapping an id bitmap this partition
    /// produced earlier.
    pub fn slices(&self, ids: &Bitmap) -> Result<Vec<TableSlice>> {
        self.ensure_ready()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.segment.lookup(ids)
    }

    fn evaluate_expr(&self, expr: &Expression) -> Result<Bitmap> {
        match expr {
            Expression::Predicate(p) => self.evaluate_predicate(p),
            Expression::Conjunction(exprs) => {
                let mut out = self.ids();
                for e in exprs {
                    if out.is_empty() {
                        break;
                    }
                    out = &out & &self.evaluate_expr(e)?;
                }
                Ok(out)
            }
            Expression::Disjunction(exprs) => {
                let mut out = Bitmap::new();
                for e in exprs {
                    out = &out | &self.evaluate_expr(e)?;
                }
                Ok(out)
            }
            Expression::Negation(inner) => {
                let matched = self.evaluate_expr(inner)?;
                // Complement within this partition's id universe only.
                Ok(&matched.complement_under(self.meta.last_id + 1) & &self.ids())
            }
        }
    }

    fn evaluate_predicate(&self, predicate: &Predicate) -> Result<Bitmap> {
        match &predicate.extractor {
            Extractor::Field(qualified) => {
                let Some(index) = self.indexes.get(qualified) else {
                    return Ok(Bitmap::new());
                };
                if let Some(synopsis) = self.synopses.get(qualified) {
                    match synopsis.lookup(predicate.op, &predicate.value) {
                        // Nothing in this column can match.
                        Some(false) => return Ok(Bitmap::new()),
                        // Every present row matches.
                        Some(true) => return Ok(index.present().clone()),
                        None => {}
                    }
                }
                index.lookup(predicate.op, &predicate.value)
            }
            Extractor::Meta(MetaExtractor::Type) => self.evaluate_type_meta(predicate),
            // Unresolved extractors match nothing.
            _ => Ok(Bitmap::new()),
        }
    }

    /// `#type` predicates constrain the layout name of an event.
    fn evaluate_type_meta(&self, predicate: &Predicate) -> Result<Bitmap> {
        let matches_name = |name: &str| -> Result<bool> {
            match (predicate.op, &predicate.value) {
                (RelOp::Eq, Data::Str(s)) => Ok(name == s),
                (RelOp::Ne, Data::Str(s)) => Ok(name != s),
                (RelOp::In, Data::List(list)) => {
                    Ok(list.iter().any(|e| matches!(e, Data::Str(s) if s == name)))
                }
                (RelOp::NotIn, Data::List(list)) => {
                    Ok(!list.iter().any(|e| matches!(e, Data::Str(s) if s == name)))
                }
                (RelOp::Match, Data::Pattern(p)) => Ok(p.matches(name)),
                (RelOp::NotMatch, Data::Pattern(p)) => Ok(!p.matches(name)),
                (op, value) => Err(Error::invalid_argument(format!(
                    "#type does not support {op} {}",
                    value.kind_name()
                ))),
            }
        };
        let mut out = Bitmap::new();
        for range in &self.meta.layout_ranges {
            if matches_name(&range.layout)? {
                out.insert_range(range.begin, range.end);
            }
        }
        Ok(out)
    }

    /// Delete the partition's files. The partition becomes terminal;
    /// operations other than `status` fail afterwards.
    pub async fn erase(&self, fs: &Filesystem) -> Result<()> {
        self.ensure_ready()?;
        *self.state.write() = LoadState::Erased;
        fs.erase(partition_path(self.meta.uuid)).await
    }

    pub fn status(&self, verbosity: Verbosity) -> Data {
        let mut status = StatusRecord::new();
        status.put("type", "partition");
        status.put("state", self.state().to_string());
        if verbosity >= Verbosity::Info {
            status.put("uuid", self.meta.uuid.to_string());
            status.put("rows", self.meta.rows);
            status.put("first-id", self.meta.first_id);
            status.put("last-id", self.meta.last_id);
        }
        if verbosity >= Verbosity::Detailed {
            status.put("slices", self.segment.num_slices() as u64);
            status.put("indexes", self.indexes.len() as u64);
            status.put("synopses", self.synopses.len() as u64);
        }
        if verbosity >= Verbosity::Debug {
            let index_bytes: usize = self.indexes.values().map(ValueIndex::mem_usage).sum();
            let synopsis_bytes: usize = self.synopses.values().map(Synopsis::mem_usage).sum();
            status.put("index-bytes", index_bytes as u64);
            status.put("synopsis-bytes", synopsis_bytes as u64);
            status.put(
                "layouts",
                Data::List(
                    self.meta
                        .layout_ranges
                        .iter()
                        .map(|r| Data::Str(r.layout.clone()))
                        .collect(),
                ),
            );
        }
        status.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use spyglass_common::schema::Layout;
    use spyglass_common::slice::SliceBuilder;
    use spyglass_common::types::{DataRef, Field, Timestamp};

    use crate::fs::FilesystemConfig;

    use super::*;

    fn flow_layout() -> Arc<Layout> {
        Arc::new(
            Layout::new(
                "test.flow",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new("addr", Type::address()),
                    Field::new("port", Type::count()),
                ]),
            )
            .unwrap(),
        )
    }

    fn flow_slice(rows: &[(&str, &str, u64)]) -> TableSlice {
        let mut builder = SliceBuilder::new(flow_layout(), EncodingTag::COLUMNAR);
        for (ts, addr, port) in rows {
            builder
                .push_row([
                    DataRef::Time(ts.parse::<Timestamp>().unwrap()),
                    DataRef::Address(addr.parse().unwrap()),
                    DataRef::Count(*port),
                ])
                .unwrap();
        }
        builder.finish().unwrap()
    }

    fn csv_fixture() -> TableSlice {
        flow_slice(&[
            ("2011-08-12T13:00:36.349948Z", "147.32.84.165", 1027),
            ("2011-08-13T13:04:24.640406Z", "147.32.84.165", 1089),
        ])
    }

    async fn seal_and_load(
        fs: &Filesystem,
        slices: &[TableSlice],
    ) -> (PartitionMeta, PassivePartition) {
        let mut active = ActivePartition::new(PartitionConfig::default());
        for slice in slices {
            active.add(slice).unwrap();
        }
        let meta = active.seal(fs).await.unwrap();
        let passive = PassivePartition::load(fs, meta.uuid).await.unwrap();
        (meta, passive)
    }

    fn fs_at(root: &std::path::Path) -> Filesystem {
        Filesystem::spawn(FilesystemConfig {
            root: root.to_owned(),
        })
    }

    fn field(name: &str, op: RelOp, value: Data) -> Expression {
        Expression::Predicate(Predicate::field(name, op, value))
    }

    #[tokio::test]
    async fn test_ingest_seal_query() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let (meta, partition) = seal_and_load(&fs, &[csv_fixture()]).await;
        assert_eq!(meta.rows, 2);
        assert_eq!(partition.state(), LoadState::Ready);

        // `port > 1028` matches exactly the second row.
        let hits = partition
            .lookup(&field("port", RelOp::Gt, Data::Count(1028)))
            .unwrap();
        assert_eq!(hits.ids().collect::<Vec<_>>(), [1]);

        let slices = partition
            .evaluate(&field("port", RelOp::Gt, Data::Count(1028)))
            .unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].rows(), 2, "segment lookup returns whole slices");
    }

    #[tokio::test]
    async fn test_address_equivalence_and_subnet() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let slice = flow_slice(&[
            ("2011-08-12T13:00:36Z", "127.0.0.1", 1),
            ("2011-08-12T13:00:37Z", "10.1.2.3", 2),
        ]);
        let (_, partition) = seal_and_load(&fs, &[slice]).await;

        let mapped = field(
            "addr",
            RelOp::Eq,
            Data::Address("::ffff:127.0.0.1".parse().unwrap()),
        );
        assert_eq!(partition.lookup(&mapped).unwrap().ids().collect::<Vec<_>>(), [0]);

        let in_net = field(
            "addr",
            RelOp::In,
            Data::Subnet("127.0.0.0/8".parse().unwrap()),
        );
        assert_eq!(partition.lookup(&in_net).unwrap().ids().collect::<Vec<_>>(), [0]);
    }

    #[tokio::test]
    async fn test_boolean_combinations_and_negation() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let (_, partition) = seal_and_load(&fs, &[csv_fixture()]).await;

        let both = Expression::and([
            field("port", RelOp::Ge, Data::Count(1000)),
            field("port", RelOp::Le, Data::Count(1028)),
        ]);
        assert_eq!(partition.lookup(&both).unwrap().ids().collect::<Vec<_>>(), [0]);

        let negated = Expression::not(field("port", RelOp::Gt, Data::Count(1028)));
        assert_eq!(partition.lookup(&negated).unwrap().ids().collect::<Vec<_>>(), [0]);

        // An unknown field matches nothing; its negation matches all.
        let missing = field("no_such_field", RelOp::Eq, Data::Count(1));
        assert!(partition.lookup(&missing).unwrap().is_empty());
        assert_eq!(
            partition
                .lookup(&Expression::not(missing))
                .unwrap()
                .cardinality(),
            2
        );
    }

    #[tokio::test]
    async fn test_type_meta_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let (_, partition) = seal_and_load(&fs, &[csv_fixture()]).await;
        let by_type = Expression::Predicate(Predicate::new(
            Extractor::Meta(MetaExtractor::Type),
            RelOp::Eq,
            Data::Str("test.flow".into()),
        ));
        assert_eq!(partition.lookup(&by_type).unwrap().cardinality(), 2);
        let other = Expression::Predicate(Predicate::new(
            Extractor::Meta(MetaExtractor::Type),
            RelOp::Eq,
            Data::Str("zeek.conn".into()),
        ));
        assert!(partition.lookup(&other).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_survives_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let mut active = ActivePartition::new(PartitionConfig::default());
        let slice = active.add(&csv_fixture()).unwrap();

        // Before sealing, compute the expected answer from raw rows.
        let expected: Vec<u64> = slice
            .iter_rows()
            .filter(|row| {
                spyglass_common::expr::evaluate(row.datum_at(2), RelOp::Gt, &Data::Count(1028))
            })
            .map(|row| row.id())
            .collect();

        let meta = active.seal(&fs).await.unwrap();
        let partition = PassivePartition::load(&fs, meta.uuid).await.unwrap();
        let query = field("port", RelOp::Gt, Data::Count(1028));
        let first = partition.lookup(&query).unwrap();
        assert_eq!(first.ids().collect::<Vec<_>>(), expected);

        // Loading a second time yields the same bitmap.
        let reloaded = PassivePartition::load(&fs, meta.uuid).await.unwrap();
        assert_eq!(reloaded.lookup(&query).unwrap(), first);
    }

    #[tokio::test]
    async fn test_erase_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let (meta, partition) = seal_and_load(&fs, &[csv_fixture()]).await;

        partition.erase(&fs).await.unwrap();
        assert_eq!(partition.state(), LoadState::Erased);
        for file in [SEGMENT_FILE, INDEXES_FILE, SYNOPSES_FILE, META_FILE] {
            let read = fs.read(partition_path(meta.uuid).join(file)).await;
            assert!(matches!(read, Err(Error::NoSuchFile(_))), "{file}");
        }
        assert!(partition
            .lookup(&field("port", RelOp::Eq, Data::Count(1)))
            .is_err());

        let Data::Record(fields) = partition.status(Verbosity::Debug) else {
            panic!()
        };
        assert!(fields.contains(&("state".into(), Data::Str("erased".into()))));
    }

    #[tokio::test]
    async fn test_synopsis_short_circuits_index() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let (_, partition) = seal_and_load(&fs, &[csv_fixture()]).await;

        // Ports are in [1027, 1089]; 5000 is outside, so the synopsis
        // answers and the index must not be probed.
        let miss = field("port", RelOp::Eq, Data::Count(5000));
        assert!(partition.lookup(&miss).unwrap().is_empty());
        let index = &partition.indexes["test.flow.port"];
        assert_eq!(index.probes.load(Ordering::Relaxed), 0);

        // An interior probe falls through to the index.
        let interior = field("port", RelOp::Eq, Data::Count(1089));
        assert_eq!(partition.lookup(&interior).unwrap().cardinality(), 1);
        assert_eq!(index.probes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failed_seal_leaves_no_partition() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let mut active = ActivePartition::new(PartitionConfig::default());
        active.add(&csv_fixture()).unwrap();
        let uuid = active.uuid();

        // Occupy the meta.json path with a directory, so the final
        // write fails after the other three succeeded.
        let meta_path = partition_path(uuid).join(META_FILE);
        fs.write(meta_path.join("blocker"), Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(active.seal(&fs).await.is_err());
        // The cleanup pass removed everything but (possibly) the
        // blocking directory; crucially there is no meta.json file, so
        // a scan will not consider this a partition.
        assert!(PassivePartition::load(&fs, uuid).await.is_err());
    }

    #[tokio::test]
    async fn test_multiple_layouts_in_one_partition() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let dns_layout = Arc::new(
            Layout::new(
                "test.dns",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new("query", Type::string()),
                ]),
            )
            .unwrap(),
        );
        let mut builder = SliceBuilder::new(dns_layout, EncodingTag::COLUMNAR);
        builder
            .push_row([
                DataRef::Time(Timestamp::from_nanos(1)),
                DataRef::Str("example.com"),
            ])
            .unwrap();
        let dns = builder.finish().unwrap();

        let (meta, partition) = seal_and_load(&fs, &[csv_fixture(), dns]).await;
        assert_eq!(meta.rows, 3);
        assert_eq!(meta.layout_ranges.len(), 2);

        // The dns row sits at id 2; the flow columns are null there.
        let q = field("query", RelOp::Eq, Data::Str("example.com".into()));
        assert_eq!(partition.lookup(&q).unwrap().ids().collect::<Vec<_>>(), [2]);
        let flow_nil = field("port", RelOp::Eq, Data::Nil);
        assert_eq!(partition.lookup(&flow_nil).unwrap().ids().collect::<Vec<_>>(), [2]);
    }
}
