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

use pretty_assertions::assert_eq;
use spyglass_common::expr::{
    evaluate, normalize, resolve, Expression, Extractor, MetaExtractor, Predicate, RelOp,
};
use spyglass_common::schema::{Layout, Schema};
use spyglass_common::slice::{EncodingTag, SliceBuilder, TableSlice};
use spyglass_common::types::{Data, DataRef, Field, Timestamp, Type};
use spyglass_query::{pivot, QueryPipeline};
use spyglass_source::{CsvReader, SourceReader};
use spyglass_storage::fs::{Filesystem, FilesystemConfig};
use spyglass_storage::partition::{ActivePartition, PartitionConfig};
use spyglass_storage::store::PartitionStore;

fn fs_at(root: &std::path::Path) -> Filesystem {
    spyglass_runtime::init_for_test();
    Filesystem::spawn(FilesystemConfig {
        root: root.to_owned(),
    })
}

fn field(name: &str, op: RelOp, value: Data) -> Expression {
    Expression::Predicate(Predicate::field(name, op, value))
}

async fn seal(fs: &Filesystem, slices: Vec<TableSlice>) -> uuid::Uuid {
    let mut active = ActivePartition::new(PartitionConfig::default());
    for slice in &slices {
        active.add(slice).unwrap();
    }
    active.seal(fs).await.unwrap().uuid
}

/// CSV ingest through reader, partition and query: `port > 1028`
/// returns exactly the second row.
#[tokio::test]
async fn test_csv_ingest_to_query() {
    let csv = "\
ts,addr,port
2011-08-12T13:00:36.349948Z,147.32.84.165,1027
2011-08-13T13:04:24.640406Z,147.32.84.165,1089
";
    let mut schema = Schema::new();
    schema
        .add(
            "test.flow",
            Type::record([
                Field::new("ts", Type::time()),
                Field::new("addr", Type::address()),
                Field::new("port", Type::count()),
            ]),
        )
        .unwrap();
    let mut reader = CsvReader::new("test.flow", csv.as_bytes());
    reader.set_schema(schema).unwrap();
    let mut slices = Vec::new();
    let (_, produced) = reader.read(1024, 1024, &mut |slice| slices.push(slice));
    assert_eq!(produced, 2);

    let dir = tempfile::tempdir().unwrap();
    let fs = fs_at(dir.path());
    seal(&fs, slices).await;

    let store = Arc::new(PartitionStore::open(fs).await.unwrap());
    let pipeline = QueryPipeline::new(store);
    let hits = pipeline
        .submit(field("port", RelOp::Gt, Data::Count(1028)))
        .collect()
        .await;
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.ids.ids().collect::<Vec<_>>(), [1]);
    let row = hit.slice.iter_rows().nth(1).unwrap();
    assert_eq!(row.datum_at(2), DataRef::Count(1089));
}

fn zeek_slice(uids: &[&str]) -> TableSlice {
    let layout = Arc::new(
        Layout::new(
            "zeek.flow",
            Type::record([
                Field::new("ts", Type::time()),
                Field::new("uid", Type::string()),
            ]),
        )
        .unwrap(),
    );
    let mut builder = SliceBuilder::new(layout, EncodingTag::COLUMNAR);
    for (i, uid) in uids.iter().enumerate() {
        builder
            .push_row([
                DataRef::Time(Timestamp::from_nanos(i as i64)),
                DataRef::Str(uid),
            ])
            .unwrap();
    }
    builder.finish().unwrap()
}

/// The pivot heuristic: a zeek layout pivots on `uid`, and the
/// follow-up constrains the target type to the distinct values seen.
#[tokio::test]
async fn test_pivot_follow_up_query() {
    let dir = tempfile::tempdir().unwrap();
    let fs = fs_at(dir.path());
    seal(&fs, vec![zeek_slice(&["A", "B", "A"])]).await;

    let store = Arc::new(PartitionStore::open(fs).await.unwrap());
    let pipeline = QueryPipeline::new(store);
    let source = field("uid", RelOp::Ne, Data::Str("".into()));
    let follow_up = pivot(&pipeline, "zeek.conn", &source).await.unwrap();

    let expected = Expression::and([
        Expression::Predicate(Predicate::new(
            Extractor::Meta(MetaExtractor::Type),
            RelOp::Eq,
            Data::Str("zeek.conn".into()),
        )),
        field(
            "uid",
            RelOp::In,
            Data::List(vec![Data::Str("A".into()), Data::Str("B".into())]),
        ),
    ]);
    assert_eq!(follow_up, expected);
}

/// Row-by-row evaluation of a resolved expression, the oracle for the
/// pipeline-equivalence check.
fn eval_row(expr: &Expression, slice: &TableSlice, row: usize) -> bool {
    match expr {
        Expression::Predicate(p) => match &p.extractor {
            Extractor::Field(qualified) => {
                let layout = slice.layout();
                (0..layout.num_columns())
                    .find(|col| &layout.qualified_column(*col) == qualified)
                    .is_some_and(|col| evaluate(slice.at(row, col), p.op, &p.value))
            }
            Extractor::Meta(MetaExtractor::Type) => {
                evaluate(DataRef::Str(slice.layout().name()), p.op, &p.value)
            }
            _ => false,
        },
        Expression::Conjunction(exprs) => exprs.iter().all(|e| eval_row(e, slice, row)),
        Expression::Disjunction(exprs) => exprs.iter().any(|e| eval_row(e, slice, row)),
        Expression::Negation(inner) => !eval_row(inner, slice, row),
    }
}

/// Normalization preserves semantics, and partition evaluation agrees
/// with row-by-row evaluation, negations and all.
#[tokio::test]
async fn test_pipeline_equivalence() {
    let dir = tempfile::tempdir().unwrap();
    let fs = fs_at(dir.path());
    let slice = zeek_slice(&["A", "B", "C", "B"]);
    seal(&fs, vec![slice.clone()]).await;
    let store = PartitionStore::open(fs).await.unwrap();
    let uuid = store.uuids()[0];
    let partition = store.get(uuid).await.unwrap();

    let expressions = [
        field("uid", RelOp::Eq, Data::Str("B".into())),
        Expression::not(field("uid", RelOp::Eq, Data::Str("B".into()))),
        Expression::not(Expression::and([
            field("uid", RelOp::Ne, Data::Str("A".into())),
            Expression::not(field("uid", RelOp::Eq, Data::Str("C".into()))),
        ])),
        Expression::or([
            field("uid", RelOp::Eq, Data::Str("A".into())),
            Expression::not(field("uid", RelOp::Ge, Data::Str("B".into()))),
        ]),
    ];
    let mut schema = Schema::new();
    schema
        .add("zeek.flow", slice.layout().record().clone())
        .unwrap();
    for expr in expressions {
        let raw = partition.lookup(&expr).unwrap();
        let normalized = partition.lookup(&normalize(expr.clone())).unwrap();
        assert_eq!(raw, normalized, "{expr}");

        let resolved = resolve(&normalize(expr.clone()), &schema);
        let expected: Vec<u64> = (0..slice.rows() as usize)
            .filter(|row| eval_row(&resolved, &slice, *row))
            .map(|row| row as u64)
            .collect();
        assert_eq!(raw.ids().collect::<Vec<_>>(), expected, "{expr}");
    }
}

/// A partition that fails to load is excluded; the query continues
/// over the healthy ones.
#[tokio::test]
async fn test_corrupt_partition_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let fs = fs_at(dir.path());
    let good = seal(&fs, vec![zeek_slice(&["A"])]).await;
    let bad = seal(&fs, vec![zeek_slice(&["B"])]).await;

    // Flip a payload byte of the bad partition's segment.
    let path = spyglass_storage::partition::partition_path(bad).join("segment.bin");
    let mut bytes = fs.read(&path).await.unwrap().to_vec();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    fs.write(&path, bytes.into()).await.unwrap();

    let store = Arc::new(PartitionStore::open(fs).await.unwrap());
    assert_eq!(store.len(), 2);
    let pipeline = QueryPipeline::new(store);
    let hits = pipeline
        .submit(field("uid", RelOp::Ne, Data::Str("".into())))
        .collect()
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].partition, good);
}

/// Dropping the handle cancels the query without disturbing the store.
#[tokio::test]
async fn test_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let fs = fs_at(dir.path());
    seal(&fs, vec![zeek_slice(&["A", "B"])]).await;
    let store = Arc::new(PartitionStore::open(fs).await.unwrap());
    let pipeline = QueryPipeline::new(store.clone());

    let mut handle = pipeline.submit(field("uid", RelOp::Ne, Data::Str("".into())));
    handle.cancel();
    // Drain whatever was in flight; the channel closes promptly.
    while handle.next().await.is_some() {}

    // The store still answers fresh queries.
    let hits = pipeline
        .submit(field("uid", RelOp::Eq, Data::Str("A".into())))
        .collect()
        .await;
    assert_eq!(hits.len(), 1);
}
