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

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use spyglass_common::bitmap::Bitmap;
use spyglass_common::expr::{normalize, Expression};
use spyglass_common::slice::TableSlice;
use spyglass_storage::store::PartitionStore;

/// One delivery of a query: a slice that contains matches, plus the
/// exact ids within it that satisfy the expression.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub partition: Uuid,
    pub slice: TableSlice,
    pub ids: Bitmap,
}

/// Fans expressions out over the partition store.
///
/// Each submitted query runs as its own task, walking the partitions
/// one by one and streaming hits through a bounded channel. A partition
/// that fails to load or evaluate is excluded with a log entry; the
/// query continues over the remaining ones.
#[derive(Clone)]
pub struct QueryPipeline {
    store: Arc<PartitionStore>,
}

impl QueryPipeline {
    pub fn new(store: Arc<PartitionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    /// Start a query. Results arrive on the returned handle; dropping
    /// it cancels the query.
    pub fn submit(&self, expr: Expression) -> QueryHandle {
        let expr = normalize(expr);
        let (tx, rx) = mpsc::channel(16);
        let store = self.store.clone();
        let task = tokio::spawn(run_query(store, expr, tx));
        QueryHandle { rx, task }
    }
}

async fn run_query(store: Arc<PartitionStore>, expr: Expression, tx: mpsc::Sender<QueryHit>) {
    for uuid in store.uuids() {
        let partition = match store.get(uuid).await {
            Ok(partition) => partition,
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "excluding unloadable partition from query");
                continue;
            }
        };
        let ids = match partition.lookup(&expr) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "excluding partition from query");
                continue;
            }
        };
        if ids.is_empty() {
            continue;
        }
        let slices = match partition.slices(&ids) {
            Ok(slices) => slices,
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "failed to materialize slices");
                continue;
            }
        };
        for slice in slices {
            let mask = &ids & &slice.ids();
            if mask.is_empty() {
                continue;
            }
            let hit = QueryHit {
                partition: uuid,
                slice,
                ids: mask,
            };
            if tx.send(hit).await.is_err() {
                // Receiver gone: the query was cancelled.
                return;
            }
        }
    }
}

/// The consumer side of a running query.
pub struct QueryHandle {
    rx: mpsc::Receiver<QueryHit>,
    task: JoinHandle<()>,
}

impl QueryHandle {
    /// The next hit, or `None` once the query is exhausted.
    pub async fn next(&mut self) -> Option<QueryHit> {
        self.rx.recv().await
    }

    /// Drain the query to completion.
    pub async fn collect(mut self) -> Vec<QueryHit> {
        let mut hits = Vec::new();
        while let Some(hit) = self.next().await {
            hits.push(hit);
        }
        hits
    }

    /// Stop the query. Work already in flight inside a partition runs
    /// to completion; its results are dropped.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl futures::Stream for QueryHandle {
    type Item = QueryHit;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<QueryHit>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
