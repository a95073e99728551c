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

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use spyglass_common::error::{Error, Result};
use spyglass_common::status::{StatusRecord, Verbosity};
use spyglass_common::types::Data;

use crate::fs::Filesystem;
use crate::partition::{partition_path, LoadState, PassivePartition, META_FILE, PARTITION_DIR};

#[derive(Clone)]
enum Slot {
    /// Known on disk, not loaded yet.
    Unloaded,
    Loaded(Arc<PassivePartition>),
}

/// Tracks the sealed partitions under `partitions/` and hands out
/// shared handles, loading lazily. Directories without a `meta.json`
/// are leftovers of an interrupted seal and are garbage-collected at
/// scan time.
pub struct PartitionStore {
    fs: Filesystem,
    slots: RwLock<BTreeMap<Uuid, Slot>>,
}

impl PartitionStore {
    /// Scan the partition root and build the store.
    pub async fn open(fs: Filesystem) -> Result<Self> {
        let entries = match fs.list(PARTITION_DIR).await {
            Ok(entries) => entries,
            // A store that never sealed anything has no directory yet.
            Err(Error::NoSuchFile(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let mut slots = BTreeMap::new();
        for entry in entries {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(uuid) = name.parse::<Uuid>() else {
                tracing::warn!(entry = name, "ignoring foreign entry in partition root");
                continue;
            };
            if !fs.check(entry.join(META_FILE)).await? {
                tracing::warn!(%uuid, "garbage-collecting partition leftovers without meta.json");
                if let Err(e) = fs.erase(&entry).await {
                    tracing::warn!(%uuid, error = %e, "failed to garbage-collect");
                }
                continue;
            }
            slots.insert(uuid, Slot::Unloaded);
        }
        tracing::debug!(partitions = slots.len(), "scanned partition root");
        Ok(Self {
            fs,
            slots: RwLock::new(slots),
        })
    }

    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    /// The uuids of all known partitions, in uuid order.
    pub fn uuids(&self) -> Vec<Uuid> {
        self.slots.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Register a freshly sealed partition.
    pub fn register(&self, uuid: Uuid) {
        self.slots.write().entry(uuid).or_insert(Slot::Unloaded);
    }

    /// The shared handle for `uuid`, loading the partition on first
    /// use.
    pub async fn get(&self, uuid: Uuid) -> Result<Arc<PassivePartition>> {
        match self.slots.read().get(&uuid) {
            None => {
                return Err(Error::NoSuchFile(format!("unknown partition {uuid}")));
            }
            Some(Slot::Loaded(partition)) => return Ok(partition.clone()),
            Some(Slot::Unloaded) => {}
        }
        let partition = Arc::new(PassivePartition::load(&self.fs, uuid).await?);
        let mut slots = self.slots.write();
        match slots.get(&uuid) {
            // Someone else finished loading first; keep their handle.
            Some(Slot::Loaded(existing)) => Ok(existing.clone()),
            Some(Slot::Unloaded) => {
                slots.insert(uuid, Slot::Loaded(partition.clone()));
                Ok(partition)
            }
            None => Err(Error::NoSuchFile(format!("partition {uuid} was erased"))),
        }
    }

    /// Erase a partition's files and forget it.
    pub async fn erase(&self, uuid: Uuid) -> Result<()> {
        let slot = self.slots.write().remove(&uuid);
        match slot {
            None => Err(Error::NoSuchFile(format!("unknown partition {uuid}"))),
            Some(Slot::Loaded(partition)) => partition.erase(&self.fs).await,
            Some(Slot::Unloaded) => self.fs.erase(partition_path(uuid)).await,
        }
    }

    pub fn status(&self, verbosity: Verbosity) -> Data {
        let slots = self.slots.read();
        let mut status = StatusRecord::new();
        status.put("type", "partition-store");
        status.put("partitions", slots.len() as u64);
        if verbosity >= Verbosity::Detailed {
            let entries = slots
                .iter()
                .map(|(uuid, slot)| {
                    let state = match slot {
                        Slot::Unloaded => LoadState::WaitingForChunk.to_string(),
                        Slot::Loaded(p) => p.state().to_string(),
                    };
                    Data::Record(vec![
                        ("uuid".into(), Data::Str(uuid.to_string())),
                        ("state".into(), Data::Str(state)),
                    ])
                })
                .collect();
            status.put("entries", Data::List(entries));
        }
        status.finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use spyglass_common::expr::{Expression, Predicate, RelOp};
    use spyglass_common::schema::Layout;
    use spyglass_common::slice::{EncodingTag, SliceBuilder};
    use spyglass_common::types::{DataRef, Field, Timestamp, Type};

    use crate::fs::FilesystemConfig;
    use crate::partition::{ActivePartition, PartitionConfig};

    use super::*;

    fn fs_at(root: &std::path::Path) -> Filesystem {
        Filesystem::spawn(FilesystemConfig {
            root: root.to_owned(),
        })
    }

    fn one_row_slice(port: u64) -> spyglass_common::slice::TableSlice {
        let layout = Arc::new(
            Layout::new(
                "test.flow",
                Type::record([
                    Field::new("ts", Type::time()),
                    Field::new("port", Type::count()),
                ]),
            )
            .unwrap(),
        );
        let mut builder = SliceBuilder::new(layout, EncodingTag::COLUMNAR);
        builder
            .push_row([
                DataRef::Time(Timestamp::from_nanos(1)),
                DataRef::Count(port),
            ])
            .unwrap();
        builder.finish().unwrap()
    }

    async fn seal_one(fs: &Filesystem, port: u64) -> Uuid {
        let mut active = ActivePartition::new(PartitionConfig::default());
        active.add(&one_row_slice(port)).unwrap();
        active.seal(fs).await.unwrap().uuid
    }

    #[tokio::test]
    async fn test_scan_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let a = seal_one(&fs, 80).await;
        let b = seal_one(&fs, 443).await;

        let store = PartitionStore::open(fs).await.unwrap();
        let mut uuids = store.uuids();
        uuids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(uuids, expected);

        let partition = store.get(a).await.unwrap();
        let again = store.get(a).await.unwrap();
        assert!(Arc::ptr_eq(&partition, &again));
    }

    #[tokio::test]
    async fn test_scan_garbage_collects_partial_directories() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let good = seal_one(&fs, 80).await;

        // A crashed seal: segment written, no meta.json.
        let orphan = Uuid::new_v4();
        fs.write(
            partition_path(orphan).join("segment.bin"),
            Bytes::from_static(b"partial"),
        )
        .await
        .unwrap();

        let store = PartitionStore::open(fs.clone()).await.unwrap();
        assert_eq!(store.uuids(), [good]);
        assert!(!fs.check(partition_path(orphan)).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::open(fs_at(dir.path())).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_erase_forgets_partition() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fs_at(dir.path());
        let uuid = seal_one(&fs, 80).await;

        let store = PartitionStore::open(fs.clone()).await.unwrap();
        let partition = store.get(uuid).await.unwrap();
        let query = Expression::Predicate(Predicate::field("port", RelOp::Eq, Data::Count(80)));
        assert_eq!(partition.lookup(&query).unwrap().cardinality(), 1);

        store.erase(uuid).await.unwrap();
        assert!(store.get(uuid).await.is_err());
        assert!(partition.lookup(&query).is_err(), "handle is terminal");

        // A fresh scan no longer sees it.
        let rescan = PartitionStore::open(fs).await.unwrap();
        assert!(rescan.is_empty());
    }
}
