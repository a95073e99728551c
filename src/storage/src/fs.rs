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

//! The filesystem actor: a single task owning a root directory, serving
//! one persistence request at a time. Callers hold a clone-able
//! [`Filesystem`] handle; every request gets its own reply channel, so
//! concurrent callers never observe each other's failures. Counters are
//! only touched inside the actor and are therefore race-free.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use spyglass_common::accountant::Accountant;
use spyglass_common::error::{Error, Result};
use spyglass_common::status::{StatusRecord, Verbosity};
use spyglass_common::types::Data;

/// A shared immutable byte buffer, either heap-allocated or backed by a
/// memory mapping. Cloning never copies the contents.
#[derive(Clone)]
pub enum Chunk {
    Heap(Bytes),
    Mapped(Arc<memmap2::Mmap>),
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Chunk::Heap(bytes) => bytes,
            Chunk::Mapped(map) => map,
        }
    }

    /// A [`Bytes`] view of `range`. Zero-copy for heap chunks; mapped
    /// chunks copy only the requested range.
    pub fn bytes(&self, range: std::ops::Range<usize>) -> Bytes {
        match self {
            Chunk::Heap(bytes) => bytes.slice(range),
            Chunk::Mapped(map) => Bytes::copy_from_slice(&map[range]),
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Chunk::Heap(_) => "heap",
            Chunk::Mapped(_) => "mapped",
        };
        write!(f, "Chunk({kind}, {} bytes)", self.len())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilesystemConfig {
    pub root: PathBuf,
}

enum FsRequest {
    Check {
        path: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    List {
        path: PathBuf,
        reply: oneshot::Sender<Result<Vec<PathBuf>>>,
    },
    Write {
        path: PathBuf,
        bytes: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Read {
        path: PathBuf,
        reply: oneshot::Sender<Result<Bytes>>,
    },
    Mmap {
        path: PathBuf,
        reply: oneshot::Sender<Result<Chunk>>,
    },
    Erase {
        path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        verbosity: Verbosity,
        reply: oneshot::Sender<Data>,
    },
}

/// The handle to a filesystem actor.
#[derive(Clone, Debug)]
pub struct Filesystem {
    tx: mpsc::UnboundedSender<FsRequest>,
}

impl Filesystem {
    /// Spawn a filesystem actor rooted at `config.root`.
    pub fn spawn(config: FilesystemConfig) -> Self {
        Self::spawn_with_accountant(config, None)
    }

    pub fn spawn_with_accountant(config: FilesystemConfig, accountant: Option<Accountant>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = FilesystemActor {
            root: config.root,
            counters: Counters::default(),
            accountant,
        };
        tokio::spawn(actor.run(rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> FsRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::Stalled("filesystem actor is gone".into()))?;
        rx.await
            .map_err(|_| Error::Stalled("filesystem actor dropped the request".into()))
    }

    /// Whether `path` exists.
    pub async fn check(&self, path: impl Into<PathBuf>) -> Result<bool> {
        let path = path.into();
        self.request(|reply| FsRequest::Check { path, reply }).await
    }

    /// The entries of the directory at `path`, relative to the root.
    pub async fn list(&self, path: impl Into<PathBuf>) -> Result<Vec<PathBuf>> {
        let path = path.into();
        self.request(|reply| FsRequest::List { path, reply })
            .await?
    }

    pub async fn write(&self, path: impl Into<PathBuf>, bytes: Bytes) -> Result<()> {
        let path = path.into();
        self.request(|reply| FsRequest::Write { path, bytes, reply })
            .await?
    }

    pub async fn read(&self, path: impl Into<PathBuf>) -> Result<Bytes> {
        let path = path.into();
        self.request(|reply| FsRequest::Read { path, reply }).await?
    }

    pub async fn mmap(&self, path: impl Into<PathBuf>) -> Result<Chunk> {
        let path = path.into();
        self.request(|reply| FsRequest::Mmap { path, reply }).await?
    }

    pub async fn erase(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.request(|reply| FsRequest::Erase { path, reply })
            .await?
    }

    pub async fn status(&self, verbosity: Verbosity) -> Result<Data> {
        self.request(|reply| FsRequest::Status { verbosity, reply })
            .await
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct OpCounters {
    successful: u64,
    failed: u64,
    bytes: u64,
}

impl OpCounters {
    fn record<T>(&mut self, result: &Result<T>, bytes: u64) {
        match result {
            Ok(_) => {
                self.successful += 1;
                self.bytes += bytes;
            }
            Err(_) => self.failed += 1,
        }
    }

    fn status(&self) -> Data {
        StatusRecord::new()
            .put("successful", self.successful)
            .put("failed", self.failed)
            .put("bytes", self.bytes)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    checks: OpCounters,
    writes: OpCounters,
    reads: OpCounters,
    mmaps: OpCounters,
    erases: OpCounters,
}

struct FilesystemActor {
    root: PathBuf,
    counters: Counters,
    accountant: Option<Accountant>,
}

impl FilesystemActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<FsRequest>) {
        while let Some(request) = rx.recv().await {
            self.handle(request);
        }
        tracing::debug!(root = %self.root.display(), "filesystem actor shutting down");
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.root.join(path)
        }
    }

    fn handle(&mut self, request: FsRequest) {
        match request {
            FsRequest::Check { path, reply } => {
                let exists = self.resolve(&path).exists();
                self.counters.checks.record(&Ok(()), 0);
                let _ = reply.send(exists);
            }
            FsRequest::List { path, reply } => {
                let result = self.list(&path);
                self.counters.checks.record(&result, 0);
                let _ = reply.send(result);
            }
            FsRequest::Write { path, bytes, reply } => {
                let len = bytes.len() as u64;
                let result = self.write(&path, &bytes);
                self.counters.writes.record(&result, len);
                if let (Some(accountant), Ok(())) = (&self.accountant, &result) {
                    accountant.announce("filesystem.writes.bytes", len);
                }
                let _ = reply.send(result);
            }
            FsRequest::Read { path, reply } => {
                let result = self.read(&path);
                let len = result.as_ref().map_or(0, |b| b.len() as u64);
                self.counters.reads.record(&result, len);
                let _ = reply.send(result);
            }
            FsRequest::Mmap { path, reply } => {
                let result = self.mmap(&path);
                let len = result.as_ref().map_or(0, |c| c.len() as u64);
                self.counters.mmaps.record(&result, len);
                let _ = reply.send(result);
            }
            FsRequest::Erase { path, reply } => {
                let result = self.erase(&path);
                self.counters.erases.record(&result, 0);
                let _ = reply.send(result);
            }
            FsRequest::Status { verbosity, reply } => {
                let _ = reply.send(self.status(verbosity));
            }
        }
    }

    fn list(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.resolve(path);
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            entries.push(path.join(entry?.file_name()));
        }
        entries.sort();
        Ok(entries)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(resolved, bytes)?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Bytes> {
        Ok(std::fs::read(self.resolve(path))?.into())
    }

    fn mmap(&self, path: &Path) -> Result<Chunk> {
        let file = std::fs::File::open(self.resolve(path))?;
        // The mapping stays valid because partition files are immutable
        // once written and erased only after readers are gone.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Ok(Chunk::Mapped(Arc::new(map)))
    }

    fn erase(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        if resolved.is_dir() {
            std::fs::remove_dir_all(resolved)?;
        } else {
            std::fs::remove_file(resolved)?;
        }
        Ok(())
    }

    fn status(&self, verbosity: Verbosity) -> Data {
        let mut status = StatusRecord::new();
        status.put("type", "filesystem");
        if verbosity >= Verbosity::Info {
            status.put("root", self.root.display().to_string());
            let total = |c: OpCounters| c.successful + c.failed;
            status.put(
                "operations",
                total(self.counters.checks)
                    + total(self.counters.writes)
                    + total(self.counters.reads)
                    + total(self.counters.mmaps)
                    + total(self.counters.erases),
            );
        }
        if verbosity >= Verbosity::Detailed {
            status.put("checks", self.counters.checks.status());
            status.put("writes", self.counters.writes.status());
            status.put("reads", self.counters.reads.status());
            status.put("mmaps", self.counters.mmaps.status());
            status.put("erases", self.counters.erases.status());
        }
        status.finish()
    }
}
