//! In-memory [`BlobContainer`].
//!
//! Keeps blobs and staged blocks in process memory and records every call it
//! receives. Used by the test suites of this workspace and handy for local
//! dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::blob::{
    BlobContainer, BlobError, BlobItem, BoxFuture, ByteProgress, WholeUploadOptions,
};

/// One call received by a [`MemoryContainer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Stage { blob: String, block_id: String },
    Commit { blob: String, block_ids: Vec<String> },
    UploadWhole { blob: String },
    DownloadRange { blob: String, offset: u64, len: u64 },
}

#[derive(Default)]
struct State {
    blobs: BTreeMap<String, Vec<u8>>,
    staged: HashMap<String, HashMap<String, Vec<u8>>>,
    calls: Vec<Call>,
    failing: HashSet<String>,
}

/// Blob container backed by a map of byte vectors.
#[derive(Default)]
pub struct MemoryContainer {
    state: Mutex<State>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` as a committed blob.
    pub fn insert_blob(&self, name: &str, data: Vec<u8>) {
        self.lock().blobs.insert(name.to_string(), data);
    }

    /// Returns the committed content of `name`.
    pub fn blob(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(name).cloned()
    }

    /// Committed blob names in sorted order.
    pub fn blob_names(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Makes every later operation on `blob` fail with a service error.
    pub fn fail_on(&self, blob: &str) {
        self.lock().failing.insert(blob.to_string());
    }

    /// Highest number of operations that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call` and marks an operation as running.
    fn enter(&self, call: Call, blob: Option<&str>) -> Result<Running<'_>, BlobError> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(blob) = blob
            && state.failing.contains(blob)
        {
            return Err(BlobError::Service(format!("injected failure for {blob}")));
        }
        drop(state);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Running { active: &self.active })
    }
}

struct Running<'a> {
    active: &'a AtomicUsize,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BlobContainer for MemoryContainer {
    fn list_blobs(
        &self,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Vec<BlobItem>, BlobError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            let _running = self.enter(Call::List, None)?;
            tokio::task::yield_now().await;
            Ok(self
                .lock()
                .blobs
                .iter()
                .map(|(name, data)| BlobItem {
                    name: name.clone(),
                    size: data.len() as u64,
                })
                .collect())
        })
    }

    fn stage_block<'a>(
        &'a self,
        blob: &'a str,
        block_id: &'a str,
        data: Vec<u8>,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            let call = Call::Stage {
                blob: blob.to_string(),
                block_id: block_id.to_string(),
            };
            let _running = self.enter(call, Some(blob))?;
            progress(data.len() as u64 / 2);
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            progress(data.len() as u64);
            self.lock()
                .staged
                .entry(blob.to_string())
                .or_default()
                .insert(block_id.to_string(), data);
            Ok(())
        })
    }

    fn commit_block_list<'a>(
        &'a self,
        blob: &'a str,
        block_ids: &'a [String],
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            let call = Call::Commit {
                blob: blob.to_string(),
                block_ids: block_ids.to_vec(),
            };
            let _running = self.enter(call, Some(blob))?;
            tokio::task::yield_now().await;

            let mut state = self.lock();
            let staged = state.staged.remove(blob).unwrap_or_default();
            let mut content = Vec::new();
            for id in block_ids {
                let block = staged
                    .get(id)
                    .ok_or_else(|| BlobError::Service(format!("block {id} not staged for {blob}")))?;
                content.extend_from_slice(block);
            }
            state.blobs.insert(blob.to_string(), content);
            Ok(())
        })
    }

    fn upload_whole<'a>(
        &'a self,
        blob: &'a str,
        file: &'a Path,
        _options: WholeUploadOptions,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            let call = Call::UploadWhole {
                blob: blob.to_string(),
            };
            let _running = self.enter(call, Some(blob))?;
            tokio::task::yield_now().await;
            let data = tokio::fs::read(file).await?;
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            progress(data.len() as u64);
            self.lock().blobs.insert(blob.to_string(), data);
            Ok(())
        })
    }

    fn download_range<'a>(
        &'a self,
        blob: &'a str,
        offset: u64,
        len: u64,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, BlobError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }
            let call = Call::DownloadRange {
                blob: blob.to_string(),
                offset,
                len,
            };
            let _running = self.enter(call, Some(blob))?;
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                return Err(BlobError::Cancelled);
            }

            let state = self.lock();
            let data = state
                .blobs
                .get(blob)
                .ok_or_else(|| BlobError::NotFound(blob.to_string()))?;
            let start = (offset as usize).min(data.len());
            let end = (offset.saturating_add(len) as usize).min(data.len());
            let range = data[start..end].to_vec();
            drop(state);

            progress(range.len() as u64);
            Ok(range)
        })
    }
}
