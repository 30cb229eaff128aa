//! Blob container contract.
//!
//! The wire protocol (HTTP range reads, block staging) lives outside this
//! crate. Callers provide a [`BlobContainer`] bound to one container; the
//! engine only sees these five operations.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Boxed future returned by [`BlobContainer`] operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte-level progress for one operation: total bytes moved so far.
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// A blob listed in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub size: u64,
}

/// Tuning passed to single-call whole-file uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WholeUploadOptions {
    /// Sub-range size the client may use internally.
    pub block_size: u64,
    /// Parallel sub-ranges the client may use internally.
    pub concurrency: usize,
}

/// Errors reported by a blob container.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("cancelled")]
    Cancelled,

    #[error("service error: {0}")]
    Service(String),
}

/// Operations consumed from the remote blob store.
///
/// Every operation receives the job's cancellation token and should return
/// [`BlobError::Cancelled`] promptly once it fires.
pub trait BlobContainer: Send + Sync {
    /// Lists every blob in the container.
    fn list_blobs(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<Vec<BlobItem>, BlobError>>;

    /// Stages one block of `blob` under `block_id`.
    fn stage_block<'a>(
        &'a self,
        blob: &'a str,
        block_id: &'a str,
        data: Vec<u8>,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>>;

    /// Commits the staged blocks of `blob` in the given order.
    fn commit_block_list<'a>(
        &'a self,
        blob: &'a str,
        block_ids: &'a [String],
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>>;

    /// Uploads a whole local file as `blob` in one call.
    fn upload_whole<'a>(
        &'a self,
        blob: &'a str,
        file: &'a Path,
        options: WholeUploadOptions,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), BlobError>>;

    /// Downloads `len` bytes of `blob` starting at `offset`.
    fn download_range<'a>(
        &'a self,
        blob: &'a str,
        offset: u64,
        len: u64,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, BlobError>>;
}
