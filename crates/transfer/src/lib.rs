//! Chunked block transfer between a local tree and a blob container.
//!
//! Large files are split into fixed-size blocks that are staged and then
//! committed (upload) or range-downloaded and reassembled in order
//! (download). At most `max_in_flight` operations are outstanding at once,
//! progress is reported as a whole percentage, and a shared cancellation
//! token stops every operation of a job.

mod blob;
mod chunked;
mod config;
mod engine;
pub mod memory;
mod progress;
mod scanner;
mod types;
mod validation;

pub use blob::{
    BlobContainer, BlobError, BlobItem, BoxFuture, ByteProgress, WholeUploadOptions,
};
pub use chunked::{ChunkWriter, block_id, plan_blocks, read_block};
pub use config::TransferConfig;
pub use engine::BlockTransferEngine;
pub use progress::ProgressTracker;
pub use scanner::scan_source;
pub use types::{
    Block, FileEntry, JobFile, JobState, TransferJob, TransferOutcome, TransferSummary,
};
pub use validation::validate_relative_path;

/// Default block size: 100 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 100 * 1024 * 1024;

/// Files strictly larger than this are staged block by block.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default bound on concurrently outstanding block/file operations.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default inner parallelism for whole-file uploads.
pub const DEFAULT_WHOLE_FILE_CONCURRENCY: usize = 4;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("blob operation failed on {target}: {source}")]
    Blob {
        target: String,
        #[source]
        source: BlobError,
    },

    #[error("download incomplete: {0}")]
    Incomplete(String),

    #[error("invalid job state transition: {from:?} -> {to:?}")]
    InvalidState { from: JobState, to: JobState },

    #[error("invalid transfer config: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
