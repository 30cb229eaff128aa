use std::time::Duration;

use crate::TransferError;
use crate::progress::ProgressTracker;

/// A file discovered under the source root or listed in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the transfer root, always `/`-separated.
    pub relative_path: String,
    /// Size in bytes.
    pub size: u64,
}

/// A contiguous byte range of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position of the block within its file.
    pub index: usize,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
    /// Base64 block id, unique within the file.
    pub id: String,
}

/// A file of a job together with its block plan.
///
/// An empty plan means the file moves in one whole-file call.
#[derive(Debug, Clone)]
pub struct JobFile {
    pub entry: FileEntry,
    pub blocks: Vec<Block>,
}

/// Lifecycle of a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Enumerating,
    Transferring,
    Committing,
    Done,
    Aborted,
}

impl JobState {
    /// Returns `true` if `next` is a legal successor.
    ///
    /// Commits are flushed at every batch wait-point, so a job alternates
    /// between `Transferring` and `Committing` until it finishes.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Enumerating, Transferring)
                | (Transferring, Committing | Done | Aborted)
                | (Committing, Transferring | Done | Aborted)
        )
    }
}

/// State of one upload or download invocation.
pub struct TransferJob {
    state: JobState,
    files: Vec<JobFile>,
    total_size: u64,
    progress: ProgressTracker,
}

impl TransferJob {
    /// Creates a job from the enumerated files.
    ///
    /// `slots` is the size of the in-flight counter arena.
    pub fn new(files: Vec<JobFile>, slots: usize) -> Self {
        let total_size = files.iter().map(|f| f.entry.size).sum();
        Self {
            state: JobState::Enumerating,
            files,
            total_size,
            progress: ProgressTracker::new(total_size, slots),
        }
    }

    /// Moves to `next`, rejecting illegal transitions.
    pub fn advance(&mut self, next: JobState) -> Result<(), TransferError> {
        if !self.state.can_advance_to(next) {
            return Err(TransferError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "job state");
        self.state = next;
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Files in transfer order.
    pub fn files(&self) -> &[JobFile] {
        &self.files
    }

    /// Sum of all file sizes; the progress denominator.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Progress accumulator for this job.
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }
}

/// Counters and timing of a finished or interrupted job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferSummary {
    pub files: usize,
    pub total_bytes: u64,
    /// Bytes whose operations fully completed.
    pub transferred_bytes: u64,
    pub whole_uploads: usize,
    pub blocks_staged: usize,
    pub commits: usize,
    pub ranges_downloaded: usize,
    pub elapsed: Duration,
    pub bytes_per_second: f64,
}

/// Result of a job that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed(TransferSummary),
    /// Stopped by the progress callback or the caller's token. Blocks
    /// committed before the stop may remain remotely.
    Interrupted(TransferSummary),
}

impl TransferOutcome {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    pub fn summary(&self) -> &TransferSummary {
        match self {
            Self::Completed(s) | Self::Interrupted(s) => s,
        }
    }
}
