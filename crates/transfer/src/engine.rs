//! Block transfer engine.
//!
//! One control task drives each job. Operations are issued in batches of at
//! most `max_in_flight`; the engine waits for a whole batch before issuing the
//! next one, and flushes the commits that batch made possible at the same
//! wait-point.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::TransferError;
use crate::blob::{BlobContainer, BlobError, ByteProgress, WholeUploadOptions};
use crate::chunked::{ChunkWriter, plan_blocks, read_block};
use crate::config::TransferConfig;
use crate::scanner::scan_source;
use crate::types::{
    Block, FileEntry, JobFile, JobState, TransferJob, TransferOutcome, TransferSummary,
};
use crate::validation::validate_relative_path;

/// One remote call of a job.
#[derive(Debug, Clone)]
enum Operation {
    /// Single-call upload of a small file.
    Whole { file: usize },
    /// Stage one block of a large file.
    Stage { file: usize, block: Block },
    /// Download one range of a blob.
    Fetch { file: usize, block: Block },
}

impl Operation {
    fn file(&self) -> usize {
        match self {
            Self::Whole { file } | Self::Stage { file, .. } | Self::Fetch { file, .. } => *file,
        }
    }

    fn bytes(&self, job: &TransferJob) -> u64 {
        match self {
            Self::Whole { file } => job.files()[*file].entry.size,
            Self::Stage { block, .. } | Self::Fetch { block, .. } => block.len,
        }
    }

    fn target(&self, job: &TransferJob) -> String {
        let name = &job.files()[self.file()].entry.relative_path;
        match self {
            Self::Whole { .. } => name.clone(),
            Self::Stage { block, .. } | Self::Fetch { block, .. } => {
                format!("{name} (block {} at {})", block.index, block.offset)
            }
        }
    }
}

enum BatchOutcome {
    /// Every operation finished; `(slot, downloaded bytes)` in completion order.
    Completed(Vec<(usize, Option<Vec<u8>>)>),
    Interrupted,
}

#[derive(Debug, Default)]
struct Counters {
    whole_uploads: usize,
    blocks_staged: usize,
    commits: usize,
    ranges_downloaded: usize,
}

/// Moves files between a local tree and one blob container.
pub struct BlockTransferEngine {
    container: Arc<dyn BlobContainer>,
    config: TransferConfig,
}

impl BlockTransferEngine {
    /// Creates an engine bound to `container`.
    pub fn new(container: Arc<dyn BlobContainer>, config: TransferConfig) -> Self {
        Self { container, config }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads `source` (a directory or a single file) into the container.
    ///
    /// `on_progress` receives each new whole percentage and returns `false`
    /// to cancel. Cancellation, from the callback or from `cancel`, yields
    /// [`TransferOutcome::Interrupted`]; only real failures are errors.
    pub async fn upload<F>(
        &self,
        source: &Path,
        mut on_progress: F,
        cancel: CancellationToken,
    ) -> Result<TransferOutcome, TransferError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        self.config.validate()?;
        let started = Instant::now();
        let cancel = cancel.child_token();

        let (root, entries, total_size) = scan_source(source)?;
        let files = entries
            .into_iter()
            .map(|entry| {
                let blocks = if entry.size > self.config.large_file_threshold {
                    plan_blocks(entry.size, self.config.block_size)
                } else {
                    Vec::new()
                };
                JobFile { entry, blocks }
            })
            .collect();
        let mut job = TransferJob::new(files, self.config.max_in_flight);
        info!(
            source = %source.display(),
            files = job.files().len(),
            total_bytes = total_size,
            "upload enumerated"
        );
        job.advance(JobState::Transferring)?;

        let operations = upload_plan(&job);
        let mut staged = vec![0usize; job.files().len()];
        let mut counters = Counters::default();

        for batch in operations.chunks(self.config.max_in_flight) {
            if cancel.is_cancelled() {
                return self.interrupted(&mut job, counters, started);
            }

            let completed = match self
                .run_batch(&job, &root, batch, &mut on_progress, &cancel)
                .await
            {
                Ok(BatchOutcome::Completed(completed)) => completed,
                Ok(BatchOutcome::Interrupted) => {
                    return self.interrupted(&mut job, counters, started);
                }
                Err(err) => {
                    job.advance(JobState::Aborted)?;
                    return Err(err);
                }
            };

            let mut ready = Vec::new();
            for (slot, _) in completed {
                match &batch[slot] {
                    Operation::Whole { .. } => counters.whole_uploads += 1,
                    Operation::Stage { file, .. } => {
                        counters.blocks_staged += 1;
                        staged[*file] += 1;
                        if staged[*file] == job.files()[*file].blocks.len() {
                            ready.push(*file);
                        }
                    }
                    Operation::Fetch { .. } => {}
                }
            }

            if ready.is_empty() {
                continue;
            }
            ready.sort_unstable();
            job.advance(JobState::Committing)?;
            for file in ready {
                match self.commit(&job, file, &cancel).await {
                    Ok(()) => counters.commits += 1,
                    Err(BlobError::Cancelled) => {
                        return self.interrupted(&mut job, counters, started);
                    }
                    Err(source) => {
                        let target = job.files()[file].entry.relative_path.clone();
                        error!(blob = %target, error = %source, "block commit failed");
                        job.advance(JobState::Aborted)?;
                        return Err(TransferError::Blob { target, source });
                    }
                }
            }
            job.advance(JobState::Transferring)?;
        }

        self.completed(&mut job, &mut on_progress, counters, started)
    }

    /// Downloads every blob of the container under `destination`.
    ///
    /// Blob names become relative paths below `destination`; names that
    /// would escape it are rejected before anything is written.
    pub async fn download<F>(
        &self,
        destination: &Path,
        mut on_progress: F,
        cancel: CancellationToken,
    ) -> Result<TransferOutcome, TransferError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        self.config.validate()?;
        let started = Instant::now();
        let cancel = cancel.child_token();

        let items = match self.container.list_blobs(cancel.clone()).await {
            Ok(items) => items,
            Err(BlobError::Cancelled) => {
                info!("download cancelled while listing");
                return Ok(TransferOutcome::Interrupted(TransferSummary {
                    elapsed: started.elapsed(),
                    ..TransferSummary::default()
                }));
            }
            Err(source) => {
                return Err(TransferError::Blob {
                    target: "container listing".into(),
                    source,
                });
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            validate_relative_path(&item.name)?;
            entries.push(FileEntry {
                relative_path: item.name,
                size: item.size,
            });
        }
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let files = entries
            .into_iter()
            .map(|entry| {
                let blocks = if entry.size > self.config.large_file_threshold {
                    plan_blocks(entry.size, self.config.block_size)
                } else {
                    plan_blocks(entry.size, entry.size)
                };
                JobFile { entry, blocks }
            })
            .collect();
        let mut job = TransferJob::new(files, self.config.max_in_flight);
        info!(
            destination = %destination.display(),
            files = job.files().len(),
            total_bytes = job.total_size(),
            "download enumerated"
        );

        tokio::fs::create_dir_all(destination).await?;
        let mut writer = ChunkWriter::new(destination);
        for file in job.files() {
            writer
                .expect(&file.entry.relative_path, file.blocks.len())
                .await?;
        }
        job.advance(JobState::Transferring)?;

        let operations = download_plan(&job);
        let mut counters = Counters::default();

        for batch in operations.chunks(self.config.max_in_flight) {
            if cancel.is_cancelled() {
                return self.interrupted(&mut job, counters, started);
            }

            let mut completed = match self
                .run_batch(&job, destination, batch, &mut on_progress, &cancel)
                .await
            {
                Ok(BatchOutcome::Completed(completed)) => completed,
                Ok(BatchOutcome::Interrupted) => {
                    return self.interrupted(&mut job, counters, started);
                }
                Err(err) => {
                    job.advance(JobState::Aborted)?;
                    return Err(err);
                }
            };

            completed.sort_by_key(|(slot, _)| *slot);
            for (slot, data) in completed {
                if let (Operation::Fetch { file, block }, Some(data)) = (&batch[slot], data) {
                    let path = &job.files()[*file].entry.relative_path;
                    if let Err(err) = writer.write_chunk(path, block.index, data).await {
                        job.advance(JobState::Aborted)?;
                        return Err(err);
                    }
                    counters.ranges_downloaded += 1;
                }
            }
        }

        let incomplete = writer.incomplete();
        if !incomplete.is_empty() {
            let missing = incomplete.join(", ");
            job.advance(JobState::Aborted)?;
            return Err(TransferError::Incomplete(missing));
        }

        self.completed(&mut job, &mut on_progress, counters, started)
    }

    /// Runs one batch to completion.
    ///
    /// Every completion zeroes its slot, adds its bytes to the job total and
    /// may trigger the progress callback. The first failure cancels the
    /// remaining operations of the batch and is returned once they settle.
    async fn run_batch<F>(
        &self,
        job: &TransferJob,
        root: &Path,
        batch: &[Operation],
        on_progress: &mut F,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, TransferError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        let mut in_flight: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(slot, op)| {
                let progress = job.progress().slot_reporter(slot);
                let cancel = cancel.clone();
                async move { (slot, self.execute(job, root, op, progress, cancel).await) }
            })
            .collect();

        let mut completed = Vec::with_capacity(batch.len());
        let mut interrupted = false;
        let mut failure = None;

        while let Some((slot, result)) = in_flight.next().await {
            match result {
                Ok(data) => {
                    let op = &batch[slot];
                    if let Some(percentage) = job.progress().complete(slot, op.bytes(job)) {
                        debug!(percentage, "transfer progress");
                        if !interrupted && !on_progress(percentage) {
                            info!(percentage, "transfer cancelled by progress callback");
                            cancel.cancel();
                            interrupted = true;
                        }
                    }
                    completed.push((slot, data));
                }
                Err(BlobError::Cancelled) => interrupted = true,
                Err(source) => {
                    if failure.is_none() {
                        let target = batch[slot].target(job);
                        error!(blob = %target, error = %source, "blob operation failed");
                        failure = Some(TransferError::Blob { target, source });
                        cancel.cancel();
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if interrupted || cancel.is_cancelled() {
            return Ok(BatchOutcome::Interrupted);
        }
        Ok(BatchOutcome::Completed(completed))
    }

    /// Runs one operation, racing it against the job's cancellation token.
    async fn execute(
        &self,
        job: &TransferJob,
        root: &Path,
        op: &Operation,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<u8>>, BlobError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BlobError::Cancelled),
            result = self.perform(job, root, op, progress, cancel.clone()) => result,
        }
    }

    async fn perform(
        &self,
        job: &TransferJob,
        root: &Path,
        op: &Operation,
        progress: ByteProgress,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<u8>>, BlobError> {
        let entry = &job.files()[op.file()].entry;
        let name = entry.relative_path.as_str();

        match op {
            Operation::Whole { .. } => {
                let path = root.join(name);
                let options = WholeUploadOptions {
                    block_size: self.config.block_size,
                    concurrency: self.config.whole_file_concurrency,
                };
                self.container
                    .upload_whole(name, &path, options, progress, cancel)
                    .await?;
                debug!(blob = name, bytes = entry.size, "file uploaded");
                Ok(None)
            }
            Operation::Stage { block, .. } => {
                let path = root.join(name);
                let data = read_block(&path, block.offset, block.len).await?;
                self.container
                    .stage_block(name, &block.id, data, progress, cancel)
                    .await?;
                debug!(blob = name, block = block.index, bytes = block.len, "block staged");
                Ok(None)
            }
            Operation::Fetch { block, .. } => {
                let data = self
                    .container
                    .download_range(name, block.offset, block.len, progress, cancel)
                    .await?;
                if data.len() as u64 != block.len {
                    return Err(BlobError::Service(format!(
                        "short range read: expected {} bytes, got {}",
                        block.len,
                        data.len()
                    )));
                }
                debug!(blob = name, block = block.index, bytes = block.len, "range downloaded");
                Ok(Some(data))
            }
        }
    }

    async fn commit(
        &self,
        job: &TransferJob,
        file: usize,
        cancel: &CancellationToken,
    ) -> Result<(), BlobError> {
        let job_file = &job.files()[file];
        let ids: Vec<String> = job_file.blocks.iter().map(|b| b.id.clone()).collect();
        let name = job_file.entry.relative_path.as_str();

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BlobError::Cancelled),
            result = self.container.commit_block_list(name, &ids, cancel.clone()) => {
                result?;
                debug!(blob = name, blocks = ids.len(), "block list committed");
                Ok(())
            }
        }
    }

    fn completed<F>(
        &self,
        job: &mut TransferJob,
        on_progress: &mut F,
        counters: Counters,
        started: Instant,
    ) -> Result<TransferOutcome, TransferError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        job.advance(JobState::Done)?;
        if let Some(percentage) = job.progress().finish() {
            // The job is already done; a late `false` has nothing left to stop.
            let _ = on_progress(percentage);
        }

        let summary = summarize(job, counters, started);
        info!(
            files = summary.files,
            bytes = summary.transferred_bytes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            bytes_per_second = summary.bytes_per_second,
            "transfer completed"
        );
        Ok(TransferOutcome::Completed(summary))
    }

    fn interrupted(
        &self,
        job: &mut TransferJob,
        counters: Counters,
        started: Instant,
    ) -> Result<TransferOutcome, TransferError> {
        job.advance(JobState::Aborted)?;
        let summary = summarize(job, counters, started);
        info!(
            bytes = summary.transferred_bytes,
            total_bytes = summary.total_bytes,
            commits = summary.commits,
            "transfer interrupted"
        );
        Ok(TransferOutcome::Interrupted(summary))
    }
}

fn upload_plan(job: &TransferJob) -> Vec<Operation> {
    let mut operations = Vec::new();
    for (file, job_file) in job.files().iter().enumerate() {
        if job_file.blocks.is_empty() {
            operations.push(Operation::Whole { file });
        } else {
            operations.extend(job_file.blocks.iter().map(|block| Operation::Stage {
                file,
                block: block.clone(),
            }));
        }
    }
    operations
}

fn download_plan(job: &TransferJob) -> Vec<Operation> {
    job.files()
        .iter()
        .enumerate()
        .flat_map(|(file, job_file)| {
            job_file.blocks.iter().map(move |block| Operation::Fetch {
                file,
                block: block.clone(),
            })
        })
        .collect()
}

fn summarize(job: &TransferJob, counters: Counters, started: Instant) -> TransferSummary {
    TransferSummary {
        files: job.files().len(),
        total_bytes: job.total_size(),
        transferred_bytes: job.progress().processed(),
        whole_uploads: counters.whole_uploads,
        blocks_staged: counters.blocks_staged,
        commits: counters.commits,
        ranges_downloaded: counters.ranges_downloaded,
        elapsed: started.elapsed(),
        bytes_per_second: job.progress().bytes_per_second(),
    }
}
