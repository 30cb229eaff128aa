use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::TransferError;
use crate::types::Block;

// ---------------------------------------------------------------------------
// Block planning
// ---------------------------------------------------------------------------

/// Returns the base64 block id for the `index`-th block of a file.
///
/// Ids are zero-padded before encoding so every id of a file has the same
/// length.
pub fn block_id(index: usize) -> String {
    STANDARD.encode(format!("block-{index:08}"))
}

/// Splits `file_size` bytes into consecutive blocks of at most `block_size`.
pub fn plan_blocks(file_size: u64, block_size: u64) -> Vec<Block> {
    let block_size = block_size.max(1);
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < file_size {
        let len = block_size.min(file_size - offset);
        let index = blocks.len();
        blocks.push(Block {
            index,
            offset,
            len,
            id: block_id(index),
        });
        offset += len;
    }
    blocks
}

/// Reads `len` bytes at `offset` from a local file.
pub async fn read_block(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Reassembles downloaded chunks into files under a base directory.
///
/// Chunks are keyed by file path and appended strictly in chunk order; a
/// chunk that arrives early is held until its predecessors are written.
pub struct ChunkWriter {
    base_path: PathBuf,
    files: HashMap<String, Assembly>,
}

struct Assembly {
    file: Option<tokio::fs::File>,
    next_index: usize,
    total_chunks: usize,
    pending: BTreeMap<usize, Vec<u8>>,
}

impl ChunkWriter {
    /// Creates a writer rooted at `base_path`.
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            files: HashMap::new(),
        }
    }

    /// Registers a file that will receive `total_chunks` chunks.
    ///
    /// A file with no chunks is created empty right away.
    pub async fn expect(&mut self, file_path: &str, total_chunks: usize) -> Result<(), TransferError> {
        crate::validate_relative_path(file_path)?;

        if total_chunks == 0 {
            let full_path = self.prepare(file_path).await?;
            tokio::fs::File::create(&full_path).await?;
        }

        self.files.insert(
            file_path.to_string(),
            Assembly {
                file: None,
                next_index: 0,
                total_chunks,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Accepts chunk `index` of `file_path`.
    pub async fn write_chunk(
        &mut self,
        file_path: &str,
        index: usize,
        data: Vec<u8>,
    ) -> Result<(), TransferError> {
        let full_path = self.base_path.join(file_path);
        let assembly = self.files.get_mut(file_path).ok_or_else(|| {
            TransferError::InvalidPath(format!("chunk for unregistered file: {file_path}"))
        })?;
        if index < assembly.next_index
            || index >= assembly.total_chunks
            || assembly.pending.contains_key(&index)
        {
            return Err(TransferError::InvalidPath(format!(
                "unexpected chunk {index} for {file_path}"
            )));
        }
        assembly.pending.insert(index, data);

        while let Some(data) = assembly.pending.remove(&assembly.next_index) {
            if assembly.file.is_none() {
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                assembly.file = Some(tokio::fs::File::create(&full_path).await?);
            }
            if let Some(file) = assembly.file.as_mut() {
                file.write_all(&data).await?;
            }
            assembly.next_index += 1;
        }

        if assembly.next_index == assembly.total_chunks
            && let Some(mut file) = assembly.file.take()
        {
            file.flush().await?;
        }
        Ok(())
    }

    /// Paths still missing chunks.
    pub fn incomplete(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .files
            .iter()
            .filter(|(_, a)| a.next_index != a.total_chunks)
            .map(|(p, _)| p.as_str())
            .collect();
        paths.sort_unstable();
        paths
    }

    async fn prepare(&self, file_path: &str) -> Result<PathBuf, TransferError> {
        let full_path = self.base_path.join(file_path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(full_path)
    }
}
