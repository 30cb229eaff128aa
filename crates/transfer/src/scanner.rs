//! Source enumeration for uploads.
//!
//! Recursively walks a directory and produces a list of file entries
//! with relative paths normalized to forward slashes.

use std::path::{Path, PathBuf};

use crate::TransferError;
use crate::types::FileEntry;

/// Enumerates an upload source.
///
/// For a directory, returns the directory itself as the root and every file
/// below it, sorted by relative path. For a single file, the root is its
/// parent and the only entry is its basename. Returns the root, the entries
/// and their total size in bytes.
pub fn scan_source(source: &Path) -> Result<(PathBuf, Vec<FileEntry>, u64), TransferError> {
    let metadata = std::fs::metadata(source)?;

    if metadata.is_file() {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| TransferError::InvalidPath(source.display().to_string()))?;
        let root = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let size = metadata.len();
        return Ok((
            root,
            vec![FileEntry {
                relative_path: name,
                size,
            }],
            size,
        ));
    }

    let mut files = Vec::new();
    let mut total_size = 0;
    walk_dir(source, source, &mut files, &mut total_size)?;
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok((source.to_path_buf(), files, total_size))
}

fn walk_dir(
    root: &Path,
    current: &Path,
    files: &mut Vec<FileEntry>,
    total_size: &mut u64,
) -> Result<(), TransferError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, files, total_size)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            // Blob names must round-trip, so lossy names are refused.
            let relative = rel_path
                .to_str()
                .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?;
            let size = metadata.len();

            files.push(FileEntry {
                relative_path: relative.replace('\\', "/"),
                size,
            });
            *total_size += size;
        }
    }

    Ok(())
}
