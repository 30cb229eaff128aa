//! Reference table: a bijection between local filesystem paths and the
//! opaque identifiers the remote store assigns to uploaded datasets.
//!
//! Local paths are normalized to forward slashes, so `C:\data\img` and
//! `C:/data/img` are the same key. The table is only persisted when the
//! caller asks for it, as a flat `localPath,cloudId` text file.

mod table;

pub use table::{ReferenceTable, normalize_local_path};

use std::path::PathBuf;

/// Errors produced by the reference table.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("reference table I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
