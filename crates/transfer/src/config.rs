//! Transfer tuning.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "block_size": 8388608, "max_in_flight": 16 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_BLOCK_SIZE, DEFAULT_LARGE_FILE_THRESHOLD, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_WHOLE_FILE_CONCURRENCY, TransferError,
};

/// Block sizes and concurrency bounds for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Size of each staged or range-downloaded block.
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Files strictly larger than this use staged blocks (upload) or
    /// chunked range reads (download).
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Maximum concurrently outstanding block/file operations.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Inner parallelism handed to whole-file uploads.
    #[serde(default = "default_whole_file_concurrency")]
    pub whole_file_concurrency: usize,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_large_file_threshold() -> u64 {
    DEFAULT_LARGE_FILE_THRESHOLD
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_whole_file_concurrency() -> usize {
    DEFAULT_WHOLE_FILE_CONCURRENCY
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            whole_file_concurrency: DEFAULT_WHOLE_FILE_CONCURRENCY,
        }
    }
}

impl TransferConfig {
    /// Loads a config from a JSON file and validates it.
    pub fn from_file(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "transfer config loaded");
        Ok(config)
    }

    /// Rejects zero block sizes and zero concurrency bounds.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.block_size == 0 {
            return Err(TransferError::Config("block_size must be > 0".into()));
        }
        if self.max_in_flight == 0 {
            return Err(TransferError::Config("max_in_flight must be > 0".into()));
        }
        if self.whole_file_concurrency == 0 {
            return Err(TransferError::Config(
                "whole_file_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }
}
