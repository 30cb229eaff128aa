//! Client error types.

use rdsync_scene::SceneError;
use rdsync_transfer::TransferError;

/// Errors produced by dataset transfers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata service error: {0}")]
    Service(String),

    #[error("container access for {id} expired at {expires_at}")]
    AccessExpired {
        id: String,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("root document not found: {0}")]
    MissingRootDocument(String),

    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}
