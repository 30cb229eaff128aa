//! Scene error types.

use std::path::PathBuf;

/// Errors produced while parsing or rewriting a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unresolved reference {id}: {path}")]
    UnresolvedReference { id: String, path: String },

    #[error("ill-formed scene: {0}")]
    IllFormed(String),

    #[error("no scene document found in {}", .0.display())]
    NotFound(PathBuf),
}

impl From<quick_xml::events::attributes::AttrError> for SceneError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.into())
    }
}
