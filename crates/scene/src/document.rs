//! Format-independent view over a parsed scene.

use std::path::{Path, PathBuf};

use crate::error::SceneError;
use crate::json::JsonScene;
use crate::xml::XmlScene;
use crate::SCENE_FILE_NAMES;

/// Wire dialect of a scene document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    Xml,
    Json,
}

impl SceneFormat {
    /// Picks the dialect from the file extension: `.json` is JSON, anything
    /// else is XML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Xml,
        }
    }
}

/// A `Reference` node: id and the path it currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceNode {
    pub id: String,
    pub path: String,
}

/// An asset path leaf (`ImagePath`, `MaskPath`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPath {
    pub field: String,
    pub value: String,
}

/// Accessors shared by both scene dialects.
pub trait SceneReferences {
    /// Reference nodes in document order.
    fn references(&self) -> Vec<ReferenceNode>;

    /// Overwrites the path of the reference with the given id.
    fn set_reference_path(&mut self, id: &str, path: &str) -> Result<(), SceneError>;

    /// Asset leaves in document order, excluding anything under `References`.
    fn leaf_paths(&self) -> Vec<LeafPath>;

    /// Serializes the document back to its wire dialect.
    fn to_bytes(&self) -> Result<Vec<u8>, SceneError>;
}

/// A parsed scene document.
#[derive(Debug, Clone)]
pub enum SceneDocument {
    Xml(XmlScene),
    Json(JsonScene),
}

impl SceneDocument {
    /// Parses `bytes` as the given dialect.
    pub fn parse(bytes: &[u8], format: SceneFormat) -> Result<Self, SceneError> {
        match format {
            SceneFormat::Xml => Ok(Self::Xml(XmlScene::parse(bytes)?)),
            SceneFormat::Json => Ok(Self::Json(JsonScene::parse(bytes)?)),
        }
    }

    /// Reads and parses a scene file, detecting the dialect by extension.
    pub fn open(path: &Path) -> Result<Self, SceneError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes, SceneFormat::from_path(path))
    }

    /// Returns the dialect of this document.
    pub fn format(&self) -> SceneFormat {
        match self {
            Self::Xml(_) => SceneFormat::Xml,
            Self::Json(_) => SceneFormat::Json,
        }
    }

    fn inner(&self) -> &dyn SceneReferences {
        match self {
            Self::Xml(doc) => doc as &dyn SceneReferences,
            Self::Json(doc) => doc,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SceneReferences {
        match self {
            Self::Xml(doc) => doc as &mut dyn SceneReferences,
            Self::Json(doc) => doc,
        }
    }
}

impl SceneReferences for SceneDocument {
    fn references(&self) -> Vec<ReferenceNode> {
        self.inner().references()
    }

    fn set_reference_path(&mut self, id: &str, path: &str) -> Result<(), SceneError> {
        self.inner_mut().set_reference_path(id, path)
    }

    fn leaf_paths(&self) -> Vec<LeafPath> {
        self.inner().leaf_paths()
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SceneError> {
        self.inner().to_bytes()
    }
}

/// Locates the scene document at the root of `folder`.
///
/// `ContextScene.xml` / `ContextScene.json` win; otherwise the folder must
/// hold exactly one `.xml` or `.json` file.
pub fn find_scene_document(folder: &Path) -> Result<PathBuf, SceneError> {
    for name in SCENE_FILE_NAMES {
        let candidate = folder.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_scene_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xml") || e.eq_ignore_ascii_case("json"));
        if is_scene_ext && path.is_file() {
            candidates.push(path);
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        _ => Err(SceneError::NotFound(folder.to_path_buf())),
    }
}
