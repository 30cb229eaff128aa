//! Scene documents and reference rewriting.
//!
//! A scene document (XML or JSON) declares `Reference` nodes that point at
//! other datasets by path, and asset leaves (`ImagePath`, `MaskPath`,
//! `DepthPath`) that address files either through a reference
//! (`referenceId:relative/path`) or absolutely.
//!
//! [`rewrite_references`] swaps every reference path between its local form
//! and its cloud form (`rds:<cloudId>`) through a
//! [`ReferenceTable`](rdsync_references::ReferenceTable). The rewrite is
//! all-or-nothing: the destination file is only touched once the whole
//! document has been rewritten in memory.

mod document;
mod error;
mod json;
mod rewrite;
mod xml;

pub use document::{
    LeafPath, ReferenceNode, SceneDocument, SceneFormat, SceneReferences, find_scene_document,
};
pub use error::SceneError;
pub use json::JsonScene;
pub use rewrite::{
    Direction, ResolvedAsset, RewriteReport, list_references, rewrite_document,
    rewrite_references,
};
pub use xml::XmlScene;

/// Prefix marking a reference path as a cloud id.
pub const CLOUD_PREFIX: &str = "rds:";

/// Element/key names holding asset paths.
pub const LEAF_FIELDS: &[&str] = &["ImagePath", "MaskPath", "DepthPath"];

/// File names probed first when locating a scene inside a folder.
pub const SCENE_FILE_NAMES: &[&str] = &["ContextScene.xml", "ContextScene.json"];
