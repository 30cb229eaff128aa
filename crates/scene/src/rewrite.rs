//! Two-pass reference rewriting.
//!
//! Pass one resolves every `Reference` node through the table and builds an
//! index of id -> resolved base. Pass two resolves compound asset leaves
//! (`id:relative`) against that index, so a leaf may point at a reference
//! declared anywhere in the document. Nothing is applied until both passes
//! succeed.

use std::collections::HashMap;
use std::path::Path;

use rdsync_references::ReferenceTable;
use tracing::{debug, info};

use crate::CLOUD_PREFIX;
use crate::document::{ReferenceNode, SceneDocument, SceneReferences};
use crate::error::SceneError;

/// Direction of a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LocalToCloud,
    CloudToLocal,
}

/// An asset leaf resolved against the rewritten references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub field: String,
    pub original: String,
    pub resolved: String,
}

/// What a successful rewrite produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// References with their new paths, in document order.
    pub references: Vec<ReferenceNode>,
    /// Asset leaves with their full paths in the target form.
    pub assets: Vec<ResolvedAsset>,
}

fn resolve_reference(
    node: &ReferenceNode,
    table: &ReferenceTable,
    direction: Direction,
) -> Result<String, SceneError> {
    let unresolved = || SceneError::UnresolvedReference {
        id: node.id.clone(),
        path: node.path.clone(),
    };

    match direction {
        Direction::LocalToCloud => {
            let cloud_id = table.cloud_id(&node.path).ok_or_else(unresolved)?;
            Ok(format!("{CLOUD_PREFIX}{cloud_id}"))
        }
        Direction::CloudToLocal => {
            let cloud_id = node.path.strip_prefix(CLOUD_PREFIX).ok_or_else(unresolved)?;
            let local = table.local_path(cloud_id).ok_or_else(unresolved)?;
            Ok(local.to_string())
        }
    }
}

fn join_base(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches(['/', '\\']);
    if relative.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches(['/', '\\']), relative)
}

/// Resolves one leaf value against the reference index.
///
/// `id:relative` with a declared id joins onto that reference's base. A
/// numeric prefix that names no reference is unresolved. Anything else
/// (absolute paths, drive letters) is returned unchanged.
fn resolve_leaf(value: &str, index: &HashMap<String, String>) -> Result<String, SceneError> {
    let Some((prefix, relative)) = value.split_once(':') else {
        return Ok(value.to_string());
    };
    if prefix.is_empty() || prefix.contains(['/', '\\']) {
        return Ok(value.to_string());
    }

    if let Some(base) = index.get(prefix) {
        return Ok(join_base(base, relative));
    }
    if prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SceneError::UnresolvedReference {
            id: prefix.to_string(),
            path: value.to_string(),
        });
    }
    Ok(value.to_string())
}

/// Rewrites an in-memory document. On error the document is unchanged.
pub fn rewrite_document(
    doc: &mut SceneDocument,
    table: &ReferenceTable,
    direction: Direction,
) -> Result<RewriteReport, SceneError> {
    let mut index = HashMap::new();
    let mut references = Vec::new();
    for node in doc.references() {
        let resolved = resolve_reference(&node, table, direction)?;
        if index.insert(node.id.clone(), resolved.clone()).is_some() {
            return Err(SceneError::IllFormed(format!(
                "reference {} is declared twice",
                node.id
            )));
        }
        references.push(ReferenceNode {
            id: node.id,
            path: resolved,
        });
    }

    let mut assets = Vec::new();
    for leaf in doc.leaf_paths() {
        let resolved = resolve_leaf(&leaf.value, &index)?;
        assets.push(ResolvedAsset {
            field: leaf.field,
            original: leaf.value,
            resolved,
        });
    }

    for node in &references {
        doc.set_reference_path(&node.id, &node.path)?;
    }

    debug!(
        ?direction,
        references = references.len(),
        assets = assets.len(),
        "scene rewritten in memory"
    );
    Ok(RewriteReport { references, assets })
}

/// Rewrites `source` into `destination` through `table`.
///
/// The destination may equal the source. It is only removed and rewritten
/// once the whole document has been rewritten in memory; any parse or
/// resolution failure leaves it untouched.
pub fn rewrite_references(
    source: &Path,
    destination: &Path,
    table: &ReferenceTable,
    direction: Direction,
) -> Result<RewriteReport, SceneError> {
    let mut doc = SceneDocument::open(source)?;
    let report = rewrite_document(&mut doc, table, direction)?;
    let bytes = doc.to_bytes()?;

    if destination.exists() {
        std::fs::remove_file(destination)?;
    }
    std::fs::write(destination, bytes)?;

    info!(
        source = %source.display(),
        destination = %destination.display(),
        ?direction,
        references = report.references.len(),
        "scene references rewritten"
    );
    Ok(report)
}

/// Lists the reference nodes of a scene file.
pub fn list_references(path: &Path) -> Result<Vec<ReferenceNode>, SceneError> {
    Ok(SceneDocument::open(path)?.references())
}
