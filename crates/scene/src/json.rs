//! JSON scene dialect.
//!
//! References live under a top-level `References` object keyed by id, each
//! holding a `Path` string. Asset leaves may appear anywhere else.

use serde_json::Value;

use crate::LEAF_FIELDS;
use crate::document::{LeafPath, ReferenceNode, SceneReferences};
use crate::error::SceneError;

/// Parsed JSON scene.
#[derive(Debug, Clone)]
pub struct JsonScene {
    value: Value,
}

/// Escapes one JSON pointer token (RFC 6901).
fn pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn collect_leaves(value: &Value, top_level: bool, out: &mut Vec<LeafPath>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if top_level && key == "References" {
                    continue;
                }
                match child {
                    Value::String(s) if LEAF_FIELDS.contains(&key.as_str()) => {
                        out.push(LeafPath {
                            field: key.clone(),
                            value: s.clone(),
                        });
                    }
                    _ => collect_leaves(child, false, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_leaves(item, false, out);
            }
        }
        _ => {}
    }
}

impl JsonScene {
    /// Parses a JSON scene, validating every reference node.
    pub fn parse(bytes: &[u8]) -> Result<Self, SceneError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let scene = Self { value };
        scene.validate()?;
        Ok(scene)
    }

    fn validate(&self) -> Result<(), SceneError> {
        let Some(references) = self.value.get("References") else {
            return Ok(());
        };
        let map = references
            .as_object()
            .ok_or_else(|| SceneError::IllFormed("References is not an object".into()))?;

        for (id, node) in map {
            let path = node
                .get("Path")
                .and_then(Value::as_str)
                .ok_or_else(|| SceneError::IllFormed(format!("reference {id} has no Path")))?;
            if path.trim().is_empty() {
                return Err(SceneError::IllFormed(format!(
                    "reference {id} has an empty Path"
                )));
            }
        }
        Ok(())
    }
}

impl SceneReferences for JsonScene {
    fn references(&self) -> Vec<ReferenceNode> {
        self.value
            .get("References")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(id, node)| {
                        let path = node.get("Path")?.as_str()?;
                        Some(ReferenceNode {
                            id: id.clone(),
                            path: path.trim().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_reference_path(&mut self, id: &str, path: &str) -> Result<(), SceneError> {
        let pointer = format!("/References/{}/Path", pointer_token(id));
        let slot = self
            .value
            .pointer_mut(&pointer)
            .ok_or_else(|| SceneError::IllFormed(format!("unknown reference {id}")))?;
        *slot = Value::String(path.to_string());
        Ok(())
    }

    fn leaf_paths(&self) -> Vec<LeafPath> {
        let mut leaves = Vec::new();
        collect_leaves(&self.value, true, &mut leaves);
        leaves
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SceneError> {
        let mut bytes = serde_json::to_vec_pretty(&self.value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
