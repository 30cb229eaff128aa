//! Data types for dataset transfers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of dataset stored remotely.
///
/// Serialized with the names the metadata service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealityDataType {
    #[serde(rename = "CCImageCollection")]
    ImageCollection,
    #[serde(rename = "ContextScene")]
    ContextScene,
    #[serde(rename = "CCOrientations")]
    Orientations,
    #[serde(rename = "ContextDetector")]
    ContextDetector,
    #[serde(rename = "OPC")]
    Opc,
    #[serde(rename = "LAS")]
    Las,
    #[serde(rename = "LAZ")]
    Laz,
    #[serde(rename = "PLY")]
    Ply,
    #[serde(rename = "Cesium3DTiles")]
    Cesium3DTiles,
    #[serde(rename = "Unstructured")]
    Unstructured,
}

impl RealityDataType {
    /// Service-side type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageCollection => "CCImageCollection",
            Self::ContextScene => "ContextScene",
            Self::Orientations => "CCOrientations",
            Self::ContextDetector => "ContextDetector",
            Self::Opc => "OPC",
            Self::Las => "LAS",
            Self::Laz => "LAZ",
            Self::Ply => "PLY",
            Self::Cesium3DTiles => "Cesium3DTiles",
            Self::Unstructured => "Unstructured",
        }
    }
}

impl fmt::Display for RealityDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project under which datasets are created and accessed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetScope {
    pub project_id: String,
}

impl DatasetScope {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }
}

/// Request body for creating a dataset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRealityData {
    pub display_name: String,
    #[serde(rename = "type")]
    pub data_type: RealityDataType,
    /// File opened first by consumers, relative to the dataset root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_document: Option<String>,
}

/// Permission requested on a dataset container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Short-lived credentials for one dataset container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAccess {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl ContainerAccess {
    /// Returns `true` once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of a facade operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// Stopped by the progress hook or the caller's token.
    Interrupted,
}

impl<T> Outcome<T> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Returns the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Interrupted => None,
        }
    }
}
