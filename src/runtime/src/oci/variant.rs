//! Variant metadata: the per-variant document describing how a variant
//! contributes to an image, plus its layer files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ocibake_core::digest::Digest;
use ocibake_core::error::{BakeError, Result};
use serde::{Deserialize, Serialize};

use super::reference::ImageReference;

/// Image metadata contributed by one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMetadata {
    /// Default reference (`name[:tag]`) of images this variant is the most derived part of
    pub image_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Exposed ports, e.g. "8080/tcp"
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Setting an entry point drops inherited arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    /// Written as config labels
    #[serde(default)]
    pub config_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub config_descriptor_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub manifest_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub manifest_descriptor_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub index_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub layers: Vec<LayerMetadata>,
}

/// One history entry; layers without a descriptor only add history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<LayerDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Content descriptor of a layer file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    /// Digest of the uncompressed layer
    pub diff_id: Digest,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A variant ready for assembly: metadata plus one file per layer descriptor.
#[derive(Debug, Clone)]
pub struct OciVariant {
    metadata: VariantMetadata,
    layer_files: Vec<PathBuf>,
}

impl OciVariant {
    /// Pair metadata with layer files, in declaration order.
    pub fn new(metadata: VariantMetadata, layer_files: Vec<PathBuf>) -> Result<Self> {
        let described = metadata
            .layers
            .iter()
            .filter(|l| l.descriptor.is_some())
            .count();
        if described != layer_files.len() {
            return Err(BakeError::InvalidMetadata(format!(
                "{} declares {} layers with a descriptor but {} layer files were given",
                metadata.image_reference,
                described,
                layer_files.len()
            )));
        }
        ImageReference::parse(&metadata.image_reference).map_err(|e| {
            BakeError::InvalidMetadata(format!("imageReference: {}", e))
        })?;
        Ok(Self {
            metadata,
            layer_files,
        })
    }

    /// Load the metadata JSON document from `path`.
    pub fn from_file(path: &Path, layer_files: Vec<PathBuf>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeError::InvalidMetadata(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let metadata: VariantMetadata = serde_json::from_str(&content).map_err(|e| {
            BakeError::InvalidMetadata(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Self::new(metadata, layer_files)
    }

    pub fn metadata(&self) -> &VariantMetadata {
        &self.metadata
    }

    pub fn image_reference(&self) -> Result<ImageReference> {
        ImageReference::parse(&self.metadata.image_reference)
    }

    /// Layers that carry content, paired with their source files.
    pub fn layer_files(&self) -> impl Iterator<Item = (&LayerDescriptor, &Path)> {
        self.metadata
            .layers
            .iter()
            .filter_map(|l| l.descriptor.as_ref())
            .zip(self.layer_files.iter().map(PathBuf::as_path))
    }
}
