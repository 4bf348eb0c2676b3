//! OCI image layout output.
//!
//! ```text
//! out/
//! ├── oci-layout           {"imageLayoutVersion":"1.0.0"}
//! ├── index.json           one entry per reference, naming its image index
//! ├── manifest.json        docker-compatible, optional
//! └── blobs/<alg>/<hex>    configs, manifests, indexes and layers
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ocibake_core::cancel::CancelToken;
use ocibake_core::digest::Digest;
use ocibake_core::error::{BakeError, Result};
use serde::Serialize;

use super::{put_bytes, put_link, BlobStore, ImageWriter};
use crate::oci::document::{
    encode, Descriptor, ImageIndex, ANNOTATION_CONTAINERD_NAME, ANNOTATION_REF_NAME,
    MEDIA_TYPE_INDEX,
};
use crate::oci::OciMultiPlatformImage;

const OCI_LAYOUT: &[u8] = br#"{"imageLayoutVersion":"1.0.0"}"#;

/// Entry of a docker `manifest.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DockerManifestEntry {
    config: String,
    repo_tags: BTreeSet<String>,
    layers: Vec<String>,
}

pub struct OciLayoutWriter {
    root: PathBuf,
    blobs: BlobStore,
    entries: Vec<Descriptor>,
    /// Keyed by manifest digest; present only when docker output is enabled
    docker: Option<BTreeMap<Digest, DockerManifestEntry>>,
}

impl OciLayoutWriter {
    pub fn new(root: &Path, docker_manifest: bool, cancel: CancelToken) -> Self {
        Self {
            root: root.to_path_buf(),
            blobs: BlobStore::new(cancel),
            entries: Vec::new(),
            docker: docker_manifest.then(BTreeMap::new),
        }
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
    }

    fn relative_blob_path(digest: &Digest) -> String {
        format!("blobs/{}/{}", digest.algorithm(), digest.encoded())
    }

    fn write_index_json(&self) -> Result<()> {
        let index = ImageIndex::new(self.entries.clone(), BTreeMap::new());
        let content = encode(&index)?;
        let path = self.root.join("index.json");
        let (_, existing) = put_bytes(&path, &content)?;
        match existing {
            None => Ok(()),
            Some(existing) => Err(self.index_conflict(&path, &existing)),
        }
    }

    /// Explain why an existing `index.json` differs: a reference now pointing
    /// elsewhere is a tag conflict, anything else a link conflict.
    fn index_conflict(&self, path: &Path, existing: &[u8]) -> BakeError {
        let previous: serde_json::Value = match serde_json::from_slice(existing) {
            Ok(value) => value,
            Err(_) => {
                return BakeError::LinkConflict {
                    path: path.display().to_string(),
                }
            }
        };
        let previous_entries = previous["manifests"].as_array().cloned().unwrap_or_default();
        for entry in &self.entries {
            let Some(name) = entry.annotations.get(ANNOTATION_CONTAINERD_NAME) else {
                continue;
            };
            for old in &previous_entries {
                let same_name = old["annotations"][ANNOTATION_CONTAINERD_NAME].as_str() == Some(name.as_str());
                let old_digest = old["digest"].as_str().unwrap_or_default();
                if same_name && old_digest != entry.digest.to_string() {
                    let (repository, tag) = name.rsplit_once(':').unwrap_or((name.as_str(), ""));
                    return BakeError::TagConflict {
                        repository: repository.to_string(),
                        tag: tag.to_string(),
                        existing: old_digest.to_string(),
                        requested: entry.digest.to_string(),
                    };
                }
            }
        }
        BakeError::LinkConflict {
            path: path.display().to_string(),
        }
    }

    fn write_docker_manifest(&self) -> Result<()> {
        if let Some(docker) = &self.docker {
            let entries: Vec<&DockerManifestEntry> = docker.values().collect();
            let content = serde_json::to_vec(&entries)?;
            put_link(&self.root.join("manifest.json"), &content)?;
        }
        Ok(())
    }
}

impl ImageWriter for OciLayoutWriter {
    fn write(&mut self, image: &OciMultiPlatformImage) -> Result<()> {
        for platform_image in image.images().values() {
            for (descriptor, source) in platform_image.layers() {
                let path = self.blob_path(&descriptor.digest);
                self.blobs.put_layer(&path, descriptor, source)?;
            }
            let path = self.blob_path(platform_image.config_digest());
            self.blobs
                .put_blob(&path, platform_image.config_digest(), platform_image.config())?;
            let path = self.blob_path(platform_image.manifest_digest());
            self.blobs
                .put_blob(&path, platform_image.manifest_digest(), platform_image.manifest())?;

            if let Some(docker) = &mut self.docker {
                let entry = docker
                    .entry(platform_image.manifest_digest().clone())
                    .or_insert_with(|| DockerManifestEntry {
                        config: Self::relative_blob_path(platform_image.config_digest()),
                        repo_tags: BTreeSet::new(),
                        layers: platform_image
                            .layers()
                            .map(|(d, _)| Self::relative_blob_path(&d.digest))
                            .collect(),
                    });
                entry.repo_tags.insert(image.reference().to_string());
            }
        }

        let path = self.blob_path(image.index_digest());
        self.blobs.put_blob(&path, image.index_digest(), image.index())?;

        let reference = image.reference();
        let mut descriptor = Descriptor::new(
            MEDIA_TYPE_INDEX,
            image.index_digest().clone(),
            image.index().len() as u64,
        );
        descriptor
            .annotations
            .insert(ANNOTATION_REF_NAME.to_string(), reference.tag.clone());
        descriptor
            .annotations
            .insert(ANNOTATION_CONTAINERD_NAME.to_string(), reference.to_string());
        self.entries.push(descriptor);

        tracing::info!(
            reference = %reference,
            digest = %image.index_digest(),
            "Wrote image to layout"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        put_link(&self.root.join("oci-layout"), OCI_LAYOUT)?;
        self.write_docker_manifest()?;
        // Root pointer last, once everything it references is stored
        self.write_index_json()
    }
}
