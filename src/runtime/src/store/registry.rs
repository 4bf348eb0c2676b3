//! Registry storage output.
//!
//! Writes the on-disk tree a registry serves from, so the result can be
//! copied into registry storage as-is:
//!
//! ```text
//! blobs/<alg>/<2hex>/<hex>/data
//! repositories/<name>/_layers/<alg>/<hex>/link
//! repositories/<name>/_manifests/revisions/<alg>/<hex>/link
//! repositories/<name>/_manifests/tags/<tag>/current/link
//! repositories/<name>/_manifests/tags/<tag>/index/<alg>/<hex>/link
//! ```
//!
//! Each link file holds the digest string it points to.

use std::path::{Path, PathBuf};

use ocibake_core::cancel::CancelToken;
use ocibake_core::digest::Digest;
use ocibake_core::error::{BakeError, Result};

use super::{put_bytes, put_link, BlobStore, ImageWriter};
use crate::oci::OciMultiPlatformImage;

pub struct RegistryWriter {
    root: PathBuf,
    blobs: BlobStore,
}

impl RegistryWriter {
    pub fn new(root: &Path, cancel: CancelToken) -> Self {
        Self {
            root: root.to_path_buf(),
            blobs: BlobStore::new(cancel),
        }
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let encoded = digest.encoded();
        self.root
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(&encoded[..2])
            .join(&encoded)
            .join("data")
    }

    fn repository_dir(&self, repository: &str) -> PathBuf {
        self.root.join("repositories").join(repository)
    }

    fn layer_link(&self, repository: &str, digest: &Digest) -> Result<()> {
        let path = self
            .repository_dir(repository)
            .join("_layers")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
            .join("link");
        put_link(&path, digest.to_string().as_bytes())?;
        Ok(())
    }

    fn revision_link(&self, repository: &str, digest: &Digest) -> Result<()> {
        let path = self
            .repository_dir(repository)
            .join("_manifests")
            .join("revisions")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
            .join("link");
        put_link(&path, digest.to_string().as_bytes())?;
        Ok(())
    }

    fn tag_links(&self, repository: &str, tag: &str, digest: &Digest) -> Result<()> {
        let tag_dir = self
            .repository_dir(repository)
            .join("_manifests")
            .join("tags")
            .join(tag);
        // The index entry is only written once the tag points at this digest.
        let current = tag_dir.join("current").join("link");
        let (_, existing) = put_bytes(&current, digest.to_string().as_bytes())?;
        if let Some(existing) = existing {
            return Err(BakeError::TagConflict {
                repository: repository.to_string(),
                tag: tag.to_string(),
                existing: String::from_utf8_lossy(&existing).trim().to_string(),
                requested: digest.to_string(),
            });
        }

        let index_link = tag_dir
            .join("index")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
            .join("link");
        put_link(&index_link, digest.to_string().as_bytes())?;
        Ok(())
    }
}

impl ImageWriter for RegistryWriter {
    fn write(&mut self, image: &OciMultiPlatformImage) -> Result<()> {
        let reference = image.reference();
        let repository = reference.repository();

        for platform_image in image.images().values() {
            for (descriptor, source) in platform_image.layers() {
                let path = self.blob_path(&descriptor.digest);
                self.blobs.put_layer(&path, descriptor, source)?;
                self.layer_link(repository, &descriptor.digest)?;
            }
            let config_digest = platform_image.config_digest();
            let path = self.blob_path(config_digest);
            self.blobs.put_blob(&path, config_digest, platform_image.config())?;
            self.layer_link(repository, config_digest)?;

            let manifest_digest = platform_image.manifest_digest();
            let path = self.blob_path(manifest_digest);
            self.blobs
                .put_blob(&path, manifest_digest, platform_image.manifest())?;
            self.revision_link(repository, manifest_digest)?;
        }

        let index_digest = image.index_digest();
        let path = self.blob_path(index_digest);
        self.blobs.put_blob(&path, index_digest, image.index())?;
        self.revision_link(repository, index_digest)?;
        self.tag_links(repository, &reference.tag, index_digest)?;

        tracing::info!(
            repository = %repository,
            tag = %reference.tag,
            digest = %index_digest,
            "Wrote image to registry storage"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
