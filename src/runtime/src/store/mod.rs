//! Content-addressable output storage.
//!
//! Every file is written with create-if-absent semantics: content goes to a
//! temporary file in the target directory and is moved into place only if
//! nothing exists there yet. An existing file is never rewritten; it is
//! compared instead, so repeated or concurrent builds against the same root
//! either agree with what is stored or fail.
//!
//! Two layouts are supported:
//!
//! - [`OciLayoutWriter`]: OCI image layout (`oci-layout`, `index.json`, `blobs/`)
//! - [`RegistryWriter`]: registry storage tree (`blobs/`, `repositories/`)

pub mod layout;
pub mod registry;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use ocibake_core::cancel::CancelToken;
use ocibake_core::config::{BakeConfig, OutputKind};
use ocibake_core::digest::Digest;
use ocibake_core::error::{BakeError, Result};
use tempfile::NamedTempFile;

use crate::oci::{LayerDescriptor, OciMultiPlatformImage};

pub use layout::OciLayoutWriter;
pub use registry::RegistryWriter;

/// Digest of a gzip-compressed empty tar archive. Many unrelated variants
/// ship it, so duplicate providers of it are expected.
pub const EMPTY_GZIP_TAR_DIGEST: &str =
    "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";

/// Writes multi-platform images into an output root.
pub trait ImageWriter {
    /// Store one multi-platform image with all of its blobs.
    fn write(&mut self, image: &OciMultiPlatformImage) -> Result<()>;

    /// Write files that describe the whole output (layout index, manifests).
    fn finish(&mut self) -> Result<()>;
}

/// Open the writer for the configured output kind.
pub fn open_writer(
    root: &Path,
    config: &BakeConfig,
    cancel: CancelToken,
) -> Result<Box<dyn ImageWriter>> {
    std::fs::create_dir_all(root)?;
    let writer: Box<dyn ImageWriter> = match config.output {
        OutputKind::Layout => Box::new(OciLayoutWriter::new(root, config.docker_manifest, cancel)),
        OutputKind::Registry => Box::new(RegistryWriter::new(root, cancel)),
    };
    Ok(writer)
}

/// Outcome of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// The same content was already present
    Unchanged,
}

/// Create `path` with the content produced by `fill`, unless it exists.
/// Returns false if the path was already present.
fn create_if_absent<F>(path: &Path, fill: F) -> Result<bool>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    if path.exists() {
        return Ok(false);
    }
    let parent = path.parent().ok_or_else(|| {
        BakeError::IoError(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    fill(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    match temp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

/// Write `content` to `path` unless present. Returns the existing content
/// when it differs from `content`.
fn put_bytes(path: &Path, content: &[u8]) -> Result<(WriteOutcome, Option<Vec<u8>>)> {
    if create_if_absent(path, |file| file.write_all(content))? {
        return Ok((WriteOutcome::Created, None));
    }
    let existing = std::fs::read(path)?;
    if existing == content {
        Ok((WriteOutcome::Unchanged, None))
    } else {
        Ok((WriteOutcome::Unchanged, Some(existing)))
    }
}

/// Write a small non-blob file, failing with `LinkConflict` if different
/// content is already stored there.
fn put_link(path: &Path, content: &[u8]) -> Result<WriteOutcome> {
    match put_bytes(path, content)? {
        (_, Some(_)) => Err(BakeError::LinkConflict {
            path: path.display().to_string(),
        }),
        (outcome, None) => Ok(outcome),
    }
}

fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut a = BufReader::new(File::open(a)?);
    let mut b = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = a.read(&mut buf_a)?;
        if n == 0 {
            return Ok(true);
        }
        b.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Blob writes shared by both layouts: cancellation, collision checks,
/// layer verification and duplicate-provider tracking.
#[derive(Debug)]
pub struct BlobStore {
    cancel: CancelToken,
    /// First source file seen for each layer digest
    layer_sources: HashMap<Digest, PathBuf>,
    /// Blob paths already stored during this run
    written: HashSet<PathBuf>,
}

impl BlobStore {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            layer_sources: HashMap::new(),
            written: HashSet::new(),
        }
    }

    /// Store an in-memory blob. Different bytes already stored under the same
    /// digest fail with `HashCollision`.
    pub fn put_blob(&mut self, path: &Path, digest: &Digest, content: &[u8]) -> Result<WriteOutcome> {
        self.cancel.check()?;
        if self.written.contains(path) {
            return Ok(WriteOutcome::Unchanged);
        }
        let (outcome, existing) = put_bytes(path, content)?;
        if existing.is_some() {
            return Err(BakeError::HashCollision {
                digest: digest.to_string(),
                path: path.display().to_string(),
            });
        }
        tracing::debug!(digest = %digest, path = %path.display(), created = (outcome == WriteOutcome::Created), "Stored blob");
        self.written.insert(path.to_path_buf());
        Ok(outcome)
    }

    /// Verify `source` against `descriptor` and store it as a layer blob.
    pub fn put_layer(
        &mut self,
        path: &Path,
        descriptor: &LayerDescriptor,
        source: &Path,
    ) -> Result<WriteOutcome> {
        self.cancel.check()?;
        let first_source = self.track_source(descriptor, source);
        if self.written.contains(path) {
            // Another file under an already stored digest must match the blob.
            if first_source || files_equal(path, source)? {
                return Ok(WriteOutcome::Unchanged);
            }
            return Err(BakeError::HashCollision {
                digest: descriptor.digest.to_string(),
                path: source.display().to_string(),
            });
        }
        verify_layer(descriptor, source)?;

        let created = create_if_absent(path, |file| {
            let mut reader = BufReader::new(File::open(source)?);
            std::io::copy(&mut reader, file)?;
            Ok(())
        })?;
        let outcome = if created {
            WriteOutcome::Created
        } else if files_equal(path, source)? {
            WriteOutcome::Unchanged
        } else {
            return Err(BakeError::HashCollision {
                digest: descriptor.digest.to_string(),
                path: path.display().to_string(),
            });
        };
        tracing::debug!(
            digest = %descriptor.digest,
            source = %source.display(),
            created,
            "Stored layer"
        );
        self.written.insert(path.to_path_buf());
        Ok(outcome)
    }

    /// Record the file providing a layer digest. Returns true when `source` is
    /// the first file seen for it.
    fn track_source(&mut self, descriptor: &LayerDescriptor, source: &Path) -> bool {
        match self.layer_sources.get(&descriptor.digest) {
            Some(previous) if previous != source => {
                if !is_trivially_empty(descriptor) {
                    tracing::warn!(
                        digest = %descriptor.digest,
                        first = %previous.display(),
                        second = %source.display(),
                        "Same layer provided by different files"
                    );
                }
                false
            }
            Some(_) => true,
            None => {
                self.layer_sources
                    .insert(descriptor.digest.clone(), source.to_path_buf());
                true
            }
        }
    }
}

fn is_trivially_empty(descriptor: &LayerDescriptor) -> bool {
    descriptor.size == 0 || descriptor.digest.to_string() == EMPTY_GZIP_TAR_DIGEST
}

fn verify_layer(descriptor: &LayerDescriptor, source: &Path) -> Result<()> {
    let size = std::fs::metadata(source)
        .map_err(|e| BakeError::LayerMismatch {
            path: source.display().to_string(),
            message: format!("Failed to read layer file: {}", e),
        })?
        .len();
    if size != descriptor.size {
        return Err(BakeError::LayerMismatch {
            path: source.display().to_string(),
            message: format!("size is {} bytes, descriptor declares {}", size, descriptor.size),
        });
    }
    let actual = Digest::of_file(descriptor.digest.algorithm(), source)?;
    if actual != descriptor.digest {
        return Err(BakeError::LayerMismatch {
            path: source.display().to_string(),
            message: format!("digest is {}, descriptor declares {}", actual, descriptor.digest),
        });
    }
    Ok(())
}
