//! Image assembly: folds a chain of variants into an image config and
//! manifest, then groups platform images into multi-platform indexes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ocibake_core::digest::{Digest, DigestAlgorithm};
use ocibake_core::error::{BakeError, Result};
use ocibake_core::platform::Platform;

use super::document::{
    encode_with_digest, format_time, ContainerConfig, Descriptor, DescriptorPlatform, EmptyObject,
    History, ImageConfig, ImageIndex, ImageManifest, RootFs, MEDIA_TYPE_CONFIG,
    MEDIA_TYPE_MANIFEST,
};
use super::reference::ImageReference;
use super::variant::{LayerDescriptor, OciVariant};

/// A single-platform image.
#[derive(Debug, Clone)]
pub struct OciImage {
    platform: Platform,
    variants: Vec<Arc<OciVariant>>,
    config: Vec<u8>,
    config_digest: Digest,
    manifest: Vec<u8>,
    manifest_digest: Digest,
    manifest_descriptor_annotations: BTreeMap<String, String>,
    index_annotations: BTreeMap<String, String>,
}

impl OciImage {
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Variants the image was folded from, base first.
    pub fn variants(&self) -> &[Arc<OciVariant>] {
        &self.variants
    }

    /// The most derived variant.
    pub fn top(&self) -> &OciVariant {
        // chain is never empty, checked in assemble_image
        &self.variants[self.variants.len() - 1]
    }

    pub fn config(&self) -> &[u8] {
        &self.config
    }

    pub fn config_digest(&self) -> &Digest {
        &self.config_digest
    }

    pub fn manifest(&self) -> &[u8] {
        &self.manifest
    }

    pub fn manifest_digest(&self) -> &Digest {
        &self.manifest_digest
    }

    pub fn index_annotations(&self) -> &BTreeMap<String, String> {
        &self.index_annotations
    }

    /// Layer descriptors with their source files, in manifest order.
    pub fn layers(&self) -> impl Iterator<Item = (&LayerDescriptor, &Path)> {
        self.variants.iter().flat_map(|v| v.layer_files())
    }

    /// Descriptor of this image's manifest, as listed in an index.
    pub fn manifest_descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            digest: self.manifest_digest.clone(),
            size: self.manifest.len() as u64,
            platform: Some(DescriptorPlatform::from(&self.platform)),
            annotations: self.manifest_descriptor_annotations.clone(),
        }
    }
}

/// Fold `chain` (base first) into the image for `platform`.
pub fn assemble_image(
    platform: &Platform,
    chain: Vec<Arc<OciVariant>>,
    algorithm: DigestAlgorithm,
) -> Result<OciImage> {
    let top = match chain.last() {
        Some(top) => top.clone(),
        None => {
            return Err(BakeError::InvalidMetadata(format!(
                "No variants to assemble for platform {}",
                platform
            )))
        }
    };

    let mut container = ContainerConfig::default();
    let mut environment: BTreeMap<String, String> = BTreeMap::new();
    let mut config_descriptor_annotations = BTreeMap::new();
    let mut author = None;
    let mut created = None;
    let mut history = Vec::new();
    let mut diff_ids = Vec::new();
    let mut layers = Vec::new();

    for variant in &chain {
        let metadata = variant.metadata();

        if let Some(user) = &metadata.user {
            container.user = Some(user.clone());
        }
        if let Some(dir) = &metadata.working_directory {
            container.working_dir = Some(dir.clone());
        }
        if let Some(signal) = &metadata.stop_signal {
            container.stop_signal = Some(signal.clone());
        }
        if let Some(value) = &metadata.author {
            author = Some(value.clone());
        }
        if let Some(time) = &metadata.creation_time {
            created = Some(format_time(time));
        }

        for port in &metadata.ports {
            container.exposed_ports.insert(port.clone(), EmptyObject {});
        }
        for volume in &metadata.volumes {
            container.volumes.insert(volume.clone(), EmptyObject {});
        }
        environment.extend(metadata.environment.clone());
        container.labels.extend(metadata.config_annotations.clone());
        config_descriptor_annotations.extend(metadata.config_descriptor_annotations.clone());

        // A new entry point invalidates inherited arguments
        if let Some(entry_point) = &metadata.entry_point {
            container.entrypoint = Some(entry_point.clone());
            container.cmd = metadata.arguments.clone();
        } else if let Some(arguments) = &metadata.arguments {
            container.cmd = Some(arguments.clone());
        }

        for layer in &metadata.layers {
            history.push(History {
                created: layer.creation_time.as_ref().map(format_time),
                author: layer.author.clone(),
                created_by: layer.created_by.clone(),
                comment: layer.comment.clone(),
                empty_layer: layer.descriptor.is_none(),
            });
            if let Some(descriptor) = &layer.descriptor {
                diff_ids.push(descriptor.diff_id.clone());
                layers.push(Descriptor {
                    media_type: descriptor.media_type.clone(),
                    digest: descriptor.digest.clone(),
                    size: descriptor.size,
                    platform: None,
                    annotations: descriptor.annotations.clone(),
                });
            }
        }
    }

    container.env = environment
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    let config = ImageConfig {
        architecture: platform.architecture().to_string(),
        author,
        config: container,
        created,
        history,
        os: platform.os().to_string(),
        os_features: platform.os_features().iter().cloned().collect(),
        os_version: platform.os_version().to_string(),
        rootfs: RootFs {
            diff_ids,
            ..Default::default()
        },
        variant: platform.variant().to_string(),
    };
    let (config_bytes, config_digest) = encode_with_digest(&config, algorithm)?;

    let mut config_descriptor =
        Descriptor::new(MEDIA_TYPE_CONFIG, config_digest.clone(), config_bytes.len() as u64);
    config_descriptor.annotations = config_descriptor_annotations;

    let top_metadata = top.metadata();
    let manifest = ImageManifest::new(
        config_descriptor,
        layers,
        top_metadata.manifest_annotations.clone(),
    );
    let (manifest_bytes, manifest_digest) = encode_with_digest(&manifest, algorithm)?;

    tracing::debug!(
        platform = %platform,
        variants = chain.len(),
        manifest = %manifest_digest,
        "Assembled image"
    );

    Ok(OciImage {
        platform: platform.clone(),
        manifest_descriptor_annotations: top_metadata.manifest_descriptor_annotations.clone(),
        index_annotations: top_metadata.index_annotations.clone(),
        variants: chain,
        config: config_bytes,
        config_digest,
        manifest: manifest_bytes,
        manifest_digest,
    })
}

/// Platform images published under one reference.
#[derive(Debug, Clone)]
pub struct OciMultiPlatformImage {
    reference: ImageReference,
    images: BTreeMap<Platform, Arc<OciImage>>,
    index: Vec<u8>,
    index_digest: Digest,
}

impl OciMultiPlatformImage {
    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn images(&self) -> &BTreeMap<Platform, Arc<OciImage>> {
        &self.images
    }

    pub fn index(&self) -> &[u8] {
        &self.index
    }

    pub fn index_digest(&self) -> &Digest {
        &self.index_digest
    }
}

/// Build the index for `images`. Manifests are listed in platform order; an
/// index annotation survives only if every image carries it with the same value.
pub fn assemble_index(
    reference: ImageReference,
    images: BTreeMap<Platform, Arc<OciImage>>,
    algorithm: DigestAlgorithm,
) -> Result<OciMultiPlatformImage> {
    let mut annotations: Option<BTreeMap<String, String>> = None;
    for image in images.values() {
        annotations = Some(match annotations {
            None => image.index_annotations().clone(),
            Some(common) => common
                .into_iter()
                .filter(|(key, value)| image.index_annotations().get(key) == Some(value))
                .collect(),
        });
    }

    let manifests = images.values().map(|i| i.manifest_descriptor()).collect();
    let index = ImageIndex::new(manifests, annotations.unwrap_or_default());
    let (index_bytes, index_digest) = encode_with_digest(&index, algorithm)?;

    tracing::debug!(
        reference = %reference,
        platforms = images.len(),
        index = %index_digest,
        "Assembled image index"
    );

    Ok(OciMultiPlatformImage {
        reference,
        images,
        index: index_bytes,
        index_digest,
    })
}

/// Tracks which image provides each (reference, platform).
#[derive(Debug, Default)]
pub struct ImageClaims {
    by_reference: BTreeMap<ImageReference, BTreeMap<Platform, Arc<OciImage>>>,
}

impl ImageClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `image` is published as `reference`. Claiming the same
    /// (reference, platform) again is accepted only for an identical image.
    pub fn claim(&mut self, reference: ImageReference, image: Arc<OciImage>) -> Result<()> {
        let platforms = self.by_reference.entry(reference.clone()).or_default();
        match platforms.get(image.platform()) {
            Some(existing) if existing.manifest_digest() != image.manifest_digest() => {
                Err(BakeError::DuplicateImageClaim {
                    reference: reference.to_string(),
                    platform: image.platform().to_string(),
                    existing: existing.manifest_digest().to_string(),
                    requested: image.manifest_digest().to_string(),
                })
            }
            Some(_) => Ok(()),
            None => {
                platforms.insert(image.platform().clone(), image);
                Ok(())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    /// One multi-platform image per reference, in reference order.
    pub fn into_indexes(self, algorithm: DigestAlgorithm) -> Result<Vec<OciMultiPlatformImage>> {
        self.by_reference
            .into_iter()
            .map(|(reference, images)| assemble_index(reference, images, algorithm))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::variant::{LayerMetadata, VariantMetadata};
    use std::path::PathBuf;

    fn p(s: &str) -> Platform {
        s.parse().unwrap()
    }

    fn digest(data: &[u8]) -> Digest {
        Digest::of_bytes(DigestAlgorithm::Sha256, data)
    }

    fn layer(name: &str) -> LayerMetadata {
        LayerMetadata {
            descriptor: Some(LayerDescriptor {
                media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
                digest: digest(name.as_bytes()),
                size: name.len() as u64,
                diff_id: digest(format!("diff-{}", name).as_bytes()),
                annotations: BTreeMap::new(),
            }),
            created_by: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn variant(metadata: VariantMetadata) -> Arc<OciVariant> {
        let files = metadata
            .layers
            .iter()
            .filter(|l| l.descriptor.is_some())
            .map(|l| PathBuf::from(l.created_by.clone().unwrap_or_default()))
            .collect();
        Arc::new(OciVariant::new(metadata, files).unwrap())
    }

    fn base() -> VariantMetadata {
        VariantMetadata {
            image_reference: "example/base:1".to_string(),
            user: Some("root".to_string()),
            ports: vec!["80/tcp".to_string()],
            environment: BTreeMap::from([
                ("PATH".to_string(), "/bin".to_string()),
                ("LANG".to_string(), "C".to_string()),
            ]),
            entry_point: Some(vec!["/bin/sh".to_string()]),
            arguments: Some(vec!["-c".to_string()]),
            config_annotations: BTreeMap::from([("tier".to_string(), "base".to_string())]),
            manifest_annotations: BTreeMap::from([("from".to_string(), "base".to_string())]),
            index_annotations: BTreeMap::from([
                ("vendor".to_string(), "example".to_string()),
                ("only-base".to_string(), "x".to_string()),
            ]),
            layers: vec![
                layer("base-layer"),
                LayerMetadata {
                    created_by: Some("ENV".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn app() -> VariantMetadata {
        VariantMetadata {
            image_reference: "example/app:1.0.0".to_string(),
            user: Some("app".to_string()),
            ports: vec!["8080/tcp".to_string()],
            environment: BTreeMap::from([("PATH".to_string(), "/app/bin:/bin".to_string())]),
            arguments: Some(vec!["serve".to_string()]),
            config_annotations: BTreeMap::from([("tier".to_string(), "app".to_string())]),
            manifest_descriptor_annotations: BTreeMap::from([(
                "role".to_string(),
                "app".to_string(),
            )]),
            index_annotations: BTreeMap::from([("vendor".to_string(), "example".to_string())]),
            layers: vec![layer("app-layer")],
            ..Default::default()
        }
    }

    fn config_json(image: &OciImage) -> serde_json::Value {
        serde_json::from_slice(image.config()).unwrap()
    }

    fn manifest_json(image: &OciImage) -> serde_json::Value {
        serde_json::from_slice(image.manifest()).unwrap()
    }

    #[test]
    fn test_fold_scalars_and_maps() {
        let image = assemble_image(
            &p("linux,amd64"),
            vec![variant(base()), variant(app())],
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let config = config_json(&image);
        assert_eq!(config["architecture"], "amd64");
        assert_eq!(config["os"], "linux");
        assert_eq!(config["config"]["User"], "app");
        assert_eq!(
            config["config"]["Env"],
            serde_json::json!(["LANG=C", "PATH=/app/bin:/bin"])
        );
        assert_eq!(
            config["config"]["ExposedPorts"],
            serde_json::json!({"8080/tcp": {}, "80/tcp": {}})
        );
        assert_eq!(config["config"]["Labels"]["tier"], "app");
    }

    #[test]
    fn test_arguments_only_keep_entry_point() {
        let image = assemble_image(
            &p("linux,amd64"),
            vec![variant(base()), variant(app())],
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let config = config_json(&image);
        assert_eq!(config["config"]["Entrypoint"], serde_json::json!(["/bin/sh"]));
        assert_eq!(config["config"]["Cmd"], serde_json::json!(["serve"]));
    }

    #[test]
    fn test_entry_point_clears_inherited_arguments() {
        let mut top = app();
        top.entry_point = Some(vec!["/app/run".to_string()]);
        top.arguments = None;
        let image = assemble_image(
            &p("linux,amd64"),
            vec![variant(base()), variant(top)],
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let config = config_json(&image);
        assert_eq!(config["config"]["Entrypoint"], serde_json::json!(["/app/run"]));
        assert!(config["config"].get("Cmd").is_none());
    }

    #[test]
    fn test_history_and_diff_ids() {
        let image = assemble_image(
            &p("linux,amd64"),
            vec![variant(base()), variant(app())],
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let config = config_json(&image);
        let history = config["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].get("empty_layer").is_none());
        assert_eq!(history[1]["empty_layer"], true);
        assert_eq!(config["rootfs"]["diff_ids"].as_array().unwrap().len(), 2);

        let manifest = manifest_json(&image);
        let layers = manifest["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0]["digest"], digest(b"base-layer").to_string());
        assert_eq!(image.layers().count(), 2);
    }

    #[test]
    fn test_manifest_annotations_from_top_only() {
        let image = assemble_image(
            &p("linux,amd64"),
            vec![variant(base()), variant(app())],
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let manifest = manifest_json(&image);
        assert!(manifest.get("annotations").is_none());
        assert_eq!(image.manifest_descriptor().annotations.get("role").unwrap(), "app");
    }

    #[test]
    fn test_config_digest_in_manifest() {
        let image = assemble_image(&p("linux,arm,v7"), vec![variant(base())], DigestAlgorithm::Sha256)
            .unwrap();
        let manifest = manifest_json(&image);
        assert_eq!(manifest["config"]["digest"], image.config_digest().to_string());
        assert_eq!(manifest["config"]["size"], image.config().len() as u64);
        assert_eq!(config_json(&image)["variant"], "v7");
        assert_eq!(*image.manifest_digest(), digest(image.manifest()));
    }

    #[test]
    fn test_assembly_deterministic() {
        let build = || {
            assemble_image(
                &p("linux,amd64"),
                vec![variant(base()), variant(app())],
                DigestAlgorithm::Sha256,
            )
            .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.config(), b.config());
        assert_eq!(a.manifest(), b.manifest());
        assert_eq!(a.manifest_digest(), b.manifest_digest());
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(assemble_image(&p("linux,amd64"), vec![], DigestAlgorithm::Sha256).is_err());
    }

    #[test]
    fn test_index_annotation_intersection_and_order() {
        let amd = Arc::new(
            assemble_image(&p("linux,amd64"), vec![variant(base())], DigestAlgorithm::Sha256).unwrap(),
        );
        let mut arm_meta = base();
        arm_meta.index_annotations.insert("only-base".to_string(), "y".to_string());
        let arm = Arc::new(
            assemble_image(&p("linux,arm64"), vec![variant(arm_meta)], DigestAlgorithm::Sha256)
                .unwrap(),
        );
        let images = BTreeMap::from([
            (p("linux,arm64"), arm.clone()),
            (p("linux,amd64"), amd.clone()),
        ]);
        let reference = ImageReference::parse("example/base:1").unwrap();
        let index = assemble_index(reference, images, DigestAlgorithm::Sha256).unwrap();
        let json: serde_json::Value = serde_json::from_slice(index.index()).unwrap();
        assert_eq!(json["annotations"], serde_json::json!({"vendor": "example"}));
        let manifests = json["manifests"].as_array().unwrap();
        assert_eq!(manifests[0]["platform"]["architecture"], "amd64");
        assert_eq!(manifests[1]["platform"]["architecture"], "arm64");
        assert_eq!(*index.index_digest(), digest(index.index()));
    }

    #[test]
    fn test_claims_reject_different_image_for_same_platform() {
        let first = Arc::new(
            assemble_image(&p("linux,amd64"), vec![variant(base())], DigestAlgorithm::Sha256).unwrap(),
        );
        let second = Arc::new(
            assemble_image(
                &p("linux,amd64"),
                vec![variant(base()), variant(app())],
                DigestAlgorithm::Sha256,
            )
            .unwrap(),
        );
        let reference = ImageReference::parse("example/app:1.0.0").unwrap();
        let mut claims = ImageClaims::new();
        claims.claim(reference.clone(), first.clone()).unwrap();
        claims.claim(reference.clone(), first.clone()).unwrap();
        let err = claims.claim(reference, second).unwrap_err();
        assert!(matches!(err, BakeError::DuplicateImageClaim { .. }));
    }

    #[test]
    fn test_claims_group_by_reference() {
        let amd = Arc::new(
            assemble_image(&p("linux,amd64"), vec![variant(base())], DigestAlgorithm::Sha256).unwrap(),
        );
        let arm = Arc::new(
            assemble_image(&p("linux,arm64"), vec![variant(base())], DigestAlgorithm::Sha256).unwrap(),
        );
        let mut claims = ImageClaims::new();
        let v1 = ImageReference::parse("example/base:1").unwrap();
        let latest = ImageReference::parse("example/base:latest").unwrap();
        for reference in [&v1, &latest] {
            claims.claim(reference.clone(), amd.clone()).unwrap();
            claims.claim(reference.clone(), arm.clone()).unwrap();
        }
        let indexes = claims.into_indexes(DigestAlgorithm::Sha256).unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].images().len(), 2);
        assert_eq!(indexes[0].index_digest(), indexes[1].index_digest());
    }
}
