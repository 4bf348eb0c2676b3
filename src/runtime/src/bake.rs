//! Build plans and the bake pipeline.
//!
//! A build plan is what the host build system hands over: every resolved
//! variant with its platform scope, metadata document, layer files and
//! dependency edges, plus the images to build from them.
//!
//! ```text
//! plan ─► resolve ─► select platforms ─► chain ─► assemble ─► claim ─► store
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocibake_core::cancel::CancelToken;
use ocibake_core::config::BakeConfig;
use ocibake_core::digest::Digest;
use ocibake_core::error::{BakeError, Result};
use ocibake_core::platform::{Platform, PlatformSelector, PlatformSet};
use serde::{Deserialize, Serialize};

use crate::graph::{
    resolve, select_platforms, Dependency, ReferenceSelector, RootRequest, Scope,
    VariantCatalog, VariantDeclaration, VariantGraph, VariantKey,
};
use crate::oci::{assemble_image, ImageClaims, ImageReference, OciMultiPlatformImage, OciVariant};
use crate::store::open_writer;

/// Build plan document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    pub variants: Vec<PlanVariant>,
    #[serde(default)]
    pub images: Vec<PlanImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanVariant {
    pub component: String,
    /// Defaults to the component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Absent means the variant is platform independent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Platform>>,
    pub metadata: PathBuf,
    #[serde(default)]
    pub layers: Vec<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<PlanDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDependency {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanImage {
    pub roots: Vec<PlanRoot>,
    /// Platform selector, e.g. `linux,amd64 | linux,arm64`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRoot {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Repository name overriding the variant's image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn variant_key(component: &str, capability: &Option<String>) -> VariantKey {
    VariantKey::new(component, capability.as_deref().unwrap_or(component))
}

impl BuildPlan {
    /// Load a plan file. Relative metadata and layer paths are resolved
    /// against the directory holding the plan.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeError::ConfigError(format!("Failed to read build plan {}: {}", path.display(), e))
        })?;
        let mut plan: BuildPlan = serde_json::from_str(&content).map_err(|e| {
            BakeError::ConfigError(format!("Failed to parse build plan {}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for variant in &mut plan.variants {
            variant.metadata = base.join(&variant.metadata);
            for layer in &mut variant.layers {
                *layer = base.join(&*layer);
            }
        }
        Ok(plan)
    }
}

/// One image definition with its selector parsed.
#[derive(Debug, Clone)]
struct ImageJob {
    requests: Vec<RootRequest>,
    selector: Option<PlatformSelector>,
}

/// Supported platforms of one image root.
#[derive(Debug, Clone)]
pub struct RootDescription {
    pub key: VariantKey,
    pub supported: PlatformSet,
}

#[derive(Debug, Clone)]
pub struct ImageDescription {
    pub roots: Vec<RootDescription>,
    pub selector: Option<PlatformSelector>,
}

/// A reference written to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeResult {
    pub reference: ImageReference,
    /// Digest of the multi-platform index
    pub digest: Digest,
    pub platforms: Vec<Platform>,
}

/// Runs build plans.
pub struct Baker {
    catalog: VariantCatalog,
    variants: HashMap<VariantKey, Arc<OciVariant>>,
    jobs: Vec<ImageJob>,
    config: BakeConfig,
    cancel: CancelToken,
}

impl Baker {
    /// Load every variant of `plan` and validate its images.
    pub fn new(plan: BuildPlan, config: BakeConfig, cancel: CancelToken) -> Result<Self> {
        let mut catalog = VariantCatalog::new();
        let mut variants = HashMap::new();

        for entry in plan.variants {
            let key = variant_key(&entry.component, &entry.capability);
            if variants.contains_key(&key) {
                return Err(BakeError::InvalidMetadata(format!(
                    "Variant {} is declared more than once",
                    key
                )));
            }
            let variant = OciVariant::from_file(&entry.metadata, entry.layers)?;
            let scope = match entry.platforms {
                Some(platforms) => Scope::Platforms(platforms),
                None => Scope::Universal,
            };
            let dependencies = entry
                .dependencies
                .iter()
                .map(|d| Dependency {
                    key: variant_key(&d.component, &d.capability),
                    platform: d.platform.clone(),
                })
                .collect();
            catalog.insert(VariantDeclaration {
                key: key.clone(),
                scope,
                dependencies,
            });
            variants.insert(key, Arc::new(variant));
        }

        let mut jobs = Vec::with_capacity(plan.images.len());
        for image in plan.images {
            let selector = image
                .platforms
                .as_deref()
                .map(str::parse::<PlatformSelector>)
                .transpose()?;
            let requests = image
                .roots
                .iter()
                .map(|root| RootRequest {
                    key: variant_key(&root.component, &root.capability),
                    selector: ReferenceSelector {
                        name: root.name.clone(),
                        tags: root.tags.iter().cloned().collect(),
                    },
                })
                .collect();
            jobs.push(ImageJob { requests, selector });
        }

        tracing::debug!(
            variants = variants.len(),
            images = jobs.len(),
            "Loaded build plan"
        );

        Ok(Self {
            catalog,
            variants,
            jobs,
            config,
            cancel,
        })
    }

    pub fn from_file(path: &Path, config: BakeConfig, cancel: CancelToken) -> Result<Self> {
        Self::new(BuildPlan::from_file(path)?, config, cancel)
    }

    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    /// Resolve every image and report what its roots support.
    pub fn describe(&self) -> Result<Vec<ImageDescription>> {
        self.jobs
            .iter()
            .map(|job| {
                let graph = resolve(&self.catalog, &job.requests, &self.cancel)?;
                let roots = graph
                    .roots()
                    .iter()
                    .map(|root| {
                        let node = graph.node(root.node);
                        RootDescription {
                            key: node.key().clone(),
                            supported: node.supported_platforms().clone(),
                        }
                    })
                    .collect();
                Ok(ImageDescription {
                    roots,
                    selector: job.selector.clone(),
                })
            })
            .collect()
    }

    /// Assemble every image of the plan, grouped into one multi-platform
    /// image per reference. `selector` replaces the plan's selectors.
    pub fn assemble(&self, selector: Option<&PlatformSelector>) -> Result<Vec<OciMultiPlatformImage>> {
        let algorithm = self.config.digest_algorithm;
        let mut claims = ImageClaims::new();

        for job in &self.jobs {
            self.cancel.check()?;
            let graph = resolve(&self.catalog, &job.requests, &self.cancel)?;
            let groups = select_platforms(&graph, selector.or(job.selector.as_ref()))?;

            for group in groups {
                let roots: Vec<_> = group.roots.iter().map(|&i| graph.roots()[i].node).collect();
                let chain = graph
                    .chain(&roots, &group.platform)
                    .into_iter()
                    .map(|id| self.variant(&graph, id))
                    .collect::<Result<Vec<_>>>()?;
                let image = Arc::new(assemble_image(&group.platform, chain, algorithm)?);
                tracing::debug!(
                    platform = %group.platform,
                    digest = %image.manifest_digest(),
                    "Assembled image"
                );

                let default_reference = image.top().image_reference()?;
                for &index in &group.roots {
                    for selector in &graph.roots()[index].selectors {
                        for reference in references(selector, &default_reference)? {
                            claims.claim(reference, image.clone())?;
                        }
                    }
                }
            }
        }

        claims.into_indexes(algorithm)
    }

    /// Assemble and write every image into `output`.
    pub fn bake(&self, output: &Path, selector: Option<&PlatformSelector>) -> Result<Vec<BakeResult>> {
        let images = self.assemble(selector)?;
        let mut writer = open_writer(output, &self.config, self.cancel.clone())?;
        let mut results = Vec::with_capacity(images.len());
        for image in &images {
            writer.write(image)?;
            results.push(BakeResult {
                reference: image.reference().clone(),
                digest: image.index_digest().clone(),
                platforms: image.images().keys().cloned().collect(),
            });
        }
        writer.finish()?;

        tracing::info!(
            output = %output.display(),
            images = results.len(),
            "Bake complete"
        );
        Ok(results)
    }

    fn variant(&self, graph: &VariantGraph, id: crate::graph::NodeId) -> Result<Arc<OciVariant>> {
        let key = graph.node(id).key();
        self.variants
            .get(key)
            .cloned()
            .ok_or_else(|| BakeError::UnknownVariant(key.to_string()))
    }
}

/// References requested by one selector: its name, else the default name;
/// its tags, else the default tag.
fn references(selector: &ReferenceSelector, default: &ImageReference) -> Result<Vec<ImageReference>> {
    let name = selector.name.as_deref().unwrap_or(&default.name);
    let tags: BTreeSet<&str> = if selector.tags.is_empty() {
        BTreeSet::from([default.tag.as_str()])
    } else {
        selector.tags.iter().map(String::as_str).collect()
    };
    tags.into_iter()
        .map(|tag| ImageReference::new(name, tag))
        .collect()
}
