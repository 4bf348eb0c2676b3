//! ocibake runtime - variant graph resolution, image assembly and storage.
//!
//! This crate turns a build plan into OCI images: it resolves the variant
//! graph, picks platforms, folds variant chains into canonical OCI documents
//! and writes them into an image layout or a registry storage tree.

pub mod bake;
pub mod endpoint;
pub mod graph;
pub mod oci;
pub mod store;

// Re-export common types
pub use bake::{BakeResult, Baker, BuildPlan, ImageDescription, RootDescription};
pub use endpoint::IoContext;
pub use graph::{
    resolve, select_platforms, Dependency, NodeId, PlatformGroup, ReferenceSelector,
    RootRequest, Scope, VariantCatalog, VariantDeclaration, VariantGraph, VariantGraphNode,
    VariantGraphRoot, VariantKey,
};
pub use oci::{
    assemble_image, assemble_index, ImageClaims, ImageReference, OciImage,
    OciMultiPlatformImage, OciVariant, VariantMetadata,
};
pub use store::{open_writer, ImageWriter, OciLayoutWriter, RegistryWriter};

/// ocibake runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
