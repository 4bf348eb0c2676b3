//! Variant graph.
//!
//! Nodes are resolved variants stored in an arena and addressed by
//! [`NodeId`]. Each node maps scope buckets (the universal bucket or one
//! bucket per declared platform) to the dependencies that apply there, and
//! carries the set of platforms it can be built for.

mod resolver;
mod select;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use ocibake_core::platform::{Platform, PlatformSet};

pub use resolver::resolve;
pub use select::{select_platforms, PlatformGroup};

/// Identity of a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantKey {
    pub component: String,
    pub capability: String,
}

impl VariantKey {
    pub fn new(component: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            capability: capability.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.component == self.capability {
            write!(f, "{}", self.component)
        } else {
            write!(f, "{} [{}]", self.component, self.capability)
        }
    }
}

/// Platforms a variant is declared for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Platform independent
    Universal,
    Platforms(Vec<Platform>),
}

/// Dependency edge as declared by a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub key: VariantKey,
    /// Restricts the edge to one of the declaring variant's platforms
    pub platform: Option<Platform>,
}

impl Dependency {
    pub fn new(key: VariantKey) -> Self {
        Self { key, platform: None }
    }

    pub fn for_platform(key: VariantKey, platform: Platform) -> Self {
        Self {
            key,
            platform: Some(platform),
        }
    }
}

/// Declaration of one variant: its scope and dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDeclaration {
    pub key: VariantKey,
    pub scope: Scope,
    pub dependencies: Vec<Dependency>,
}

/// All declared variants, by key.
#[derive(Debug, Clone, Default)]
pub struct VariantCatalog {
    declarations: HashMap<VariantKey, VariantDeclaration>,
}

impl VariantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration, returning the one it replaced.
    pub fn insert(&mut self, declaration: VariantDeclaration) -> Option<VariantDeclaration> {
        self.declarations.insert(declaration.key.clone(), declaration)
    }

    pub fn get(&self, key: &VariantKey) -> Option<&VariantDeclaration> {
        self.declarations.get(key)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Index of a node in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Scope bucket of a node. Universal sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Universal,
    Platform(Platform),
}

#[derive(Debug, Clone)]
pub struct VariantGraphNode {
    key: VariantKey,
    buckets: BTreeMap<Bucket, Vec<NodeId>>,
    supported: PlatformSet,
}

impl VariantGraphNode {
    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    pub fn buckets(&self) -> &BTreeMap<Bucket, Vec<NodeId>> {
        &self.buckets
    }

    /// Platforms this variant and all of its dependencies support.
    pub fn supported_platforms(&self) -> &PlatformSet {
        &self.supported
    }

    /// Dependencies that apply on `platform`: the exact platform bucket,
    /// falling back to the universal bucket.
    pub fn dependencies_for(&self, platform: &Platform) -> &[NodeId] {
        self.buckets
            .get(&Bucket::Platform(platform.clone()))
            .or_else(|| self.buckets.get(&Bucket::Universal))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Name override and tags requested for a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReferenceSelector {
    pub name: Option<String>,
    pub tags: BTreeSet<String>,
}

/// A first-level request for a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRequest {
    pub key: VariantKey,
    pub selector: ReferenceSelector,
}

/// A requested node with every distinct selector that asked for it.
#[derive(Debug, Clone)]
pub struct VariantGraphRoot {
    pub node: NodeId,
    pub selectors: Vec<ReferenceSelector>,
}

#[derive(Debug, Clone, Default)]
pub struct VariantGraph {
    nodes: Vec<VariantGraphNode>,
    roots: Vec<VariantGraphRoot>,
}

impl VariantGraph {
    pub fn node(&self, id: NodeId) -> &VariantGraphNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[VariantGraphNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[VariantGraphRoot] {
        &self.roots
    }

    /// Variants making up the image for `platform`, base first.
    ///
    /// Post-order over `roots` in order; every node is visited once, following
    /// the dependencies that apply on `platform`.
    pub fn chain(&self, roots: &[NodeId], platform: &Platform) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        for &root in roots {
            self.post_order(root, platform, &mut visited, &mut chain);
        }
        chain
    }

    fn post_order(
        &self,
        id: NodeId,
        platform: &Platform,
        visited: &mut HashSet<NodeId>,
        chain: &mut Vec<NodeId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for &dependency in self.node(id).dependencies_for(platform) {
            self.post_order(dependency, platform, visited, chain);
        }
        chain.push(id);
    }
}
